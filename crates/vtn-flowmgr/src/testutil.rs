//! Mock collaborators shared by unit and integration tests.
//!
//! The mocks stand in for the switch inventory and the flow programming
//! service so that removals can be observed without real switches. The
//! integration tests include this file through `tests/common`, so paths go
//! through the crate name rather than `crate::`.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use vtn_flowmgr::inventory::{InstalledFlow, InventoryReader, NodeInfo};
use vtn_flowmgr::rpc::{FlowRpcService, RemoveFlowInput};
use vtn_flowmgr::RpcError;
use vtn_types::{OfVersion, SalNode};

/// Records every RPC and answers according to per-switch settings.
#[derive(Default)]
pub struct MockRpcService {
    calls: Mutex<Vec<RemoveFlowInput>>,
    failing: Mutex<HashSet<SalNode>>,
    delays: Mutex<HashMap<SalNode, Duration>>,
    completed: AtomicUsize,
}

impl MockRpcService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_node(&self, node: SalNode) {
        self.failing.lock().insert(node);
    }

    pub fn delay_node(&self, node: SalNode, delay: Duration) {
        self.delays.lock().insert(node, delay);
    }

    pub fn calls(&self) -> Vec<RemoveFlowInput> {
        self.calls.lock().clone()
    }

    pub fn calls_for(&self, node: SalNode) -> Vec<RemoveFlowInput> {
        self.calls
            .lock()
            .iter()
            .filter(|input| input.node == node)
            .cloned()
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Distinct switches that received an RPC, in ascending order.
    pub fn nodes(&self) -> Vec<SalNode> {
        let nodes: BTreeSet<_> = self.calls.lock().iter().map(|input| input.node).collect();
        nodes.into_iter().collect()
    }

    /// Number of RPCs that ran to completion, successful or not.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }
}

#[async_trait]
impl FlowRpcService for MockRpcService {
    async fn remove_flow(&self, input: RemoveFlowInput) -> Result<(), RpcError> {
        let node = input.node;
        self.calls.lock().push(input);
        let delay = self.delays.lock().get(&node).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.completed.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().contains(&node) {
            return Err(RpcError::rejected(format!("{} refused flow delete", node)));
        }
        Ok(())
    }
}

/// Inventory with a configurable set of switches and flow statistics.
#[derive(Default)]
pub struct MockInventory {
    nodes: Mutex<HashMap<SalNode, OfVersion>>,
    installed: Mutex<HashMap<SalNode, Vec<InstalledFlow>>>,
    stats_failing: Mutex<HashSet<SalNode>>,
    stats_delay: Mutex<Option<Duration>>,
    stats_reads: Mutex<Vec<SalNode>>,
}

impl MockInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&self, node: SalNode, version: OfVersion) {
        self.nodes.lock().insert(node, version);
    }

    pub fn remove_node(&self, node: SalNode) {
        self.nodes.lock().remove(&node);
    }

    pub fn set_installed(&self, node: SalNode, flows: Vec<InstalledFlow>) {
        self.installed.lock().insert(node, flows);
    }

    pub fn fail_stats(&self, node: SalNode) {
        self.stats_failing.lock().insert(node);
    }

    /// Makes every statistics read take `delay`.
    pub fn delay_stats(&self, delay: Duration) {
        *self.stats_delay.lock() = Some(delay);
    }

    pub fn stats_reads(&self) -> Vec<SalNode> {
        self.stats_reads.lock().clone()
    }
}

#[async_trait]
impl InventoryReader for MockInventory {
    fn node(&self, node: &SalNode) -> Option<NodeInfo> {
        self.nodes
            .lock()
            .get(node)
            .map(|version| NodeInfo::new(*node, *version))
    }

    async fn read_flow_stats(
        &self,
        node: &SalNode,
        table_id: u8,
    ) -> Result<Vec<InstalledFlow>, RpcError> {
        self.stats_reads.lock().push(*node);
        let delay = *self.stats_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.stats_failing.lock().contains(node) {
            return Err(RpcError::unreachable(node.to_string()));
        }
        Ok(self
            .installed
            .lock()
            .get(node)
            .map(|flows| {
                flows
                    .iter()
                    .filter(|flow| flow.table_id == table_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
