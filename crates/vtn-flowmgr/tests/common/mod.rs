//! Shared fixtures for flow manager integration tests.

#![allow(dead_code)]

#[path = "../../src/testutil.rs"]
mod mocks;

pub use mocks::{MockInventory, MockRpcService};

use std::sync::Arc;
use tokio::runtime::Handle;
use vtn_flowmgr::flow::{add_flows, new_flow_store, FlowAction, FlowEntry, FlowMatch};
use vtn_flowmgr::{DataFlow, FlowId, FlowManagerConfig, FlowRemoveExecutor, FlowStore};
use vtn_types::{OfVersion, SalNode};

/// Executor wired to mock collaborators.
pub struct Harness {
    pub store: Arc<FlowStore>,
    pub inventory: Arc<MockInventory>,
    pub rpc: Arc<MockRpcService>,
    pub executor: FlowRemoveExecutor,
}

impl Harness {
    /// Must be called from within a tokio runtime.
    pub fn new() -> Self {
        Self::with_config(FlowManagerConfig::default())
    }

    pub fn with_config(config: FlowManagerConfig) -> Self {
        let store = Arc::new(new_flow_store(config.max_tx_retries));
        let inventory = Arc::new(MockInventory::new());
        let rpc = Arc::new(MockRpcService::new());
        let executor = FlowRemoveExecutor::new(
            Arc::clone(&store),
            inventory.clone(),
            rpc.clone(),
            config,
            Handle::current(),
        )
        .expect("valid config");
        Self {
            store,
            inventory,
            rpc,
            executor,
        }
    }

    pub fn add_node(&self, dpid: u64, version: OfVersion) -> SalNode {
        let node = SalNode::new(dpid);
        self.inventory.add_node(node, version);
        node
    }

    pub fn add_flows(&self, flows: Vec<DataFlow>) {
        add_flows(&self.store, flows).expect("add flows");
    }

    /// Returns the identifiers of every stored flow, in ascending order.
    pub fn stored_ids(&self) -> Vec<FlowId> {
        let tables = self.store.snapshot();
        let mut ids: Vec<_> = tables
            .tables()
            .flat_map(|(_, table)| table.flows().map(|flow| flow.id))
            .collect();
        ids.sort();
        ids
    }
}

/// Builds a flow with one entry per `(dpid, in_port, out_port)` hop.
pub fn flow(id: u64, tenant: &str, hops: &[(u64, u32, u32)]) -> DataFlow {
    hops.iter()
        .fold(DataFlow::new(FlowId::new(id), tenant), |flow, &(dpid, inp, outp)| {
            let node = SalNode::new(dpid);
            flow.with_entry(
                FlowEntry::new(node, 0, 100, FlowMatch::new().with_in_port(node.port(inp)))
                    .with_action(FlowAction::Output(node.port(outp))),
            )
        })
}
