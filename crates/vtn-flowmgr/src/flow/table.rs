//! Tenant flow table with its derived indices.
//!
//! A [`VtnFlowTable`] owns every data flow of one tenant plus three side
//! tables used to find removal candidates without a full scan:
//!
//! - node index: switch -> flows with an entry on that switch
//! - port index: switch port -> flows with an entry touching that port
//! - tenant index: every flow of the tenant, in creation order
//!
//! Records and index entries are only ever added or removed together, so
//! every identifier reachable from an index names an existing record.

use super::types::{DataFlow, FlowId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use vtn_types::{SalNode, SalPort};

/// Key of one index bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexKey {
    Node(SalNode),
    Port(SalPort),
    Tenant,
}

impl IndexKey {
    /// Returns true if `flow` belongs in this bucket.
    pub fn covers(&self, flow: &DataFlow) -> bool {
        match self {
            IndexKey::Node(node) => flow.entries.iter().any(|e| e.node == *node),
            IndexKey::Port(port) => flow.entries.iter().any(|e| e.touches_port(port)),
            IndexKey::Tenant => true,
        }
    }
}

impl std::fmt::Display for IndexKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexKey::Node(node) => write!(f, "node-index[{}]", node),
            IndexKey::Port(port) => write!(f, "port-index[{}]", port),
            IndexKey::Tenant => write!(f, "tenant-index"),
        }
    }
}

/// Flow table of one tenant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VtnFlowTable {
    flows: BTreeMap<FlowId, DataFlow>,
    node_index: BTreeMap<SalNode, Vec<FlowId>>,
    port_index: BTreeMap<SalPort, Vec<FlowId>>,
    tenant_index: Vec<FlowId>,
}

impl VtnFlowTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    pub fn contains(&self, id: &FlowId) -> bool {
        self.flows.contains_key(id)
    }

    pub fn get(&self, id: &FlowId) -> Option<&DataFlow> {
        self.flows.get(id)
    }

    /// Returns all flows ordered by identifier.
    pub fn flows(&self) -> impl Iterator<Item = &DataFlow> {
        self.flows.values()
    }

    /// Adds a flow and registers it in every relevant index.
    ///
    /// Returns the flow back if its identifier is already in use.
    pub fn add_flow(&mut self, flow: DataFlow) -> Result<(), DataFlow> {
        if self.flows.contains_key(&flow.id) {
            return Err(flow);
        }

        let id = flow.id;
        for node in flow.nodes() {
            self.node_index.entry(node).or_default().push(id);
        }
        for port in flow.ports() {
            self.port_index.entry(port).or_default().push(id);
        }
        self.tenant_index.push(id);
        self.flows.insert(id, flow);
        Ok(())
    }

    /// Returns the identifiers stored under `key`.
    pub fn bucket(&self, key: &IndexKey) -> Option<&[FlowId]> {
        match key {
            IndexKey::Node(node) => self.node_index.get(node).map(Vec::as_slice),
            IndexKey::Port(port) => self.port_index.get(port).map(Vec::as_slice),
            IndexKey::Tenant if self.tenant_index.is_empty() => None,
            IndexKey::Tenant => Some(&self.tenant_index),
        }
    }

    /// Deletes the bucket stored under `key` and returns its contents.
    pub fn take_bucket(&mut self, key: &IndexKey) -> Vec<FlowId> {
        match key {
            IndexKey::Node(node) => self.node_index.remove(node).unwrap_or_default(),
            IndexKey::Port(port) => self.port_index.remove(port).unwrap_or_default(),
            IndexKey::Tenant => std::mem::take(&mut self.tenant_index),
        }
    }

    /// Replaces the bucket stored under `key`. An empty list deletes it.
    pub fn put_bucket(&mut self, key: &IndexKey, ids: Vec<FlowId>) {
        match key {
            IndexKey::Node(node) => {
                if ids.is_empty() {
                    self.node_index.remove(node);
                } else {
                    self.node_index.insert(*node, ids);
                }
            }
            IndexKey::Port(port) => {
                if ids.is_empty() {
                    self.port_index.remove(port);
                } else {
                    self.port_index.insert(*port, ids);
                }
            }
            IndexKey::Tenant => self.tenant_index = ids,
        }
    }

    /// Removes a flow together with every index entry that refers to it.
    ///
    /// Buckets left empty are pruned.
    pub fn remove_flow(&mut self, id: &FlowId) -> Option<DataFlow> {
        let flow = self.flows.remove(id)?;
        for node in flow.nodes() {
            prune(&mut self.node_index, &node, id);
        }
        for port in flow.ports() {
            prune(&mut self.port_index, &port, id);
        }
        self.tenant_index.retain(|fid| fid != id);
        Some(flow)
    }

    /// Removes every flow, returning them in identifier order.
    pub fn drain(&mut self) -> Vec<DataFlow> {
        self.node_index.clear();
        self.port_index.clear();
        self.tenant_index.clear();
        std::mem::take(&mut self.flows).into_values().collect()
    }

    /// Returns every identifier reachable from any index.
    pub fn indexed_ids(&self) -> BTreeSet<FlowId> {
        self.node_index
            .values()
            .chain(self.port_index.values())
            .flatten()
            .chain(self.tenant_index.iter())
            .copied()
            .collect()
    }

    /// Verifies that the indices describe exactly the stored flows.
    ///
    /// Returns a description of the first inconsistency found.
    pub fn check_indices(&self) -> Result<(), String> {
        let mut expected = VtnFlowTable::new();
        for id in &self.tenant_index {
            if let Some(flow) = self.flows.get(id) {
                let _ = expected.add_flow(flow.clone());
            }
        }

        if expected.flows.len() != self.flows.len() {
            let missing: Vec<_> = self
                .flows
                .keys()
                .filter(|id| !expected.flows.contains_key(id))
                .collect();
            return Err(format!("flows missing from tenant index: {:?}", missing));
        }
        if expected.tenant_index != self.tenant_index {
            return Err(format!(
                "tenant index {:?} refers to unknown flows",
                self.tenant_index
            ));
        }
        if expected.node_index != self.node_index {
            return Err(format!(
                "node index mismatch: expected {:?}, found {:?}",
                expected.node_index, self.node_index
            ));
        }
        if expected.port_index != self.port_index {
            return Err(format!(
                "port index mismatch: expected {:?}, found {:?}",
                expected.port_index, self.port_index
            ));
        }
        Ok(())
    }
}

fn prune<K: Ord>(index: &mut BTreeMap<K, Vec<FlowId>>, key: &K, id: &FlowId) {
    if let Some(ids) = index.get_mut(key) {
        ids.retain(|fid| fid != id);
        if ids.is_empty() {
            index.remove(key);
        }
    }
}
