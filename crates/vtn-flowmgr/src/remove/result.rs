//! Records removed by one [`FlowRemover`](super::FlowRemover) and their
//! translation into switch RPCs.

use crate::flow::{DataFlow, FlowEntry, FlowId};
use crate::inventory::InventoryReader;
use crate::rpc::{RemoveFlowInput, RpcInvocationTracker};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;
use vtn_types::{SalNode, SalPort};

/// Restricts which entries of a removed flow are pushed to the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcScope {
    /// Every entry of every removed flow.
    All,
    /// Only entries installed on this switch.
    Node(SalNode),
    /// Only entries that match on or forward to this port.
    Port(SalPort),
}

impl RpcScope {
    pub fn includes(&self, entry: &FlowEntry) -> bool {
        match self {
            RpcScope::All => true,
            RpcScope::Node(node) => entry.node == *node,
            RpcScope::Port(port) => entry.touches_port(port),
        }
    }
}

/// Every flow of every tenant, removed by a global reset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemovedAllFlows {
    pub flows: Vec<DataFlow>,
}

/// Flows removed by a scoped trigger such as a tenant, switch or port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovedDataFlows {
    pub flows: Vec<DataFlow>,
    pub scope: RpcScope,
}

/// A flow removed because one of its switches reported it expired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovedExpiredFlow {
    pub flow: Option<DataFlow>,
    pub reporter: SalNode,
}

/// Result of a committed removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemovedFlows {
    All(RemovedAllFlows),
    Scoped(RemovedDataFlows),
    Expired(RemovedExpiredFlow),
}

impl RemovedFlows {
    /// Returns the removed records.
    pub fn flows(&self) -> &[DataFlow] {
        match self {
            RemovedFlows::All(r) => &r.flows,
            RemovedFlows::Scoped(r) => &r.flows,
            RemovedFlows::Expired(r) => match &r.flow {
                Some(flow) => std::slice::from_ref(flow),
                None => &[],
            },
        }
    }

    pub fn flow_ids(&self) -> Vec<FlowId> {
        self.flows().iter().map(|flow| flow.id).collect()
    }

    pub fn flow_count(&self) -> usize {
        self.flows().len()
    }

    /// Returns true if nothing was removed, so no RPC needs to be sent.
    pub fn is_empty(&self) -> bool {
        self.flows().is_empty()
    }

    /// Returns true if the RPC phase should use the bulk timeout.
    pub fn is_bulk(&self) -> bool {
        matches!(self, RemovedFlows::All(_))
    }

    /// Queues the delete RPCs for the removed flows on `tracker`.
    ///
    /// Switches missing from the inventory are skipped. Returns the number
    /// of queued requests.
    pub fn emit_rpcs(
        &self,
        inventory: &dyn InventoryReader,
        tracker: &mut RpcInvocationTracker,
    ) -> usize {
        let mut emitter = Emitter::new(inventory, tracker);
        match self {
            RemovedFlows::All(r) => emitter.all_flows(&r.flows),
            RemovedFlows::Scoped(r) => {
                // A cookie delete covers every entry of the flow in the
                // table, including ones that do not touch the port.
                let by_cookie = !matches!(r.scope, RpcScope::Port(_));
                for flow in &r.flows {
                    emitter.entries(flow, by_cookie, |entry| r.scope.includes(entry));
                }
            }
            RemovedFlows::Expired(r) => {
                if let Some(flow) = &r.flow {
                    emitter.entries(flow, true, |entry| entry.node != r.reporter);
                }
            }
        }
        emitter.count
    }
}

struct Emitter<'a> {
    inventory: &'a dyn InventoryReader,
    tracker: &'a mut RpcInvocationTracker,
    /// Requests already queued, keyed by owning flow. Strict deletes carry
    /// nothing flow-specific, so equal requests from different flows are
    /// distinct entries on the switch.
    issued: HashSet<(Option<FlowId>, RemoveFlowInput)>,
    count: usize,
}

impl<'a> Emitter<'a> {
    fn new(inventory: &'a dyn InventoryReader, tracker: &'a mut RpcInvocationTracker) -> Self {
        Self {
            inventory,
            tracker,
            issued: HashSet::new(),
            count: 0,
        }
    }

    fn push(&mut self, owner: Option<FlowId>, input: RemoveFlowInput) {
        if self.issued.insert((owner, input.clone())) {
            self.tracker.invoke(input);
            self.count += 1;
        }
    }

    /// One cookie-masked request per capable switch, otherwise one strict
    /// request per entry.
    fn all_flows(&mut self, flows: &[DataFlow]) {
        let mut per_node: BTreeMap<SalNode, Vec<(FlowId, &FlowEntry)>> = BTreeMap::new();
        for flow in flows {
            for entry in &flow.entries {
                per_node
                    .entry(entry.node)
                    .or_default()
                    .push((flow.id, entry));
            }
        }

        for (node, entries) in per_node {
            let Some(info) = self.inventory.node(&node) else {
                debug!(node = %node, "switch not in inventory, skipping flow removal");
                continue;
            };
            if info.supports_cookie_mask() {
                self.push(None, RemoveFlowInput::install_scope(node));
            } else {
                for (id, entry) in entries {
                    self.push(Some(id), RemoveFlowInput::strict_entry(entry));
                }
            }
        }
    }

    /// One request per selected entry: by exact cookie where supported and
    /// `by_cookie` is set, otherwise by strict match.
    fn entries(
        &mut self,
        flow: &DataFlow,
        by_cookie: bool,
        include: impl Fn(&FlowEntry) -> bool,
    ) {
        for entry in flow.entries.iter().filter(|&entry| include(entry)) {
            let Some(info) = self.inventory.node(&entry.node) else {
                debug!(
                    node = %entry.node,
                    flow = %flow.id,
                    "switch not in inventory, skipping flow entry"
                );
                continue;
            };
            let input = if by_cookie && info.supports_cookie_mask() {
                RemoveFlowInput::flow_cookie(entry, flow.id)
            } else {
                RemoveFlowInput::strict_entry(entry)
            };
            self.push(Some(flow.id), input);
        }
    }
}
