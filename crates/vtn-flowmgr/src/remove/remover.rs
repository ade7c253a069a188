//! Transactional flow removal.

use super::result::{RemovedAllFlows, RemovedDataFlows, RemovedExpiredFlow, RemovedFlows, RpcScope};
use super::selector::{FlowFilter, Selector};
use crate::flow::{DataFlow, FlowId, FlowTables, IndexKey, VtnFlowTable};
use std::sync::Arc;
use tracing::{debug, warn};
use vtn_tx_common::{TxContext, TxResult, TxTask};
use vtn_types::{MacAddress, SalNode, SalPort, VNodeIdent, VlanId};

/// How removed records are turned into switch RPCs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalKind {
    /// Global reset: bulk deletes where the switch allows it.
    All,
    /// Per-entry deletes restricted to a scope.
    Scoped(RpcScope),
    /// Per-entry deletes on every switch except the one that reported the
    /// expiration.
    Expired(SalNode),
}

/// Removes the flow records chosen by a [`Selector`] inside a store
/// transaction.
///
/// Every deleted record is also removed from every index of its table.
/// The returned [`RemovedFlows`] lists exactly the records deleted by the
/// committed attempt.
#[derive(Debug, Clone)]
pub struct FlowRemover {
    selector: Selector,
    kind: RemovalKind,
    desc: String,
}

impl FlowRemover {
    pub fn new(selector: Selector, kind: RemovalKind, desc: impl Into<String>) -> Self {
        Self {
            selector,
            kind,
            desc: desc.into(),
        }
    }

    /// Removes every flow of every tenant.
    pub fn all() -> Self {
        Self::new(Selector::All, RemovalKind::All, "all flows")
    }

    /// Removes every flow of a tenant.
    pub fn tenant(tenant: impl Into<String>) -> Self {
        let tenant = tenant.into();
        let desc = format!("tenant={}", tenant);
        Self::new(
            Selector::Index {
                tenant: Some(tenant),
                key: IndexKey::Tenant,
                filter: None,
            },
            RemovalKind::Scoped(RpcScope::All),
            desc,
        )
    }

    /// Removes every flow with an entry on `node`. Only the entries on
    /// `node` are uninstalled.
    pub fn node(node: SalNode) -> Self {
        Self::new(
            Selector::Index {
                tenant: None,
                key: IndexKey::Node(node),
                filter: None,
            },
            RemovalKind::Scoped(RpcScope::Node(node)),
            format!("node={}", node),
        )
    }

    /// Removes every flow touching `port`. Only the entries touching
    /// `port` are uninstalled.
    pub fn port(port: SalPort) -> Self {
        Self::new(
            Selector::Index {
                tenant: None,
                key: IndexKey::Port(port),
                filter: None,
            },
            RemovalKind::Scoped(RpcScope::Port(port)),
            format!("port={}", port),
        )
    }

    /// Removes flows to or from hosts on the edge network `(port, vlan)`.
    pub fn edge_network(port: SalPort, vlan: VlanId) -> Self {
        Self::new(
            Selector::Index {
                tenant: None,
                key: IndexKey::Port(port),
                filter: Some(FlowFilter::EdgeNetwork { port, vlan }),
            },
            RemovalKind::Scoped(RpcScope::All),
            format!("edge-network={}@{}", port, vlan),
        )
    }

    /// Removes a tenant's flows to or from one edge host.
    pub fn edge_host(tenant: impl Into<String>, mac: MacAddress, vlan: VlanId) -> Self {
        let tenant = tenant.into();
        let desc = format!("tenant={}, edge-host={}@{}", tenant, mac, vlan);
        Self::scan(Some(tenant), FlowFilter::EdgeHost { mac, vlan }, desc)
    }

    /// Removes flows whose virtual route passes through `vnode`.
    pub fn vnode(vnode: VNodeIdent) -> Self {
        let tenant = vnode.tenant_name().to_string();
        let desc = format!("vnode={}", vnode);
        Self::scan(Some(tenant), FlowFilter::VNode(vnode), desc)
    }

    /// Removes flows routed by path policy `id`, in every tenant.
    pub fn path_policy(id: u32) -> Self {
        Self::scan(None, FlowFilter::PathPolicy(id), format!("path-policy={}", id))
    }

    /// Removes the given flows of a tenant.
    pub fn flow_ids(tenant: impl Into<String>, ids: Vec<FlowId>) -> Self {
        let tenant = tenant.into();
        let list: Vec<_> = ids.iter().map(ToString::to_string).collect();
        let desc = format!("tenant={}, flows=[{}]", tenant, list.join(","));
        Self::new(
            Selector::FlowIds { tenant, ids },
            RemovalKind::Scoped(RpcScope::All),
            desc,
        )
    }

    /// Removes a flow that `reporter` notified as expired.
    pub fn expired(tenant: impl Into<String>, id: FlowId, reporter: SalNode) -> Self {
        let tenant = tenant.into();
        let desc = format!("tenant={}, expired flow={} on {}", tenant, id, reporter);
        Self::new(
            Selector::FlowIds {
                tenant,
                ids: vec![id],
            },
            RemovalKind::Expired(reporter),
            desc,
        )
    }

    /// Removes a tenant's flows accepted by `predicate`.
    pub fn custom<F>(tenant: impl Into<String>, desc: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&DataFlow) -> bool + Send + Sync + 'static,
    {
        let tenant = tenant.into();
        let desc = desc.into();
        let filter = FlowFilter::Custom {
            desc: desc.clone(),
            predicate: Arc::new(predicate),
        };
        Self::scan(Some(tenant), filter, desc)
    }

    fn scan(tenant: Option<String>, filter: FlowFilter, desc: String) -> Self {
        Self::new(
            Selector::Scan { tenant, filter },
            RemovalKind::Scoped(RpcScope::All),
            desc,
        )
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    pub fn kind(&self) -> RemovalKind {
        self.kind
    }

    pub fn description(&self) -> &str {
        &self.desc
    }

    /// Picks the records to delete from one table without modifying it.
    ///
    /// Returns the matching identifiers and whether the table needs to be
    /// written even if nothing matched (to heal a stale index bucket).
    fn plan(&self, tenant: &str, table: &VtnFlowTable) -> (Vec<FlowId>, bool) {
        match &self.selector {
            Selector::All => (table.flows().map(|flow| flow.id).collect(), false),
            Selector::Scan { .. } => (
                table
                    .flows()
                    .filter(|flow| self.selector.accept(flow))
                    .map(|flow| flow.id)
                    .collect(),
                false,
            ),
            Selector::Index { key, .. } => {
                let mut matched = Vec::new();
                let mut stale = false;
                for id in table.bucket(key).unwrap_or_default() {
                    match table.get(id) {
                        Some(flow) if self.selector.accept(flow) => matched.push(*id),
                        Some(flow) => stale |= !key.covers(flow),
                        None => {
                            warn!(
                                remover = %self.desc,
                                tenant,
                                flow = %id,
                                index = %key,
                                "index refers to a missing flow"
                            );
                            stale = true;
                        }
                    }
                }
                (matched, stale)
            }
            Selector::FlowIds { ids, .. } => {
                let mut matched = Vec::new();
                for id in ids {
                    if table.contains(id) && !matched.contains(id) {
                        matched.push(*id);
                    } else if !table.contains(id) {
                        debug!(remover = %self.desc, tenant, flow = %id, "flow not found");
                    }
                }
                (matched, false)
            }
        }
    }

    /// Deletes `ids` from `table`, keeping the index consistent.
    fn apply(&self, table: &mut VtnFlowTable, ids: &[FlowId]) -> Vec<DataFlow> {
        let mut removed = Vec::with_capacity(ids.len());
        if let Selector::Index { key, .. } = &self.selector {
            // The bucket is dropped first. Flows that were rejected by the
            // filter but still belong under the key are put back.
            let bucket = table.take_bucket(key);
            for id in ids {
                removed.extend(table.remove_flow(id));
            }
            let kept: Vec<_> = bucket
                .into_iter()
                .filter(|id| table.get(id).is_some_and(|flow| key.covers(flow)))
                .collect();
            table.put_bucket(key, kept);
        } else {
            for id in ids {
                removed.extend(table.remove_flow(id));
            }
        }
        removed
    }

    fn result(&self, flows: Vec<DataFlow>) -> RemovedFlows {
        match self.kind {
            RemovalKind::All => RemovedFlows::All(RemovedAllFlows { flows }),
            RemovalKind::Scoped(scope) => RemovedFlows::Scoped(RemovedDataFlows { flows, scope }),
            RemovalKind::Expired(reporter) => RemovedFlows::Expired(RemovedExpiredFlow {
                flow: flows.into_iter().next(),
                reporter,
            }),
        }
    }
}

impl TxTask<FlowTables> for FlowRemover {
    type Output = RemovedFlows;

    fn describe(&self) -> String {
        self.desc.clone()
    }

    fn execute(&mut self, ctx: &mut TxContext<'_, FlowTables>) -> TxResult<RemovedFlows> {
        let mut removed = Vec::new();

        if matches!(self.selector, Selector::All) {
            if ctx.read().tables().next().is_some() {
                for (_, mut table) in ctx.write().clear() {
                    removed.extend(table.drain());
                }
            }
            return Ok(self.result(removed));
        }

        for tenant in self.selector.tenants(ctx.read().tenants()) {
            let Some(table) = ctx.read().table(&tenant) else {
                continue;
            };
            let (ids, stale) = self.plan(&tenant, table);
            if ids.is_empty() && !stale {
                continue;
            }

            let tables = ctx.write();
            if let Some(table) = tables.table_mut(&tenant) {
                removed.extend(self.apply(table, &ids));
            }
            tables.prune_table(&tenant);
        }

        Ok(self.result(removed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::{
        add_flows, new_flow_store, EdgeHost, FlowAction, FlowEntry, FlowMatch, FlowStore,
    };
    use pretty_assertions::assert_eq;

    fn flow(id: u64, tenant: &str, hops: &[(u64, u32, u32)]) -> DataFlow {
        hops.iter()
            .fold(DataFlow::new(FlowId::new(id), tenant), |flow, &(dpid, inp, outp)| {
                let node = SalNode::new(dpid);
                flow.with_entry(
                    FlowEntry::new(node, 0, 10, FlowMatch::new().with_in_port(node.port(inp)))
                        .with_action(FlowAction::Output(node.port(outp))),
                )
            })
    }

    fn ids(removed: &RemovedFlows) -> Vec<u64> {
        removed.flow_ids().iter().map(FlowId::value).collect()
    }

    fn populated() -> FlowStore {
        let store = new_flow_store(3);
        add_flows(
            &store,
            vec![
                flow(1, "vtn1", &[(1, 1, 2), (2, 1, 2)]),
                flow(2, "vtn1", &[(2, 3, 4)]),
                flow(3, "vtn2", &[(1, 5, 6)]).with_path_policy(7),
                flow(4, "vtn2", &[(3, 1, 2)]).with_path_policy(7),
            ],
        )
        .unwrap();
        store
    }

    #[test]
    fn test_node_removal_across_tenants() {
        let store = populated();
        let mut remover = FlowRemover::node(SalNode::new(1));
        let removed = store.execute(&mut remover).unwrap().into_output();

        assert_eq!(ids(&removed), vec![1, 3]);
        let tables = store.snapshot();
        assert_eq!(tables.flow_count(), 2);
        assert!(tables.flow("vtn1", &FlowId::new(1)).is_none());
        assert_eq!(tables.check_indices(), Ok(()));
    }

    #[test]
    fn test_index_removal_copies_only_matched_tenant() {
        let store = populated();
        let before = store.snapshot();
        let removed = store
            .execute(&mut FlowRemover::node(SalNode::new(3)))
            .unwrap()
            .into_output();
        assert_eq!(ids(&removed), vec![4]);

        let after = store.snapshot();
        assert!(std::ptr::eq(
            before.table("vtn1").unwrap(),
            after.table("vtn1").unwrap()
        ));
        assert!(!std::ptr::eq(
            before.table("vtn2").unwrap(),
            after.table("vtn2").unwrap()
        ));
    }

    #[test]
    fn test_tenant_removal_drops_table() {
        let store = populated();
        let removed = store
            .execute(&mut FlowRemover::tenant("vtn2"))
            .unwrap()
            .into_output();
        assert_eq!(ids(&removed), vec![3, 4]);
        assert!(store.snapshot().table("vtn2").is_none());
        assert_eq!(store.snapshot().check_indices(), Ok(()));
    }

    #[test]
    fn test_path_policy_scans_all_tenants() {
        let store = populated();
        let removed = store
            .execute(&mut FlowRemover::path_policy(7))
            .unwrap()
            .into_output();
        assert_eq!(ids(&removed), vec![3, 4]);
    }

    #[test]
    fn test_empty_removal_leaves_store_unchanged() {
        let store = populated();
        let before = store.snapshot();
        let version = store.version();

        let outcome = store
            .execute(&mut FlowRemover::port(SalNode::new(9).port(1)))
            .unwrap();
        assert!(outcome.output().is_empty());
        assert_eq!(store.version(), version);
        assert_eq!(*store.snapshot(), *before);

        let outcome = store
            .execute(&mut FlowRemover::flow_ids("nope", vec![FlowId::new(1)]))
            .unwrap();
        assert!(outcome.output().is_empty());
        assert_eq!(store.version(), version);
    }

    #[test]
    fn test_edge_network_keeps_rejected_flows_indexed() {
        let store = new_flow_store(3);
        let node = SalNode::new(1);
        let mac: MacAddress = "00:00:00:00:00:01".parse().unwrap();
        let vlan = VlanId::new(10).unwrap();
        add_flows(
            &store,
            vec![
                flow(1, "vtn1", &[(1, 1, 2)]).with_ingress(EdgeHost::new(mac, vlan, node.port(1))),
                flow(2, "vtn1", &[(1, 1, 3)])
                    .with_ingress(EdgeHost::new(mac, VlanId::UNTAGGED, node.port(1))),
            ],
        )
        .unwrap();

        let removed = store
            .execute(&mut FlowRemover::edge_network(node.port(1), vlan))
            .unwrap()
            .into_output();
        assert_eq!(ids(&removed), vec![1]);

        let tables = store.snapshot();
        let table = tables.table("vtn1").unwrap();
        assert_eq!(table.bucket(&IndexKey::Port(node.port(1))), Some(&[FlowId::new(2)][..]));
        assert_eq!(tables.check_indices(), Ok(()));
    }

    #[test]
    fn test_dangling_index_entry_is_healed() {
        let store = new_flow_store(3);
        add_flows(&store, vec![flow(1, "vtn1", &[(1, 1, 2)])]).unwrap();
        let mut corrupt = vtn_tx_common::FnTask::new(
            "corrupt",
            |ctx: &mut TxContext<'_, FlowTables>| {
                if let Some(table) = ctx.write().table_mut("vtn1") {
                    table.put_bucket(
                        &IndexKey::Node(SalNode::new(1)),
                        vec![FlowId::new(1), FlowId::new(99)],
                    );
                }
                Ok(())
            },
        );
        store.execute(&mut corrupt).unwrap();
        assert!(store.snapshot().check_indices().is_err());

        let removed = store
            .execute(&mut FlowRemover::node(SalNode::new(1)))
            .unwrap()
            .into_output();
        assert_eq!(ids(&removed), vec![1]);
        assert_eq!(store.snapshot().check_indices(), Ok(()));
    }

    #[test]
    fn test_expired_and_custom() {
        let store = populated();
        let removed = store
            .execute(&mut FlowRemover::expired("vtn1", FlowId::new(1), SalNode::new(2)))
            .unwrap()
            .into_output();
        assert!(matches!(
            &removed,
            RemovedFlows::Expired(RemovedExpiredFlow { flow: Some(f), reporter })
                if f.id == FlowId::new(1) && *reporter == SalNode::new(2)
        ));

        let removed = store
            .execute(&mut FlowRemover::custom("vtn2", "even flows", |f: &DataFlow| {
                f.id.value() % 2 == 0
            }))
            .unwrap()
            .into_output();
        assert_eq!(ids(&removed), vec![4]);
        assert_eq!(store.snapshot().check_indices(), Ok(()));
    }

    #[test]
    fn test_all() {
        let store = populated();
        let removed = store
            .execute(&mut FlowRemover::all())
            .unwrap()
            .into_output();
        assert!(removed.is_bulk());
        assert_eq!(ids(&removed), vec![1, 2, 3, 4]);
        assert_eq!(store.snapshot().flow_count(), 0);
        assert!(store.snapshot().tenants().is_empty());
    }
}
