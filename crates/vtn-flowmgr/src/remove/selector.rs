//! Removal candidate selection.
//!
//! A [`Selector`] decides which flow tables a removal examines and which
//! records within them qualify. It never touches the store itself; the
//! [`FlowRemover`](super::FlowRemover) applies it.

use crate::flow::{DataFlow, FlowId, IndexKey};
use std::fmt;
use std::sync::Arc;
use vtn_types::{MacAddress, SalPort, VNodeIdent, VlanId};

/// Predicate over a flow record.
pub type FlowPredicate = Arc<dyn Fn(&DataFlow) -> bool + Send + Sync>;

/// Refinement applied to each candidate record.
#[derive(Clone)]
pub enum FlowFilter {
    /// Flows whose virtual route passes through the node or beneath it.
    VNode(VNodeIdent),
    /// Flows routed by a path policy.
    PathPolicy(u32),
    /// Flows with an edge host matching the MAC address and VLAN.
    EdgeHost { mac: MacAddress, vlan: VlanId },
    /// Flows with an edge host on the port and VLAN.
    EdgeNetwork { port: SalPort, vlan: VlanId },
    /// Caller-supplied predicate.
    Custom { desc: String, predicate: FlowPredicate },
}

impl FlowFilter {
    /// Returns true if `flow` qualifies for removal.
    pub fn accept(&self, flow: &DataFlow) -> bool {
        match self {
            FlowFilter::VNode(vnode) => flow.via_vnode(vnode),
            FlowFilter::PathPolicy(id) => flow.path_policy == Some(*id),
            FlowFilter::EdgeHost { mac, vlan } => flow
                .edge_hosts()
                .any(|host| host.mac == *mac && host.vlan == *vlan),
            FlowFilter::EdgeNetwork { port, vlan } => {
                flow.edge_hosts().any(|host| host.is_on(port, *vlan))
            }
            FlowFilter::Custom { predicate, .. } => predicate(flow),
        }
    }
}

impl fmt::Display for FlowFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowFilter::VNode(vnode) => write!(f, "vnode={}", vnode),
            FlowFilter::PathPolicy(id) => write!(f, "path-policy={}", id),
            FlowFilter::EdgeHost { mac, vlan } => write!(f, "edge-host={}@{}", mac, vlan),
            FlowFilter::EdgeNetwork { port, vlan } => write!(f, "edge-network={}@{}", port, vlan),
            FlowFilter::Custom { desc, .. } => f.write_str(desc),
        }
    }
}

impl fmt::Debug for FlowFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FlowFilter({})", self)
    }
}

/// Which tables to examine and how to find candidates in them.
#[derive(Debug, Clone)]
pub enum Selector {
    /// Every record of every tenant.
    All,
    /// Ordered scan of one tenant's table, or of every table if `tenant`
    /// is `None`.
    Scan {
        tenant: Option<String>,
        filter: FlowFilter,
    },
    /// Index bucket lookup in one tenant's table, or in every table if
    /// `tenant` is `None`.
    Index {
        tenant: Option<String>,
        key: IndexKey,
        filter: Option<FlowFilter>,
    },
    /// Explicit flow identifiers in one tenant's table.
    FlowIds { tenant: String, ids: Vec<FlowId> },
}

impl Selector {
    /// Returns the tenant this selector is restricted to, if any.
    pub fn tenant(&self) -> Option<&str> {
        match self {
            Selector::All => None,
            Selector::Scan { tenant, .. } | Selector::Index { tenant, .. } => tenant.as_deref(),
            Selector::FlowIds { tenant, .. } => Some(tenant),
        }
    }

    /// Returns the tenants to examine, given every existing tenant.
    pub fn tenants(&self, existing: Vec<String>) -> Vec<String> {
        match self.tenant() {
            Some(tenant) => existing.into_iter().filter(|t| t == tenant).collect(),
            None => existing,
        }
    }

    /// Applies the selector's refinement to a candidate.
    pub fn accept(&self, flow: &DataFlow) -> bool {
        match self {
            Selector::All | Selector::FlowIds { .. } => true,
            Selector::Scan { filter, .. } => filter.accept(flow),
            Selector::Index { key, filter, .. } => {
                key.covers(flow) && filter.as_ref().map_or(true, |f| f.accept(flow))
            }
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::All => write!(f, "all"),
            Selector::Scan { tenant, filter } => {
                write!(f, "scan[{}]: {}", tenant.as_deref().unwrap_or("*"), filter)
            }
            Selector::Index {
                tenant,
                key,
                filter,
            } => {
                write!(f, "{}[{}]", key, tenant.as_deref().unwrap_or("*"))?;
                if let Some(filter) = filter {
                    write!(f, ": {}", filter)?;
                }
                Ok(())
            }
            Selector::FlowIds { tenant, ids } => {
                let ids: Vec<_> = ids.iter().map(ToString::to_string).collect();
                write!(f, "flow-ids[{}]: {}", tenant, ids.join(","))
            }
        }
    }
}
