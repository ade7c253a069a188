//! Data flow record types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::net::Ipv4Addr;
use vtn_types::{MacAddress, SalNode, SalPort, VNodeIdent, VlanId};

/// Cookie bits shared by every flow entry installed by VTN.
pub const VTN_COOKIE_BASE: u64 = 0x7f56_0000_0000_0000;

/// Mask selecting the VTN bits of a cookie.
///
/// `(VTN_COOKIE_BASE, VTN_COOKIE_MASK)` is the install scope used to delete
/// every VTN flow entry on a switch with a single request.
pub const VTN_COOKIE_MASK: u64 = 0xffff_0000_0000_0000;

/// Returns true if `cookie` belongs to the VTN install scope.
pub const fn is_vtn_cookie(cookie: u64) -> bool {
    cookie & VTN_COOKIE_MASK == VTN_COOKIE_BASE
}

/// Globally unique identifier of a data flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlowId(u64);

impl FlowId {
    pub const fn new(id: u64) -> Self {
        FlowId(id)
    }

    pub const fn value(&self) -> u64 {
        self.0
    }

    /// Largest identifier that survives the round trip through a cookie.
    pub const MAX: FlowId = FlowId(!VTN_COOKIE_MASK);

    /// Returns true if the identifier fits in the cookie's flow id bits.
    pub const fn fits_cookie(&self) -> bool {
        self.0 & VTN_COOKIE_MASK == 0
    }

    /// Cookie carried by every flow entry of this data flow.
    pub const fn cookie(&self) -> u64 {
        VTN_COOKIE_BASE | (self.0 & !VTN_COOKIE_MASK)
    }

    /// Recovers the flow identifier from a VTN cookie.
    pub const fn from_cookie(cookie: u64) -> Option<FlowId> {
        if is_vtn_cookie(cookie) {
            Some(FlowId(cookie & !VTN_COOKIE_MASK))
        } else {
            None
        }
    }
}

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Match fields of a flow entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowMatch {
    pub in_port: Option<SalPort>,
    pub dl_src: Option<MacAddress>,
    pub dl_dst: Option<MacAddress>,
    pub vlan: Option<VlanId>,
    pub ether_type: Option<u16>,
    pub nw_src: Option<Ipv4Addr>,
    pub nw_dst: Option<Ipv4Addr>,
}

impl FlowMatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_in_port(mut self, port: SalPort) -> Self {
        self.in_port = Some(port);
        self
    }

    pub fn with_dl_src(mut self, mac: MacAddress) -> Self {
        self.dl_src = Some(mac);
        self
    }

    pub fn with_dl_dst(mut self, mac: MacAddress) -> Self {
        self.dl_dst = Some(mac);
        self
    }

    pub fn with_vlan(mut self, vlan: VlanId) -> Self {
        self.vlan = Some(vlan);
        self
    }

    pub fn with_ether_type(mut self, ether_type: u16) -> Self {
        self.ether_type = Some(ether_type);
        self
    }

    pub fn with_nw_src(mut self, addr: Ipv4Addr) -> Self {
        self.nw_src = Some(addr);
        self
    }

    pub fn with_nw_dst(mut self, addr: Ipv4Addr) -> Self {
        self.nw_dst = Some(addr);
        self
    }
}

impl fmt::Display for FlowMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut fields = Vec::new();
        if let Some(port) = &self.in_port {
            fields.push(format!("in_port={}", port));
        }
        if let Some(mac) = &self.dl_src {
            fields.push(format!("dl_src={}", mac));
        }
        if let Some(mac) = &self.dl_dst {
            fields.push(format!("dl_dst={}", mac));
        }
        if let Some(vlan) = &self.vlan {
            fields.push(format!("vlan={}", vlan));
        }
        if let Some(ether_type) = self.ether_type {
            fields.push(format!("dl_type=0x{:04x}", ether_type));
        }
        if let Some(addr) = &self.nw_src {
            fields.push(format!("nw_src={}", addr));
        }
        if let Some(addr) = &self.nw_dst {
            fields.push(format!("nw_dst={}", addr));
        }
        write!(f, "{{{}}}", fields.join(","))
    }
}

/// Action applied by a flow entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlowAction {
    Output(SalPort),
    SetVlan(VlanId),
    PopVlan,
    SetDlSrc(MacAddress),
    SetDlDst(MacAddress),
    Drop,
}

/// A match/action pair installed on one switch for one data flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowEntry {
    pub node: SalNode,
    pub table_id: u8,
    pub priority: u16,
    pub flow_match: FlowMatch,
    pub actions: Vec<FlowAction>,
}

impl FlowEntry {
    pub fn new(node: SalNode, table_id: u8, priority: u16, flow_match: FlowMatch) -> Self {
        Self {
            node,
            table_id,
            priority,
            flow_match,
            actions: Vec::new(),
        }
    }

    pub fn with_action(mut self, action: FlowAction) -> Self {
        self.actions.push(action);
        self
    }

    /// Returns the ingress port matched by this entry.
    pub fn in_port(&self) -> Option<SalPort> {
        self.flow_match.in_port
    }

    /// Returns the ports this entry forwards to.
    pub fn out_ports(&self) -> impl Iterator<Item = SalPort> + '_ {
        self.actions.iter().filter_map(|action| match action {
            FlowAction::Output(port) => Some(*port),
            _ => None,
        })
    }

    /// Returns every switch port this entry matches on or forwards to.
    pub fn ports(&self) -> BTreeSet<SalPort> {
        self.in_port().into_iter().chain(self.out_ports()).collect()
    }

    /// Returns true if this entry matches on or forwards to `port`.
    pub fn touches_port(&self, port: &SalPort) -> bool {
        self.in_port().as_ref() == Some(port) || self.out_ports().any(|p| p == *port)
    }
}

/// A MAC address + VLAN attached to a switch port at a data flow's boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeHost {
    pub mac: MacAddress,
    pub vlan: VlanId,
    pub port: SalPort,
}

impl EdgeHost {
    pub fn new(mac: MacAddress, vlan: VlanId, port: SalPort) -> Self {
        Self { mac, vlan, port }
    }

    /// Returns true if this host lives on the edge network `(port, vlan)`.
    pub fn is_on(&self, port: &SalPort, vlan: VlanId) -> bool {
        self.port == *port && self.vlan == vlan
    }
}

/// A forwarding decision installed as one flow entry per traversed switch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataFlow {
    pub id: FlowId,
    pub tenant: String,
    pub entries: Vec<FlowEntry>,
    pub path_policy: Option<u32>,
    pub route: Vec<VNodeIdent>,
    pub ingress: Option<EdgeHost>,
    pub egress: Option<EdgeHost>,
}

impl DataFlow {
    pub fn new(id: FlowId, tenant: impl Into<String>) -> Self {
        Self {
            id,
            tenant: tenant.into(),
            entries: Vec::new(),
            path_policy: None,
            route: Vec::new(),
            ingress: None,
            egress: None,
        }
    }

    pub fn with_entry(mut self, entry: FlowEntry) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn with_path_policy(mut self, policy: u32) -> Self {
        self.path_policy = Some(policy);
        self
    }

    pub fn with_hop(mut self, vnode: VNodeIdent) -> Self {
        self.route.push(vnode);
        self
    }

    pub fn with_ingress(mut self, host: EdgeHost) -> Self {
        self.ingress = Some(host);
        self
    }

    pub fn with_egress(mut self, host: EdgeHost) -> Self {
        self.egress = Some(host);
        self
    }

    /// Returns the switches this flow has entries on.
    pub fn nodes(&self) -> BTreeSet<SalNode> {
        self.entries.iter().map(|entry| entry.node).collect()
    }

    /// Returns the switch ports this flow's entries touch.
    pub fn ports(&self) -> BTreeSet<SalPort> {
        self.entries
            .iter()
            .flat_map(|entry| entry.ports())
            .collect()
    }

    /// Returns true if the virtual route passes through `vnode` or any
    /// node beneath it.
    pub fn via_vnode(&self, vnode: &VNodeIdent) -> bool {
        self.route.iter().any(|hop| vnode.contains(hop))
    }

    /// Returns the edge hosts at either end of this flow.
    pub fn edge_hosts(&self) -> impl Iterator<Item = &EdgeHost> {
        self.ingress.iter().chain(self.egress.iter())
    }
}
