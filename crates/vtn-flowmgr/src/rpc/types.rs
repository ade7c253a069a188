//! Flow delete requests sent to switches.

use crate::flow::{FlowEntry, FlowId, FlowMatch, VTN_COOKIE_BASE, VTN_COOKIE_MASK};
use crate::inventory::InstalledFlow;
use serde::{Deserialize, Serialize};
use std::fmt;
use vtn_types::SalNode;

/// Cookie and mask a delete request matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CookieMatch {
    pub cookie: u64,
    pub mask: u64,
}

impl CookieMatch {
    /// Matches exactly one cookie value.
    pub const fn exact(cookie: u64) -> Self {
        Self {
            cookie,
            mask: u64::MAX,
        }
    }

    /// Matches every entry installed by VTN.
    pub const fn install_scope() -> Self {
        Self {
            cookie: VTN_COOKIE_BASE,
            mask: VTN_COOKIE_MASK,
        }
    }
}

/// A single flow delete request for one switch.
///
/// Fields left as `None` are wildcards. A strict request removes only the
/// entry whose match and priority are identical; a non-strict one removes
/// every entry the request covers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoveFlowInput {
    pub node: SalNode,
    pub table_id: Option<u8>,
    pub priority: Option<u16>,
    pub flow_match: Option<FlowMatch>,
    pub cookie: Option<CookieMatch>,
    pub strict: bool,
}

impl RemoveFlowInput {
    /// Deletes exactly `entry` by strict match and priority.
    pub fn strict_entry(entry: &FlowEntry) -> Self {
        Self {
            node: entry.node,
            table_id: Some(entry.table_id),
            priority: Some(entry.priority),
            flow_match: Some(entry.flow_match.clone()),
            cookie: None,
            strict: true,
        }
    }

    /// Deletes the entries of flow `id` in `entry`'s table by exact cookie.
    pub fn flow_cookie(entry: &FlowEntry, id: FlowId) -> Self {
        Self {
            node: entry.node,
            table_id: Some(entry.table_id),
            priority: None,
            flow_match: None,
            cookie: Some(CookieMatch::exact(id.cookie())),
            strict: false,
        }
    }

    /// Deletes every VTN entry on `node` in all tables.
    pub fn install_scope(node: SalNode) -> Self {
        Self {
            node,
            table_id: None,
            priority: None,
            flow_match: None,
            cookie: Some(CookieMatch::install_scope()),
            strict: false,
        }
    }

    /// Deletes a flow reported by the switch's statistics.
    pub fn installed(node: SalNode, flow: &InstalledFlow) -> Self {
        Self {
            node,
            table_id: Some(flow.table_id),
            priority: Some(flow.priority),
            flow_match: Some(flow.flow_match.clone()),
            cookie: None,
            strict: true,
        }
    }

    /// Deletes every entry in one table, VTN-installed or not.
    pub fn table(node: SalNode, table_id: u8) -> Self {
        Self {
            node,
            table_id: Some(table_id),
            priority: None,
            flow_match: None,
            cookie: None,
            strict: false,
        }
    }

    /// Returns true if this request may delete more than one entry.
    pub fn is_bulk(&self) -> bool {
        !self.strict
            && self.flow_match.is_none()
            && self.cookie.map_or(true, |c| c.mask != u64::MAX)
    }
}

impl fmt::Display for RemoveFlowInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "remove-flow{{node={}", self.node)?;
        if let Some(table) = self.table_id {
            write!(f, ",table={}", table)?;
        }
        if let Some(priority) = self.priority {
            write!(f, ",priority={}", priority)?;
        }
        if let Some(c) = &self.cookie {
            write!(f, ",cookie=0x{:x}/0x{:x}", c.cookie, c.mask)?;
        }
        if let Some(m) = &self.flow_match {
            write!(f, ",match={}", m)?;
        }
        if self.strict {
            write!(f, ",strict")?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_request_shapes() {
        let node = SalNode::new(7);
        let entry = FlowEntry::new(node, 2, 100, FlowMatch::new().with_in_port(node.port(3)));

        let strict = RemoveFlowInput::strict_entry(&entry);
        assert!(strict.strict);
        assert!(!strict.is_bulk());

        let by_cookie = RemoveFlowInput::flow_cookie(&entry, FlowId::new(9));
        assert_eq!(by_cookie.cookie, Some(CookieMatch::exact(0x7f56_0000_0000_0009)));
        assert!(!by_cookie.is_bulk());

        assert!(RemoveFlowInput::install_scope(node).is_bulk());
        assert!(RemoveFlowInput::table(node, 0).is_bulk());
    }

    #[test]
    fn test_display() {
        let node = SalNode::new(1);
        assert_eq!(
            RemoveFlowInput::install_scope(node).to_string(),
            "remove-flow{node=openflow:1,cookie=0x7f56000000000000/0xffff000000000000}"
        );
        let entry = FlowEntry::new(node, 0, 10, FlowMatch::new().with_in_port(node.port(2)));
        assert_eq!(
            RemoveFlowInput::strict_entry(&entry).to_string(),
            "remove-flow{node=openflow:1,table=0,priority=10,match={in_port=openflow:1:2},strict}"
        );
    }
}
