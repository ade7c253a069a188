//! Physical switch and switch port identifiers.
//!
//! Switches are addressed by their OpenFlow datapath ID and rendered in the
//! inventory's string form (`openflow:<dpid>`); ports append the port number
//! (`openflow:<dpid>:<port>`).

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const NODE_PREFIX: &str = "openflow:";

/// Identifier of a physical switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SalNode(u64);

impl SalNode {
    /// Creates a node identifier from a datapath ID.
    pub const fn new(dpid: u64) -> Self {
        SalNode(dpid)
    }

    /// Returns the datapath ID.
    pub const fn dpid(&self) -> u64 {
        self.0
    }

    /// Returns the identifier of port `number` on this switch.
    pub const fn port(&self, number: u32) -> SalPort {
        SalPort::new(*self, number)
    }
}

impl fmt::Display for SalNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", NODE_PREFIX, self.0)
    }
}

impl FromStr for SalNode {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix(NODE_PREFIX)
            .and_then(|id| id.parse().ok())
            .map(SalNode)
            .ok_or_else(|| ParseError::InvalidNode(s.to_string()))
    }
}

impl TryFrom<String> for SalNode {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<SalNode> for String {
    fn from(node: SalNode) -> String {
        node.to_string()
    }
}

/// Identifier of a physical switch port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SalPort {
    node: SalNode,
    number: u32,
}

impl SalPort {
    /// Creates a port identifier.
    pub const fn new(node: SalNode, number: u32) -> Self {
        Self { node, number }
    }

    /// Returns the switch this port belongs to.
    pub const fn node(&self) -> SalNode {
        self.node
    }

    /// Returns the port number.
    pub const fn number(&self) -> u32 {
        self.number
    }
}

impl fmt::Display for SalPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.node, self.number)
    }
}

impl FromStr for SalPort {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseError::InvalidPort(s.to_string());
        let (node, number) = s.rsplit_once(':').ok_or_else(invalid)?;
        let node: SalNode = node.parse().map_err(|_| invalid())?;
        let number = number.parse().map_err(|_| invalid())?;
        Ok(SalPort::new(node, number))
    }
}

impl TryFrom<String> for SalPort {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<SalPort> for String {
    fn from(port: SalPort) -> String {
        port.to_string()
    }
}

/// OpenFlow protocol version negotiated with a switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OfVersion {
    /// OpenFlow 1.0.
    Of10,
    /// OpenFlow 1.3.
    Of13,
}

impl OfVersion {
    /// Returns true if flow-delete requests may filter by cookie mask.
    ///
    /// OpenFlow 1.0 has no cookie mask in FLOW_MOD, so entries on such
    /// switches must be removed one by one with strict matching.
    pub const fn supports_cookie_mask(&self) -> bool {
        matches!(self, OfVersion::Of13)
    }
}

impl fmt::Display for OfVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OfVersion::Of10 => write!(f, "OF1.0"),
            OfVersion::Of13 => write!(f, "OF1.3"),
        }
    }
}
