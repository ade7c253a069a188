//! Common VTN types for virtual tenant network flow management.
//!
//! This crate provides type-safe representations of the identifiers shared by
//! the VTN control plane:
//!
//! - [`MacAddress`]: 48-bit Ethernet MAC addresses
//! - [`VlanId`]: IEEE 802.1Q VLAN identifiers (0 means untagged)
//! - [`SalNode`]: physical switch identifiers (`openflow:<dpid>`)
//! - [`SalPort`]: physical switch port identifiers (`openflow:<dpid>:<port>`)
//! - [`OfVersion`]: OpenFlow protocol version reported by a switch
//! - [`VNodeIdent`]: path to a virtual node (tenant, bridge, interface)

mod mac;
mod node;
mod vlan;
mod vnode;

pub use mac::MacAddress;
pub use node::{OfVersion, SalNode, SalPort};
pub use vlan::VlanId;
pub use vnode::VNodeIdent;

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid MAC address format: {0}")]
    InvalidMacAddress(String),

    #[error("invalid VLAN ID: {0} (must be 0-4095)")]
    InvalidVlanId(u16),

    #[error("invalid VLAN ID format: {0}")]
    InvalidVlanFormat(String),

    #[error("invalid switch node identifier: {0}")]
    InvalidNode(String),

    #[error("invalid switch port identifier: {0}")]
    InvalidPort(String),

    #[error("invalid virtual node path: {0}")]
    InvalidVNode(String),
}
