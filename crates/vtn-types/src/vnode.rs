//! Virtual node path.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Path to a virtual node inside a tenant.
///
/// A path names a tenant, optionally a bridge inside it, and optionally an
/// interface attached to that bridge. Rendered as `tenant[/bridge[/iface]]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VNodeIdent {
    tenant: String,
    bridge: Option<String>,
    interface: Option<String>,
}

impl VNodeIdent {
    /// Identifies a tenant.
    pub fn tenant(tenant: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            bridge: None,
            interface: None,
        }
    }

    /// Identifies a bridge in a tenant.
    pub fn bridge(tenant: impl Into<String>, bridge: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            bridge: Some(bridge.into()),
            interface: None,
        }
    }

    /// Identifies an interface attached to a bridge.
    pub fn interface(
        tenant: impl Into<String>,
        bridge: impl Into<String>,
        interface: impl Into<String>,
    ) -> Self {
        Self {
            tenant: tenant.into(),
            bridge: Some(bridge.into()),
            interface: Some(interface.into()),
        }
    }

    pub fn tenant_name(&self) -> &str {
        &self.tenant
    }

    pub fn bridge_name(&self) -> Option<&str> {
        self.bridge.as_deref()
    }

    pub fn interface_name(&self) -> Option<&str> {
        self.interface.as_deref()
    }

    /// Returns true if `other` is this node or lies beneath it.
    ///
    /// A tenant contains all of its bridges, and a bridge contains all of
    /// its interfaces.
    pub fn contains(&self, other: &VNodeIdent) -> bool {
        if self.tenant != other.tenant {
            return false;
        }
        match (&self.bridge, &other.bridge) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(b1), Some(b2)) if b1 != b2 => false,
            (Some(_), Some(_)) => match (&self.interface, &other.interface) {
                (None, _) => true,
                (Some(i1), Some(i2)) => i1 == i2,
                (Some(_), None) => false,
            },
        }
    }
}

impl fmt::Display for VNodeIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tenant)?;
        if let Some(bridge) = &self.bridge {
            write!(f, "/{}", bridge)?;
        }
        if let Some(iface) = &self.interface {
            write!(f, "/{}", iface)?;
        }
        Ok(())
    }
}

impl FromStr for VNodeIdent {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('/').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(ParseError::InvalidVNode(s.to_string()));
        }
        match parts.as_slice() {
            [tenant] => Ok(Self::tenant(*tenant)),
            [tenant, bridge] => Ok(Self::bridge(*tenant, *bridge)),
            [tenant, bridge, iface] => Ok(Self::interface(*tenant, *bridge, *iface)),
            _ => Err(ParseError::InvalidVNode(s.to_string())),
        }
    }
}
