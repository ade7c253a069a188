//! Switch inventory view used when translating removals into RPCs.

use crate::error::RpcError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use vtn_types::{OfVersion, SalNode};

/// Inventory information about a connected switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub node: SalNode,
    pub version: OfVersion,
}

impl NodeInfo {
    pub fn new(node: SalNode, version: OfVersion) -> Self {
        Self { node, version }
    }

    /// Returns true if the switch accepts cookie-masked flow deletes.
    pub fn supports_cookie_mask(&self) -> bool {
        self.version.supports_cookie_mask()
    }
}

/// A flow entry reported by a switch's flow statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledFlow {
    pub table_id: u8,
    pub priority: u16,
    pub cookie: u64,
    pub flow_match: crate::flow::FlowMatch,
}

/// Read access to the switch inventory.
#[async_trait]
pub trait InventoryReader: Send + Sync {
    /// Returns the switch if it is currently known.
    fn node(&self, node: &SalNode) -> Option<NodeInfo>;

    /// Reads the flow entries installed in one table of a switch.
    async fn read_flow_stats(
        &self,
        node: &SalNode,
        table_id: u8,
    ) -> Result<Vec<InstalledFlow>, RpcError>;
}
