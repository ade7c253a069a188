//! Switch flow-programming RPC service.

use super::types::RemoveFlowInput;
use crate::error::RpcError;
use async_trait::async_trait;

/// Service that uninstalls flow entries from switches.
///
/// Each call carries one delete request; the returned future completes when
/// the switch has acknowledged or rejected it.
#[async_trait]
pub trait FlowRpcService: Send + Sync {
    async fn remove_flow(&self, input: RemoveFlowInput) -> Result<(), RpcError>;
}
