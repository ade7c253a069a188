//! Removal of every VTN flow entry installed on one switch.
//!
//! Unlike [`FlowRemover`](super::FlowRemover), clearing a switch does not
//! touch the flow store; it only cleans up the switch itself, for example
//! after the switch reconnects with stale entries.
//!
//! When the switch cannot tell which entries belong to VTN, every entry in
//! the configured table is deleted. That may also remove entries installed
//! by other applications sharing the switch.

use super::executor::{
    Completion, FlowRemoveExecutor, FlowRemoveHandle, RemovalReport, RemovalState,
};
use crate::error::{FlowError, FlowResult, RpcError};
use crate::flow::is_vtn_cookie;
use crate::rpc::RemoveFlowInput;
use tracing::{debug, warn};
use vtn_types::SalNode;

impl FlowRemoveExecutor {
    /// Uninstalls every VTN flow entry from `node`.
    pub fn clear_node(&self, node: SalNode) -> FlowResult<FlowRemoveHandle> {
        self.check_running()?;
        let (completion, handle) = Completion::new(format!("clear node={}", node));
        let executor = self.clone();
        self.spawn(async move {
            let result = executor.clear_node_rpcs(&completion, node).await;
            completion.finish(result);
        });
        Ok(handle)
    }

    async fn clear_node_rpcs(
        &self,
        completion: &Completion,
        node: SalNode,
    ) -> FlowResult<RemovalReport> {
        let inner = self.inner();
        let _permit = inner.acquire_worker().await?;
        if inner.is_shutdown() {
            return Err(FlowError::Cancelled(completion.description().to_string()));
        }
        completion.set_state(RemovalState::RpcInFlight);
        inner.stats.record_operation(0);

        let table_id = inner.config.flow_table_id;
        let mut tracker = inner.tracker();
        let mut bulk = true;
        let fallback = match inner.inventory.node(&node) {
            None => {
                warn!(
                    node = %node,
                    table_id,
                    "switch not in inventory, deleting all flows in table"
                );
                true
            }
            Some(info) if info.supports_cookie_mask() => {
                tracker.invoke(RemoveFlowInput::install_scope(node));
                false
            }
            Some(_) => {
                let stats = tokio::time::timeout(
                    inner.config.flow_stats_timeout(),
                    inner.inventory.read_flow_stats(&node, table_id),
                )
                .await
                .unwrap_or(Err(RpcError::Timeout));
                match stats {
                    Ok(flows) => {
                        bulk = false;
                        for flow in flows.iter().filter(|flow| is_vtn_cookie(flow.cookie)) {
                            tracker.invoke(RemoveFlowInput::installed(node, flow));
                        }
                        debug!(node = %node, rpcs = tracker.pending(), "VTN flow entries found");
                        false
                    }
                    Err(e) => {
                        warn!(
                            node = %node,
                            table_id,
                            error = %e,
                            "cannot read flow statistics, deleting all flows in table"
                        );
                        true
                    }
                }
            }
        };

        if fallback {
            inner.stats.record_fallback();
            tracker.invoke(RemoveFlowInput::table(node, table_id));
        }

        let report = RemovalReport {
            description: completion.description().to_string(),
            removed: Vec::new(),
            rpcs: 0,
            fallback,
        };
        inner.verify(tracker, bulk, report).await
    }
}
