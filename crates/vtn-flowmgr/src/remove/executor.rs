//! Two-phase flow removal: store transaction, then switch RPCs.

use super::remover::FlowRemover;
use super::result::RemovedFlows;
use super::stats::{FlowRemoveStats, FlowRemoveStatsSnapshot};
use crate::config::FlowManagerConfig;
use crate::error::{FlowError, FlowResult};
use crate::flow::{FlowId, FlowStore};
use crate::inventory::InventoryReader;
use crate::rpc::{FlowRpcService, RpcInvocationTracker};
use serde::Serialize;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{oneshot, watch, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Progress of one removal operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RemovalState {
    Pending,
    StoreCommitted,
    RpcInFlight,
    Succeeded,
    Failed,
}

impl RemovalState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RemovalState::Succeeded | RemovalState::Failed)
    }
}

/// Summary of a completed removal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemovalReport {
    pub description: String,
    pub removed: Vec<FlowId>,
    pub rpcs: usize,
    /// Set when a node clear fell back to a table-wide delete.
    pub fallback: bool,
}

/// Completion handle of a removal started by [`FlowRemoveExecutor`].
///
/// Dropping the handle does not stop the removal.
pub struct FlowRemoveHandle {
    description: String,
    state: watch::Receiver<RemovalState>,
    done: oneshot::Receiver<FlowResult<RemovalReport>>,
}

impl FlowRemoveHandle {
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the current state of the removal.
    pub fn state(&self) -> RemovalState {
        *self.state.borrow()
    }

    /// Returns a receiver that observes state changes.
    pub fn subscribe(&self) -> watch::Receiver<RemovalState> {
        self.state.clone()
    }

    /// Waits for the removal to finish.
    pub async fn wait(self) -> FlowResult<RemovalReport> {
        self.done.await.unwrap_or(Err(FlowError::ExecutorShutdown))
    }
}

/// Sender half of a [`FlowRemoveHandle`].
pub(crate) struct Completion {
    description: String,
    state: watch::Sender<RemovalState>,
    done: oneshot::Sender<FlowResult<RemovalReport>>,
}

impl Completion {
    pub(crate) fn new(description: impl Into<String>) -> (Self, FlowRemoveHandle) {
        let description = description.into();
        let (state_tx, state_rx) = watch::channel(RemovalState::Pending);
        let (done_tx, done_rx) = oneshot::channel();
        let completion = Self {
            description: description.clone(),
            state: state_tx,
            done: done_tx,
        };
        let handle = FlowRemoveHandle {
            description,
            state: state_rx,
            done: done_rx,
        };
        (completion, handle)
    }

    pub(crate) fn description(&self) -> &str {
        &self.description
    }

    pub(crate) fn set_state(&self, state: RemovalState) {
        self.state.send_replace(state);
    }

    pub(crate) fn finish(self, result: FlowResult<RemovalReport>) {
        let state = if result.is_ok() {
            RemovalState::Succeeded
        } else {
            RemovalState::Failed
        };
        self.state.send_replace(state);
        // The caller may have dropped the handle.
        let _ = self.done.send(result);
    }
}

pub(crate) struct ExecutorInner {
    pub(crate) store: Arc<FlowStore>,
    pub(crate) inventory: Arc<dyn InventoryReader>,
    pub(crate) rpc: Arc<dyn FlowRpcService>,
    pub(crate) config: FlowManagerConfig,
    runtime: Handle,
    workers: Arc<Semaphore>,
    shutdown: CancellationToken,
    pub(crate) stats: FlowRemoveStats,
}

/// Runs flow removals.
///
/// The store transaction of a removal runs on the calling thread, so store
/// errors are returned directly. If anything was removed, the RPC phase is
/// handed to a background task on the executor's runtime; at most
/// `remove_workers` RPC phases run at once. RPC failures are reported only
/// through the returned [`FlowRemoveHandle`] and never roll back the store.
#[derive(Clone)]
pub struct FlowRemoveExecutor {
    inner: Arc<ExecutorInner>,
}

impl FlowRemoveExecutor {
    /// Creates an executor spawning its background work on `runtime`.
    ///
    /// The store's retry limit is set to `config.max_tx_retries`.
    pub fn new(
        store: Arc<FlowStore>,
        inventory: Arc<dyn InventoryReader>,
        rpc: Arc<dyn FlowRpcService>,
        config: FlowManagerConfig,
        runtime: Handle,
    ) -> FlowResult<Self> {
        config.validate()?;
        store.set_max_retries(config.max_tx_retries);
        let workers = Arc::new(Semaphore::new(config.remove_workers));
        Ok(Self {
            inner: Arc::new(ExecutorInner {
                store,
                inventory,
                rpc,
                config,
                runtime,
                workers,
                shutdown: CancellationToken::new(),
                stats: FlowRemoveStats::new(),
            }),
        })
    }

    pub fn store(&self) -> &Arc<FlowStore> {
        &self.inner.store
    }

    pub fn config(&self) -> &FlowManagerConfig {
        &self.inner.config
    }

    pub fn stats(&self) -> FlowRemoveStatsSnapshot {
        self.inner.stats.snapshot()
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Stops accepting removals. RPC phases that have not dispatched yet
    /// are cancelled; RPCs already sent are left to complete.
    pub fn shutdown(&self) {
        if !self.inner.shutdown.is_cancelled() {
            info!("flow remove executor shutting down");
            self.inner.shutdown.cancel();
            self.inner.workers.close();
        }
    }

    pub(crate) fn check_running(&self) -> FlowResult<()> {
        if self.is_shutdown() {
            return Err(FlowError::ExecutorShutdown);
        }
        Ok(())
    }

    /// Removes the flows selected by `remover`.
    ///
    /// Returns once the store transaction has committed. The returned
    /// handle completes after the switch RPCs finish.
    pub fn remove_flows(&self, mut remover: FlowRemover) -> FlowResult<FlowRemoveHandle> {
        self.check_running()?;
        let (completion, handle) = Completion::new(remover.description());

        let removed = match self.inner.store.execute(&mut remover) {
            Ok(outcome) => outcome.into_output(),
            Err(e) => {
                self.inner.stats.record_failure();
                error!(remover = %remover.description(), error = %e, "flow removal aborted");
                return Err(e.into());
            }
        };
        completion.set_state(RemovalState::StoreCommitted);
        self.inner.stats.record_operation(removed.flow_count());

        if removed.is_empty() {
            debug!(remover = %remover.description(), "no flows to remove");
            let report = RemovalReport {
                description: completion.description().to_string(),
                removed: Vec::new(),
                rpcs: 0,
                fallback: false,
            };
            completion.finish(Ok(report));
            return Ok(handle);
        }

        debug!(
            remover = %remover.description(),
            flows = removed.flow_count(),
            "flows removed from store"
        );
        let inner = Arc::clone(&self.inner);
        self.inner.runtime.spawn(async move {
            let result = inner.uninstall(&completion, removed).await;
            completion.finish(result);
        });
        Ok(handle)
    }

    pub(crate) fn spawn<F>(&self, task: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        self.inner.runtime.spawn(task);
    }

    pub(crate) fn inner(&self) -> &Arc<ExecutorInner> {
        &self.inner
    }
}

impl ExecutorInner {
    /// Waits for a worker slot.
    pub(crate) async fn acquire_worker(&self) -> FlowResult<OwnedSemaphorePermit> {
        Arc::clone(&self.workers)
            .acquire_owned()
            .await
            .map_err(|_| FlowError::ExecutorShutdown)
    }

    pub(crate) fn tracker(&self) -> RpcInvocationTracker {
        RpcInvocationTracker::new(Arc::clone(&self.rpc), self.shutdown.child_token())
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    async fn uninstall(
        &self,
        completion: &Completion,
        removed: RemovedFlows,
    ) -> FlowResult<RemovalReport> {
        let _permit = self.acquire_worker().await?;
        if self.is_shutdown() {
            return Err(FlowError::Cancelled(completion.description().to_string()));
        }
        completion.set_state(RemovalState::RpcInFlight);

        let mut tracker = self.tracker();
        removed.emit_rpcs(self.inventory.as_ref(), &mut tracker);
        let report = RemovalReport {
            description: completion.description().to_string(),
            removed: removed.flow_ids(),
            rpcs: 0,
            fallback: false,
        };
        self.verify(tracker, removed.is_bulk(), report).await
    }

    /// Dispatches the tracker's requests and waits for them.
    pub(crate) async fn verify(
        &self,
        mut tracker: RpcInvocationTracker,
        bulk: bool,
        mut report: RemovalReport,
    ) -> FlowResult<RemovalReport> {
        let count = tracker.flush();
        let timeout = self.config.rpc_timeout(count, bulk);
        match tracker.verify(timeout).await {
            Ok(rpcs) => {
                self.stats.record_rpcs(rpcs, 0);
                report.rpcs = rpcs;
                info!(
                    remover = %report.description,
                    flows = report.removed.len(),
                    rpcs,
                    "flows uninstalled"
                );
                Ok(report)
            }
            Err(e) => {
                let failed = e.rpc_failures().len();
                self.stats.record_rpcs(count, failed);
                self.stats.record_failure();
                warn!(
                    remover = %report.description,
                    flows = report.removed.len(),
                    rpcs = count,
                    failed,
                    error = %e,
                    "flow uninstall failed"
                );
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::{add_flows, new_flow_store, DataFlow, FlowEntry, FlowMatch};
    use crate::testutil::{MockInventory, MockRpcService};
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use vtn_tx_common::TxError;
    use vtn_types::{OfVersion, SalNode};

    struct Fixture {
        executor: FlowRemoveExecutor,
        rpc: Arc<MockRpcService>,
    }

    fn entry(dpid: u64) -> FlowEntry {
        let node = SalNode::new(dpid);
        FlowEntry::new(node, 0, 10, FlowMatch::new().with_in_port(node.port(1)))
    }

    fn fixture() -> Fixture {
        let flow = DataFlow::new(FlowId::new(1), "vtn1").with_entry(entry(1));
        fixture_with(vec![flow])
    }

    /// Every switch used by `flows` is an OF1.3 switch.
    fn fixture_with(flows: Vec<DataFlow>) -> Fixture {
        let store = Arc::new(new_flow_store(3));
        let inventory = Arc::new(MockInventory::new());
        for hop in flows.iter().flat_map(|flow| flow.entries.iter()) {
            inventory.add_node(hop.node, OfVersion::Of13);
        }
        add_flows(&store, flows).unwrap();

        let rpc = Arc::new(MockRpcService::new());
        let executor = FlowRemoveExecutor::new(
            store,
            inventory.clone(),
            rpc.clone(),
            FlowManagerConfig::default(),
            Handle::current(),
        )
        .unwrap();
        Fixture { executor, rpc }
    }

    #[tokio::test]
    async fn test_remove_flows_reports_success() {
        let fx = fixture();
        let handle = fx
            .executor
            .remove_flows(FlowRemover::tenant("vtn1"))
            .unwrap();
        let mut state = handle.subscribe();

        let report = handle.wait().await.unwrap();
        assert_eq!(report.removed, vec![FlowId::new(1)]);
        assert_eq!(report.rpcs, 1);
        assert_eq!(*state.borrow_and_update(), RemovalState::Succeeded);
        assert_eq!(fx.rpc.call_count(), 1);

        let stats = fx.executor.stats();
        assert_eq!(stats.operations, 1);
        assert_eq!(stats.flows_removed, 1);
        assert_eq!(stats.rpcs_issued, 1);
    }

    #[tokio::test]
    async fn test_empty_removal_completes_immediately() {
        let fx = fixture();
        let handle = fx
            .executor
            .remove_flows(FlowRemover::tenant("other"))
            .unwrap();
        assert_eq!(handle.state(), RemovalState::Succeeded);
        let report = handle.wait().await.unwrap();
        assert!(report.removed.is_empty());
        assert_eq!(fx.rpc.call_count(), 0);
    }

    #[tokio::test]
    async fn test_rpc_failure_keeps_store_deletion() {
        let fx = fixture();
        fx.rpc.fail_node(SalNode::new(1));
        let handle = fx
            .executor
            .remove_flows(FlowRemover::node(SalNode::new(1)))
            .unwrap();

        let err = handle.wait().await.unwrap_err();
        assert!(matches!(err, FlowError::RpcFailed { total: 1, .. }), "{}", err);
        assert_eq!(fx.executor.store().snapshot().flow_count(), 0);
        assert_eq!(fx.executor.stats().rpc_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_uses_single_flow_timeout() {
        let fx = fixture();
        fx.rpc.delay_node(SalNode::new(1), Duration::from_secs(5));
        let started = tokio::time::Instant::now();
        let handle = fx
            .executor
            .remove_flows(FlowRemover::node(SalNode::new(1)))
            .unwrap();

        let err = handle.wait().await.unwrap_err();
        assert_eq!(err.rpc_failures()[0].reason, crate::error::RpcError::Timeout);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(3) && elapsed < Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_transitions() {
        let fx = fixture();
        fx.rpc.delay_node(SalNode::new(1), Duration::from_secs(1));
        let handle = fx
            .executor
            .remove_flows(FlowRemover::tenant("vtn1"))
            .unwrap();

        // The store phase is done when remove_flows returns; the RPC phase
        // has not been polled yet.
        let mut state = handle.subscribe();
        assert_eq!(*state.borrow_and_update(), RemovalState::StoreCommitted);
        assert_eq!(fx.executor.store().snapshot().flow_count(), 0);

        state.changed().await.unwrap();
        assert_eq!(*state.borrow_and_update(), RemovalState::RpcInFlight);
        assert!(!handle.state().is_terminal());

        handle.wait().await.unwrap();
        assert_eq!(*state.borrow(), RemovalState::Succeeded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_multi_rpc_removal_uses_bulk_timeout() {
        let flow = DataFlow::new(FlowId::new(1), "vtn1")
            .with_entry(entry(1))
            .with_entry(entry(2));
        let fx = fixture_with(vec![flow.clone()]);
        let config = fx.executor.config().clone();
        assert!(Duration::from_secs(6) > config.flow_mod_timeout());
        assert!(Duration::from_secs(6) < config.bulk_flow_mod_timeout());
        fx.rpc.delay_node(SalNode::new(1), Duration::from_secs(6));
        fx.rpc.delay_node(SalNode::new(2), Duration::from_secs(6));

        let started = tokio::time::Instant::now();
        let report = fx
            .executor
            .remove_flows(FlowRemover::flow_ids("vtn1", vec![FlowId::new(1)]))
            .unwrap()
            .wait()
            .await
            .unwrap();
        assert_eq!(report.rpcs, 2);
        assert!(started.elapsed() >= Duration::from_secs(6));

        // Past the bulk deadline the same removal times out.
        let fx = fixture_with(vec![flow]);
        fx.rpc.delay_node(SalNode::new(1), Duration::from_secs(12));
        let started = tokio::time::Instant::now();
        let err = fx
            .executor
            .remove_flows(FlowRemover::flow_ids("vtn1", vec![FlowId::new(1)]))
            .unwrap()
            .wait()
            .await
            .unwrap_err();
        assert_eq!(err.rpc_failures().len(), 1);
        let elapsed = started.elapsed();
        assert!(elapsed >= config.bulk_flow_mod_timeout());
        assert!(elapsed < Duration::from_secs(12));
    }

    #[tokio::test]
    async fn test_config_sets_store_retry_limit() {
        let fx = fixture();
        assert_eq!(
            fx.executor.store().max_retries(),
            FlowManagerConfig::default().max_tx_retries
        );
    }

    #[tokio::test]
    async fn test_store_error_is_synchronous() {
        let fx = fixture();
        fx.executor.store().close();
        let err = fx
            .executor
            .remove_flows(FlowRemover::all())
            .err()
            .unwrap();
        assert!(matches!(err, FlowError::Store(TxError::Closed { .. })));
        assert_eq!(fx.executor.stats().failed_operations, 1);
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_removals() {
        let fx = fixture();
        fx.executor.shutdown();
        assert!(fx.executor.is_shutdown());
        assert!(matches!(
            fx.executor.remove_flows(FlowRemover::all()),
            Err(FlowError::ExecutorShutdown)
        ));
        assert_eq!(fx.executor.store().snapshot().flow_count(), 1);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let config = FlowManagerConfig {
            remove_workers: 0,
            ..Default::default()
        };
        let result = FlowRemoveExecutor::new(
            Arc::new(new_flow_store(1)),
            Arc::new(MockInventory::new()),
            Arc::new(MockRpcService::new()),
            config,
            runtime.handle().clone(),
        );
        assert!(matches!(result, Err(FlowError::InvalidConfig(_))));
    }
}
