//! Issue a batch of flow delete RPCs and wait for them with one deadline.

use super::service::FlowRpcService;
use super::types::RemoveFlowInput;
use crate::error::{FlowError, FlowResult, RpcError, RpcFailure};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Tracks the flow delete RPCs of one removal operation.
///
/// Requests are queued with [`invoke`](Self::invoke), dispatched together by
/// [`flush`](Self::flush) and awaited by [`verify`](Self::verify). Every
/// queued request is dispatched even if others fail.
pub struct RpcInvocationTracker {
    service: Arc<dyn FlowRpcService>,
    cancel: CancellationToken,
    queued: Vec<RemoveFlowInput>,
    inflight: Vec<(RemoveFlowInput, JoinHandle<Result<(), RpcError>>)>,
    failures: Vec<RpcFailure>,
    total: usize,
}

impl RpcInvocationTracker {
    pub fn new(service: Arc<dyn FlowRpcService>, cancel: CancellationToken) -> Self {
        Self {
            service,
            cancel,
            queued: Vec::new(),
            inflight: Vec::new(),
            failures: Vec::new(),
            total: 0,
        }
    }

    /// Queues a request. Nothing is sent until [`flush`](Self::flush).
    pub fn invoke(&mut self, input: RemoveFlowInput) {
        self.queued.push(input);
    }

    /// Number of queued requests not yet dispatched.
    pub fn pending(&self) -> usize {
        self.queued.len()
    }

    /// Number of requests dispatched or cancelled so far.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Dispatches every queued request and returns how many were queued.
    ///
    /// Must be called from within a tokio runtime. If the cancellation
    /// token has fired, queued requests are recorded as cancelled instead.
    pub fn flush(&mut self) -> usize {
        let count = self.queued.len();
        self.total += count;

        if self.cancel.is_cancelled() {
            debug!(count, "RPC dispatch skipped, executor is shutting down");
            self.failures
                .extend(self.queued.drain(..).map(|input| RpcFailure {
                    input,
                    reason: RpcError::Cancelled,
                }));
            return count;
        }

        for input in self.queued.drain(..) {
            let service = Arc::clone(&self.service);
            let request = input.clone();
            let handle = tokio::spawn(async move { service.remove_flow(request).await });
            self.inflight.push((input, handle));
        }
        count
    }

    /// Waits for every dispatched request, giving up after `timeout`.
    ///
    /// The deadline is shared by all requests. Requests still running at
    /// the deadline are reported as timed out but are left to finish on
    /// their own. Returns the number of requests issued.
    pub async fn verify(mut self, timeout: Duration) -> FlowResult<usize> {
        if !self.queued.is_empty() {
            self.flush();
        }

        let deadline = Instant::now() + timeout;
        for (input, mut handle) in self.inflight.drain(..) {
            let reason = match timeout_at(deadline, &mut handle).await {
                Ok(Ok(Ok(()))) => continue,
                Ok(Ok(Err(e))) => e,
                Ok(Err(join_err)) => RpcError::rejected(join_err.to_string()),
                Err(_) => RpcError::Timeout,
            };
            warn!(rpc = %input, error = %reason, "flow removal RPC failed");
            self.failures.push(RpcFailure { input, reason });
        }

        if self.failures.is_empty() {
            Ok(self.total)
        } else {
            Err(FlowError::RpcFailed {
                total: self.total,
                failures: self.failures,
            })
        }
    }
}
