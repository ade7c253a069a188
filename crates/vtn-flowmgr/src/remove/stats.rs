//! Flow removal counters.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters maintained by the flow remove executor.
#[derive(Debug, Default)]
pub struct FlowRemoveStats {
    operations: AtomicU64,
    failed_operations: AtomicU64,
    flows_removed: AtomicU64,
    rpcs_issued: AtomicU64,
    rpc_failures: AtomicU64,
    fallbacks: AtomicU64,
}

/// Point-in-time copy of [`FlowRemoveStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FlowRemoveStatsSnapshot {
    pub operations: u64,
    pub failed_operations: u64,
    pub flows_removed: u64,
    pub rpcs_issued: u64,
    pub rpc_failures: u64,
    pub fallbacks: u64,
}

impl FlowRemoveStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_operation(&self, flows: usize) {
        self.operations.fetch_add(1, Ordering::Relaxed);
        self.flows_removed
            .fetch_add(flows as u64, Ordering::Relaxed);
    }

    pub fn record_rpcs(&self, issued: usize, failed: usize) {
        self.rpcs_issued.fetch_add(issued as u64, Ordering::Relaxed);
        self.rpc_failures
            .fetch_add(failed as u64, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed_operations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fallback(&self) {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> FlowRemoveStatsSnapshot {
        FlowRemoveStatsSnapshot {
            operations: self.operations.load(Ordering::Relaxed),
            failed_operations: self.failed_operations.load(Ordering::Relaxed),
            flows_removed: self.flows_removed.load(Ordering::Relaxed),
            rpcs_issued: self.rpcs_issued.load(Ordering::Relaxed),
            rpc_failures: self.rpc_failures.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
        }
    }
}
