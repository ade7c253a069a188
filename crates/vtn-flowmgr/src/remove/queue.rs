//! Flow removals deferred until an enclosing transaction commits.

use super::executor::FlowRemoveExecutor;
use super::remover::FlowRemover;
use crate::flow::FlowTables;
use std::any::Any;
use tracing::{debug, error, warn};
use vtn_tx_common::{PostCommitFuture, TxContext, TxHook};

/// Post-commit hook holding the removers registered by one transaction.
///
/// After the transaction commits, the removers run in registration order.
/// If it aborts, they are dropped without touching the store or switches.
pub struct FlowRemoverQueue {
    executor: FlowRemoveExecutor,
    removers: Vec<FlowRemover>,
}

impl FlowRemoverQueue {
    pub fn new(executor: FlowRemoveExecutor) -> Self {
        Self {
            executor,
            removers: Vec::new(),
        }
    }

    pub fn push(&mut self, remover: FlowRemover) {
        self.removers.push(remover);
    }

    pub fn len(&self) -> usize {
        self.removers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.removers.is_empty()
    }
}

impl TxHook for FlowRemoverQueue {
    fn on_commit(self: Box<Self>) -> Vec<PostCommitFuture> {
        let FlowRemoverQueue { executor, removers } = *self;
        let mut pending = Vec::with_capacity(removers.len());
        for remover in removers {
            let desc = remover.description().to_string();
            match executor.remove_flows(remover) {
                Ok(handle) => {
                    let done: PostCommitFuture = Box::pin(async move {
                        if let Err(e) = handle.wait().await {
                            warn!(remover = %desc, error = %e, "queued flow removal failed");
                        }
                    });
                    pending.push(done);
                }
                Err(e) => {
                    error!(remover = %desc, error = %e, "queued flow removal aborted");
                }
            }
        }
        pending
    }

    fn on_abort(self: Box<Self>) {
        debug!(
            removers = self.removers.len(),
            "transaction aborted, dropping queued flow removers"
        );
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl FlowRemoveExecutor {
    /// Schedules `remover` to run after the transaction behind `ctx`
    /// commits.
    ///
    /// A caller that must observe the removals before returning awaits
    /// [`TxOutcome::wait_post_commit`](vtn_tx_common::TxOutcome::wait_post_commit)
    /// on the transaction's outcome.
    pub fn enqueue(&self, ctx: &mut TxContext<'_, FlowTables>, remover: FlowRemover) {
        ctx.hook_or_insert_with(|| FlowRemoverQueue::new(self.clone()))
            .push(remover);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FlowManagerConfig;
    use crate::flow::{add_flows, new_flow_store, DataFlow, FlowEntry, FlowId, FlowMatch};
    use crate::testutil::{MockInventory, MockRpcService};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use tokio::runtime::Handle;
    use vtn_tx_common::{FnTask, TxError};
    use vtn_types::{OfVersion, SalNode};

    fn setup() -> (FlowRemoveExecutor, Arc<MockRpcService>) {
        let store = Arc::new(new_flow_store(3));
        let flows = (1..=3)
            .map(|id| {
                let node = SalNode::new(id);
                DataFlow::new(FlowId::new(id), "vtn1").with_entry(FlowEntry::new(
                    node,
                    0,
                    10,
                    FlowMatch::new().with_in_port(node.port(1)),
                ))
            })
            .collect();
        add_flows(&store, flows).unwrap();

        let inventory = Arc::new(MockInventory::new());
        for id in 1..=3 {
            inventory.add_node(SalNode::new(id), OfVersion::Of13);
        }
        let rpc = Arc::new(MockRpcService::new());
        let executor = FlowRemoveExecutor::new(
            store,
            inventory,
            rpc.clone(),
            FlowManagerConfig::default(),
            Handle::current(),
        )
        .unwrap();
        (executor, rpc)
    }

    #[tokio::test]
    async fn test_queued_removers_run_after_commit() {
        let (executor, rpc) = setup();
        let queue_owner = executor.clone();
        let mut task = FnTask::new("unit of work", move |ctx: &mut TxContext<'_, FlowTables>| {
            queue_owner.enqueue(ctx, FlowRemover::node(SalNode::new(2)));
            queue_owner.enqueue(ctx, FlowRemover::node(SalNode::new(1)));
            assert_eq!(ctx.hook_count(), 1);
            Ok(())
        });

        let outcome = executor.store().execute(&mut task).unwrap();
        assert_eq!(outcome.post_commit_count(), 2);
        outcome.wait_post_commit().await;

        assert_eq!(rpc.call_count(), 2);
        let tables = executor.store().snapshot();
        assert_eq!(
            tables
                .table("vtn1")
                .unwrap()
                .flows()
                .map(|f| f.id)
                .collect::<Vec<_>>(),
            vec![FlowId::new(3)]
        );
        assert_eq!(executor.stats().operations, 2);
    }

    #[tokio::test]
    async fn test_abort_discards_queued_removers() {
        let (executor, rpc) = setup();
        let queue_owner = executor.clone();
        let mut task = FnTask::new("failing unit", move |ctx: &mut TxContext<'_, FlowTables>| {
            queue_owner.enqueue(ctx, FlowRemover::all());
            Err::<(), _>(TxError::aborted("validation failed"))
        });

        assert!(executor.store().execute(&mut task).is_err());
        assert_eq!(executor.store().snapshot().flow_count(), 3);
        assert_eq!(rpc.call_count(), 0);
        assert_eq!(executor.stats().operations, 0);
    }
}
