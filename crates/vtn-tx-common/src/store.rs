//! In-memory transactional data store.

use crate::{PostCommitFuture, TxContext, TxError, TxHook, TxResult, TxTask};
use log::{debug, warn};
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// Default number of retries after an optimistic-lock conflict.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

#[derive(Clone)]
struct Snapshot<S> {
    version: u64,
    data: Arc<S>,
}

/// Result of a committed transaction.
pub struct TxOutcome<T> {
    output: T,
    version: u64,
    attempts: u32,
    post_commit: Vec<PostCommitFuture>,
}

impl<T: fmt::Debug> fmt::Debug for TxOutcome<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxOutcome")
            .field("output", &self.output)
            .field("version", &self.version)
            .field("attempts", &self.attempts)
            .field("post_commit", &self.post_commit.len())
            .finish()
    }
}

impl<T> TxOutcome<T> {
    /// Returns the task's output.
    pub fn output(&self) -> &T {
        &self.output
    }

    /// Returns the store version visible after the commit.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Returns how many attempts the transaction took.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Returns the number of pending post-commit completions.
    pub fn post_commit_count(&self) -> usize {
        self.post_commit.len()
    }

    /// Returns the output without waiting for post-commit work.
    ///
    /// Work started by hooks keeps running in the background.
    pub fn into_output(self) -> T {
        self.output
    }

    /// Waits until all work started by post-commit hooks has finished,
    /// then returns the output.
    pub async fn wait_post_commit(self) -> T {
        futures::future::join_all(self.post_commit).await;
        self.output
    }
}

/// In-memory copy-on-write store with optimistic concurrency control.
///
/// Each transaction works on a private clone of the latest snapshot, so a
/// large `S` should keep its parts behind `Arc` and copy them on write.
/// A transaction that wrote something commits only if no other writer
/// committed since its snapshot was taken; otherwise the attempt is
/// discarded and the task runs again, up to the configured retry limit.
/// Read-only transactions never conflict.
pub struct DataStore<S> {
    name: String,
    inner: RwLock<Snapshot<S>>,
    closed: AtomicBool,
    max_retries: AtomicU32,
}

impl<S> DataStore<S>
where
    S: Clone + Send + Sync,
{
    /// Creates a store holding `initial`.
    pub fn new(name: impl Into<String>, initial: S) -> Self {
        Self {
            name: name.into(),
            inner: RwLock::new(Snapshot {
                version: 0,
                data: Arc::new(initial),
            }),
            closed: AtomicBool::new(false),
            max_retries: AtomicU32::new(DEFAULT_MAX_RETRIES),
        }
    }

    /// Sets the number of retries after a conflicting commit.
    pub fn with_max_retries(self, max_retries: u32) -> Self {
        self.set_max_retries(max_retries);
        self
    }

    /// Changes the retry limit of a shared store. Transactions already
    /// running keep the limit they started with.
    pub fn set_max_retries(&self, max_retries: u32) {
        self.max_retries.store(max_retries, Ordering::Relaxed);
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries.load(Ordering::Relaxed)
    }

    /// Returns the store name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the latest committed state.
    pub fn snapshot(&self) -> Arc<S> {
        Arc::clone(&self.inner.read().data)
    }

    /// Returns the latest committed version. Every write commit bumps it.
    pub fn version(&self) -> u64 {
        self.inner.read().version
    }

    /// Stops accepting transactions.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Returns true if the store has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn check_open(&self) -> TxResult<()> {
        if self.is_closed() {
            return Err(TxError::Closed {
                store: self.name.clone(),
            });
        }
        Ok(())
    }

    /// Runs `f` against the latest committed state.
    pub fn read<R>(&self, f: impl FnOnce(&S) -> R) -> TxResult<R> {
        self.check_open()?;
        let data = self.snapshot();
        Ok(f(&data))
    }

    /// Executes `task` in a transaction.
    ///
    /// On success the task's writes are visible to later transactions and
    /// post-commit hooks have been started. On error nothing is committed
    /// and every hook registered by the failed attempt is discarded.
    pub fn execute<T>(&self, task: &mut T) -> TxResult<TxOutcome<T::Output>>
    where
        T: TxTask<S> + ?Sized,
    {
        let max_retries = self.max_retries();
        let mut attempt = 0;
        loop {
            self.check_open()?;
            let base = self.inner.read().clone();
            let mut working = S::clone(&base.data);
            let mut ctx = TxContext::new(&mut working, attempt);
            let result = task.execute(&mut ctx);
            let (dirty, hooks) = ctx.finish();

            let output = match result {
                Ok(output) => output,
                Err(e) => {
                    debug!("{}: {}: transaction aborted: {}", self.name, task.describe(), e);
                    abort_hooks(hooks);
                    return Err(e);
                }
            };

            let committed = {
                let mut current = self.inner.write();
                if self.is_closed() {
                    None
                } else if !dirty {
                    Some(Ok(current.version))
                } else if current.version != base.version {
                    Some(Err(current.version))
                } else {
                    current.version += 1;
                    current.data = Arc::new(working);
                    Some(Ok(current.version))
                }
            };

            match committed {
                None => {
                    abort_hooks(hooks);
                    return Err(TxError::Closed {
                        store: self.name.clone(),
                    });
                }
                Some(Err(seen)) => {
                    abort_hooks(hooks);
                    attempt += 1;
                    if attempt > max_retries {
                        warn!(
                            "{}: {}: giving up after {} conflicting attempts",
                            self.name,
                            task.describe(),
                            attempt
                        );
                        return Err(TxError::Conflict {
                            store: self.name.clone(),
                            attempts: attempt,
                        });
                    }
                    debug!(
                        "{}: {}: conflict (base version {}, current {}), retrying",
                        self.name,
                        task.describe(),
                        base.version,
                        seen
                    );
                }
                Some(Ok(version)) => {
                    let post_commit = hooks
                        .into_iter()
                        .flat_map(|hook| hook.on_commit())
                        .collect();
                    return Ok(TxOutcome {
                        output,
                        version,
                        attempts: attempt + 1,
                        post_commit,
                    });
                }
            }
        }
    }
}

fn abort_hooks(hooks: Vec<Box<dyn TxHook>>) {
    for hook in hooks {
        hook.on_abort();
    }
}
