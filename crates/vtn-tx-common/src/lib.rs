//! Transactional network-state store abstractions for VTN.
//!
//! This crate provides the transaction machinery shared by the VTN control
//! plane services:
//!
//! - [`DataStore`]: an in-memory, copy-on-write store with optimistic
//!   concurrency control and bounded retry on conflict
//! - [`TxTask`]: a unit of work executed inside a store transaction
//! - [`TxContext`]: the per-attempt view of the store handed to a task
//! - [`TxHook`]: work registered during a transaction that runs only after
//!   the transaction commits, and is discarded if it aborts
//!
//! # Transaction model
//!
//! 1. The store takes a snapshot of the current state
//! 2. The task reads and mutates a private working copy through [`TxContext`]
//! 3. On commit the store checks that no other writer committed in between;
//!    on conflict the attempt is thrown away and the task runs again
//! 4. After a successful commit, registered hooks fire in registration order
//!
//! A task must therefore be re-runnable: any state it accumulates has to be
//! reset at the start of [`TxTask::execute`].
//!
//! # Example
//!
//! ```
//! use vtn_tx_common::{DataStore, FnTask, TxContext};
//!
//! let store = DataStore::new("counters", 0u32);
//! let mut task = FnTask::new("increment", |ctx: &mut TxContext<'_, u32>| {
//!     *ctx.write() += 1;
//!     Ok(*ctx.read())
//! });
//! let outcome = store.execute(&mut task).unwrap();
//! assert_eq!(*outcome.output(), 1);
//! assert_eq!(*store.snapshot(), 1);
//! ```

mod context;
mod error;
mod store;
mod task;

pub use context::{PostCommitFuture, TxContext, TxHook};
pub use error::{TxError, TxResult};
pub use store::{DataStore, TxOutcome, DEFAULT_MAX_RETRIES};
pub use task::{FnTask, TxTask};
