//! Units of work executed inside a store transaction.

use crate::{TxContext, TxResult};

/// A unit of work executed inside a store transaction.
///
/// `execute` may be called more than once for a single submission when the
/// store detects a conflicting commit, so implementations must reset any
/// per-attempt state before touching the context.
pub trait TxTask<S> {
    /// Value produced by a committed transaction.
    type Output;

    /// Human-readable description used in log messages.
    fn describe(&self) -> String;

    /// Runs one transaction attempt.
    fn execute(&mut self, ctx: &mut TxContext<'_, S>) -> TxResult<Self::Output>;
}

/// Adapts a closure into a [`TxTask`].
pub struct FnTask<F> {
    desc: String,
    func: F,
}

impl<F> FnTask<F> {
    /// Creates a task that runs `func` on every attempt.
    pub fn new<S, T>(desc: impl Into<String>, func: F) -> Self
    where
        F: FnMut(&mut TxContext<'_, S>) -> TxResult<T>,
    {
        Self {
            desc: desc.into(),
            func,
        }
    }
}

impl<S, T, F> TxTask<S> for FnTask<F>
where
    F: FnMut(&mut TxContext<'_, S>) -> TxResult<T>,
{
    type Output = T;

    fn describe(&self) -> String {
        self.desc.clone()
    }

    fn execute(&mut self, ctx: &mut TxContext<'_, S>) -> TxResult<T> {
        (self.func)(ctx)
    }
}
