//! Per-attempt transaction context and post-commit hooks.

use futures::future::BoxFuture;
use std::any::Any;

/// Completion of work started by a post-commit hook.
///
/// Dropping the future does not cancel the work; it only gives up the
/// ability to wait for it.
pub type PostCommitFuture = BoxFuture<'static, ()>;

/// Work that must run only after the enclosing transaction commits.
///
/// Hooks are registered on a [`TxContext`] while the task runs. If the
/// attempt commits, [`TxHook::on_commit`] is called once, in registration
/// order; otherwise [`TxHook::on_abort`] is called and the hook is dropped.
pub trait TxHook: Any + Send {
    /// Runs the hook after a successful commit.
    ///
    /// Returns futures that resolve when the work the hook started has
    /// finished, so that synchronous callers can wait for it.
    fn on_commit(self: Box<Self>) -> Vec<PostCommitFuture>;

    /// Discards the hook after an aborted attempt.
    fn on_abort(self: Box<Self>) {}

    /// Upcast used to locate a hook by type.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// View of the store handed to a [`TxTask`](crate::TxTask) for one attempt.
///
/// Reads see a snapshot taken when the attempt began plus this attempt's
/// own writes. Writes become visible to others only if the attempt commits.
pub struct TxContext<'a, S> {
    state: &'a mut S,
    attempt: u32,
    dirty: bool,
    hooks: Vec<Box<dyn TxHook>>,
}

impl<'a, S> TxContext<'a, S> {
    pub(crate) fn new(state: &'a mut S, attempt: u32) -> Self {
        Self {
            state,
            attempt,
            dirty: false,
            hooks: Vec::new(),
        }
    }

    /// Returns the transaction's view of the store.
    pub fn read(&self) -> &S {
        &*self.state
    }

    /// Returns the working copy for modification.
    pub fn write(&mut self) -> &mut S {
        self.dirty = true;
        &mut *self.state
    }

    /// Returns true if [`TxContext::write`] has been called.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Zero-based attempt number (non-zero after a conflict retry).
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Registers a post-commit hook.
    pub fn add_hook(&mut self, hook: Box<dyn TxHook>) {
        self.hooks.push(hook);
    }

    /// Returns the registered hook of type `H`, if any.
    pub fn hook_mut<H: TxHook>(&mut self) -> Option<&mut H> {
        self.hooks
            .iter_mut()
            .find_map(|hook| hook.as_any_mut().downcast_mut::<H>())
    }

    /// Returns the hook of type `H`, registering one built by `f` if the
    /// transaction does not have one yet.
    pub fn hook_or_insert_with<H, F>(&mut self, f: F) -> &mut H
    where
        H: TxHook,
        F: FnOnce() -> H,
    {
        let index = match self
            .hooks
            .iter_mut()
            .position(|hook| hook.as_any_mut().is::<H>())
        {
            Some(index) => index,
            None => {
                self.hooks.push(Box::new(f()));
                self.hooks.len() - 1
            }
        };

        match self.hooks[index].as_any_mut().downcast_mut::<H>() {
            Some(hook) => hook,
            None => unreachable!("hook type checked above"),
        }
    }

    /// Returns the number of registered hooks.
    pub fn hook_count(&self) -> usize {
        self.hooks.len()
    }

    pub(crate) fn finish(self) -> (bool, Vec<Box<dyn TxHook>>) {
        (self.dirty, self.hooks)
    }
}
