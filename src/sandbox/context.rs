//! Disposable per-run execution contexts.
//!
//! An [`ExecutionContext`] is spawned by
//! [`HostEnvironment::spawn_context`](crate::sandbox::HostEnvironment::spawn_context),
//! loaded with bytecode exactly once, driven by the resume loop, and torn down when it is
//! dropped, whatever the outcome of the run. Teardown disarms the run's quota, lifts the
//! allocator cap and unroots the interpreter thread so the next collection can reclaim
//! it.

use std::{fmt, rc::Rc};

use mlua::{ChunkMode, MultiValue, Thread};

use crate::{
    frontend::Bytecode,
    quota::{QuotaState, QuotaTrip},
    sandbox::{
        host::{Anchor, HostEnvironment},
        identity::SandboxIdentity,
    },
    Error, Result,
};

/// Values a finished run leaves on its context for result inspection.
#[derive(Debug)]
pub enum Residue {
    /// Values returned by a script that ran to completion.
    Returned(MultiValue),
    /// The single diagnostic left by a script that failed with an error.
    Error(String),
}

impl Residue {
    /// Number of values this residue occupies.
    pub fn len(&self) -> usize {
        match self {
            Residue::Returned(values) => values.len(),
            Residue::Error(_) => 1,
        }
    }

    /// Returns `true` if nothing was left.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One script run's interpreter thread and bookkeeping.
pub struct ExecutionContext<'h> {
    host: &'h HostEnvironment,
    index: usize,
    identity: SandboxIdentity,
    baseline: usize,
    previous_limit: usize,
    thread: Option<Thread>,
    pending: Option<Residue>,
    quota: Rc<QuotaState>,
}

impl<'h> ExecutionContext<'h> {
    pub(crate) fn new(
        host: &'h HostEnvironment,
        index: usize,
        identity: SandboxIdentity,
        quota: Rc<QuotaState>,
        baseline: usize,
        previous_limit: usize,
    ) -> Self {
        ExecutionContext {
            host,
            index,
            identity,
            baseline,
            previous_limit,
            thread: None,
            pending: None,
            quota,
        }
    }

    /// Loads `bytecode` into a fresh thread with a private protected environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Load`] if the loader rejects the bytecode, or if this context
    /// was already loaded.
    pub fn load(&mut self, bytecode: &Bytecode, chunk_name: &str) -> Result<()> {
        if self.thread.is_some() {
            return Err(Error::Load("context is already loaded".into()));
        }

        let lua = self.host.lua();
        let env = self.host.private_env()?;
        let function = lua
            .load(bytecode.as_bytes())
            .set_name(chunk_name)
            .set_mode(ChunkMode::Binary)
            .set_environment(env)
            .into_function()
            .map_err(|err| Error::Load(err.to_string()))?;

        let thread = lua.create_thread(function)?;
        self.host.set_anchor(self.index, Anchor::Thread(thread.clone()));
        self.thread = Some(thread);
        Ok(())
    }

    /// Returns the loaded thread, if any.
    pub fn thread(&self) -> Option<&Thread> {
        self.thread.as_ref()
    }

    /// Returns the identity inherited from the host at spawn time.
    pub fn identity(&self) -> &SandboxIdentity {
        &self.identity
    }

    /// Returns the quota state armed for this context.
    pub fn quota(&self) -> &Rc<QuotaState> {
        &self.quota
    }

    /// Returns the anchor stack index of this context.
    pub fn depth(&self) -> usize {
        self.index
    }

    /// Returns the bytes currently attributed to the script.
    pub fn script_bytes(&self) -> usize {
        self.host.used_memory().saturating_sub(self.baseline)
    }

    /// Runs the memory monitor on growth no safe-point has seen yet.
    pub(crate) fn memory_checkpoint(&self) -> std::result::Result<(), QuotaTrip> {
        self.host.memory_checkpoint()
    }

    /// Records that the allocator refused a request during this run.
    pub(crate) fn record_refusal(&self) {
        self.host.record_refusal();
    }

    /// Leaves a residue for result inspection. Replaces anything left earlier.
    pub(crate) fn leave(&mut self, residue: Residue) {
        self.pending = Some(residue);
    }

    /// Number of values currently left for inspection.
    pub fn pending_len(&self) -> usize {
        self.pending.as_ref().map_or(0, Residue::len)
    }

    /// Returns the residue without popping it.
    pub fn pending(&self) -> Option<&Residue> {
        self.pending.as_ref()
    }

    /// Pops the residue left by the run.
    pub fn take_pending(&mut self) -> Option<Residue> {
        self.pending.take()
    }
}

impl Drop for ExecutionContext<'_> {
    fn drop(&mut self) {
        self.pending.take();
        self.thread.take();
        if !self.host.pop_anchor(self.index) {
            log::error!(
                "context {} is not on top of the anchor stack at teardown",
                self.identity
            );
        }
        self.host.release(self.previous_limit);
        log::debug!("context {} torn down", self.identity);
    }
}

impl fmt::Debug for ExecutionContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("identity", &self.identity)
            .field("depth", &self.index)
            .field("loaded", &self.thread.is_some())
            .field("pending", &self.pending_len())
            .finish()
    }
}
