//! Shared, protected host environment.
//!
//! A [`HostEnvironment`] wraps one Luau interpreter state. Creation follows a fixed
//! order that is never repeated for the lifetime of the host:
//!
//! 1. Install the builtin surface (safe standard libraries and the `sandbox` table).
//! 2. Register the safe-point callback that drives the quota monitors of whichever run
//!    is currently armed.
//! 3. Lock the host. All builtin bindings and metatables become read-only to scripts,
//!    and so does the global table every interpreter thread inherits.
//!
//! After the lock, scripts only ever run inside an
//! [`ExecutionContext`](crate::sandbox::ExecutionContext), which owns a private global
//! environment layered over the locked one.
//!
//! # Memory Refusals
//!
//! The safe-point callback feeds the memory monitor, which is what decides a memory
//! trip. The interpreter allocator is capped well above the budget as a backstop for
//! single huge requests. Such a refusal surfaces in the script as a `"not enough
//! memory"` error; the installed `pcall` and `xpcall` report it to the armed run
//! before handing it back, so catching it does not hide it from the harness.
//!
//! # Anchor Stack
//!
//! The host keeps a stack of anchors, one per live context. An anchor roots the
//! context's interpreter thread. Spawning pushes, teardown pops; after every run the
//! stack depth must be back at its pre-run value.
//!
//! # Thread Model
//!
//! The interpreter state is not thread-safe, so a host is neither `Send` nor `Sync`.
//! [`HostEnvironment::shared`] hands out one lazily created host per OS thread.

use std::{
    cell::{Cell, RefCell},
    fmt,
    rc::Rc,
};

use mlua::{Function, Lua, Table, Thread, VmState};

use crate::{
    quota::{QuotaState, QuotaTrip},
    sandbox::{
        context::ExecutionContext,
        identity::{InheritFromHost, InheritancePolicy, SandboxIdentity, DEFAULT_SANDBOX_NAME},
    },
    Error, Result,
};

/// Wraps `pcall` and `xpcall` so a caught allocator refusal still reaches the harness.
const GUARD_PROTECTED_CALLS: &str = r#"
local pcall, xpcall, type, refused = pcall, xpcall, type, ...
local MEMORY_ERROR = "not enough memory"

local function settle(ok, ...)
    if not ok and (...) == MEMORY_ERROR then
        refused()
    end
    return ok, ...
end

local function guarded_pcall(f, ...)
    return settle(pcall(f, ...))
end

local function guarded_xpcall(f, handler, ...)
    if type(handler) ~= "function" then
        return settle(xpcall(f, handler, ...))
    end
    return settle(xpcall(f, function(err)
        if err == MEMORY_ERROR then
            refused()
        end
        return handler(err)
    end, ...))
end

return guarded_pcall, guarded_xpcall
"#;

/// What `getmetatable` returns for a script environment.
const PROTECTED_METATABLE: &str = "The metatable is locked";

thread_local! {
    static SHARED: RefCell<Option<Rc<HostEnvironment>>> = const { RefCell::new(None) };
}

/// Something rooted on the host's anchor stack.
pub(crate) enum Anchor {
    /// Slot reserved by a spawned context that has not loaded code yet.
    Reserved,
    /// A loaded interpreter thread, rooted until teardown.
    Thread(#[allow(dead_code)] Thread),
}

/// State of the run currently armed on the host, read by the safe-point callback.
#[derive(Default)]
pub(crate) struct RunSlot {
    quota: RefCell<Option<Rc<QuotaState>>>,
    identity: RefCell<Option<SandboxIdentity>>,
    baseline: Cell<usize>,
    ceiling: Cell<usize>,
    last_seen: Cell<usize>,
}

impl RunSlot {
    pub(crate) fn arm(
        &self,
        quota: Rc<QuotaState>,
        identity: SandboxIdentity,
        baseline: usize,
        ceiling: usize,
    ) {
        *self.quota.borrow_mut() = Some(quota);
        *self.identity.borrow_mut() = Some(identity);
        self.baseline.set(baseline);
        self.ceiling.set(ceiling);
        self.last_seen.set(baseline);
    }

    pub(crate) fn disarm(&self) {
        self.quota.borrow_mut().take();
        self.identity.borrow_mut().take();
        self.baseline.set(0);
        self.ceiling.set(0);
        self.last_seen.set(0);
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.quota.borrow().is_some()
    }

    fn armed(&self) -> Option<Rc<QuotaState>> {
        self.quota.borrow().clone()
    }

    fn identity(&self) -> Option<SandboxIdentity> {
        self.identity.borrow().clone()
    }

    /// Returns the usage at the previous checkpoint and now, and moves the mark.
    fn advance(&self, lua: &Lua) -> (usize, usize) {
        let used = lua.used_memory();
        (self.last_seen.replace(used), used)
    }

    /// Exact script usage, recomputed now, without the growth under review.
    fn exact(&self, lua: &Lua, growth: usize) -> usize {
        lua.used_memory()
            .saturating_sub(self.baseline.get())
            .saturating_sub(growth)
    }

    /// Runs both monitors for one interpreter safe-point.
    fn safepoint(&self, lua: &Lua) -> std::result::Result<(), QuotaTrip> {
        let Some(quota) = self.armed() else {
            return Ok(());
        };
        let (previous, used) = self.advance(lua);
        quota.on_safepoint(previous, used, || self.exact(lua, used - previous.min(used)))
    }

    /// Runs the memory monitor on the growth since the last safe-point.
    fn memory_checkpoint(&self, lua: &Lua) -> std::result::Result<(), QuotaTrip> {
        let Some(quota) = self.armed() else {
            return Ok(());
        };
        let (previous, used) = self.advance(lua);
        quota.admit_memory(previous, used, || self.exact(lua, used - previous.min(used)))
    }

    /// Records a request the allocator ceiling refused.
    fn refused(&self, used: usize) {
        let Some(quota) = self.armed() else {
            return;
        };
        // The refused request did not fit under the ceiling.
        let requested = self.ceiling.get().saturating_sub(used).saturating_add(1);
        quota.record(QuotaTrip::Memory {
            requested,
            in_use: used.saturating_sub(self.baseline.get()),
            budget: quota.config().memory_budget,
        });
    }
}

/// The process-lifetime, locked host environment.
pub struct HostEnvironment {
    lua: Lua,
    identity: SandboxIdentity,
    policy: Box<dyn InheritancePolicy>,
    slot: Rc<RunSlot>,
    anchors: RefCell<Vec<Anchor>>,
    runs: Cell<u64>,
}

impl HostEnvironment {
    /// Creates and locks a host with the default identity and [`InheritFromHost`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Lua`] if the interpreter rejects any setup step.
    pub fn create() -> Result<Self> {
        Self::with_policy(
            SandboxIdentity::root(DEFAULT_SANDBOX_NAME),
            Box::new(InheritFromHost),
        )
    }

    /// Creates and locks a host with a custom identity and inheritance policy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Lua`] if the interpreter rejects any setup step.
    pub fn with_policy(
        identity: SandboxIdentity,
        policy: Box<dyn InheritancePolicy>,
    ) -> Result<Self> {
        let host = HostEnvironment {
            lua: Lua::new(),
            identity,
            policy,
            slot: Rc::new(RunSlot::default()),
            anchors: RefCell::new(Vec::new()),
            runs: Cell::new(0),
        };

        host.install_builtins()?;
        host.register_monitors();
        host.lock()?;

        log::debug!("host {} created and locked", host.identity);
        Ok(host)
    }

    /// Returns this OS thread's shared host, creating it on first use.
    ///
    /// # Errors
    ///
    /// Returns the creation error if the host could not be built. A failed creation is
    /// retried on the next call.
    pub fn shared() -> Result<Rc<HostEnvironment>> {
        SHARED.with(|cell| {
            if let Some(host) = cell.borrow().as_ref() {
                return Ok(Rc::clone(host));
            }

            let host = Rc::new(HostEnvironment::create()?);
            *cell.borrow_mut() = Some(Rc::clone(&host));
            Ok(host)
        })
    }

    fn install_builtins(&self) -> Result<()> {
        let slot = Rc::clone(&self.slot);
        let host_identity = self.identity.clone();
        let identity = self.lua.create_function(move |_, ()| {
            let current = slot.identity().unwrap_or_else(|| host_identity.clone());
            Ok(current.to_string())
        })?;

        let module = self.lua.create_table()?;
        module.set("identity", identity)?;
        self.lua.globals().set("sandbox", module)?;

        let slot = Rc::clone(&self.slot);
        let refused = self.lua.create_function(move |lua, ()| {
            slot.refused(lua.used_memory());
            Ok(())
        })?;
        let (pcall, xpcall): (Function, Function) = self
            .lua
            .load(GUARD_PROTECTED_CALLS)
            .set_name("=sandbox")
            .call(refused)?;
        self.lua.globals().set("pcall", pcall)?;
        self.lua.globals().set("xpcall", xpcall)?;
        Ok(())
    }

    fn register_monitors(&self) {
        let slot = Rc::clone(&self.slot);
        self.lua.set_interrupt(move |lua| match slot.safepoint(lua) {
            Ok(()) => Ok(VmState::Continue),
            Err(trip) => Err(mlua::Error::external(trip)),
        });
    }

    fn lock(&self) -> Result<()> {
        self.lua.sandbox(true)?;
        // Threads inherit this proxy; it must not become a channel between runs.
        self.lua.globals().set_readonly(true);
        Ok(())
    }

    /// Returns the host's root identity.
    pub fn identity(&self) -> &SandboxIdentity {
        &self.identity
    }

    /// Returns the depth of the anchor stack.
    pub fn stack_depth(&self) -> usize {
        self.anchors.borrow().len()
    }

    /// Returns the number of contexts spawned so far.
    pub fn runs(&self) -> u64 {
        self.runs.get()
    }

    /// Returns `true` while a context is alive on this host.
    pub fn is_busy(&self) -> bool {
        self.slot.is_armed()
    }

    /// Returns the interpreter's total allocated bytes.
    pub fn used_memory(&self) -> usize {
        self.lua.used_memory()
    }

    /// Runs a full garbage collection cycle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Lua`] if the collector fails.
    pub fn collect(&self) -> Result<()> {
        self.lua.gc_collect()?;
        Ok(())
    }

    /// Spawns a fresh execution context armed with `quota`.
    ///
    /// The context's memory category starts here: every byte allocated after this call
    /// and before teardown is attributed to the script. Until teardown, the interpreter
    /// allocator is capped at that baseline plus the
    /// [`allocator_ceiling`](crate::quota::QuotaConfig::allocator_ceiling).
    ///
    /// # Errors
    ///
    /// Returns [`Error::ContextBusy`] if another context of this host is alive.
    pub fn spawn_context(&self, quota: Rc<QuotaState>) -> Result<ExecutionContext<'_>> {
        if self.slot.is_armed() {
            return Err(Error::ContextBusy);
        }

        let run = self.runs.get() + 1;
        self.runs.set(run);
        let identity = self.policy.inherit(&self.identity, run);

        let baseline = self.lua.used_memory();
        let ceiling = baseline.saturating_add(quota.config().allocator_ceiling());
        let previous_limit = self.lua.set_memory_limit(ceiling)?;
        quota.memory().reset();
        self.slot.arm(Rc::clone(&quota), identity.clone(), baseline, ceiling);

        let index = {
            let mut anchors = self.anchors.borrow_mut();
            anchors.push(Anchor::Reserved);
            anchors.len() - 1
        };

        log::debug!(
            "spawned context {identity} at depth {index}, baseline {baseline} bytes"
        );
        Ok(ExecutionContext::new(
            self,
            index,
            identity,
            quota,
            baseline,
            previous_limit,
        ))
    }

    /// Creates a private global environment for one context.
    ///
    /// Reads fall through to the locked host globals; writes stay in the private table.
    /// The metatable is hidden from `getmetatable` and cannot be replaced.
    pub(crate) fn private_env(&self) -> Result<Table> {
        let env = self.lua.create_table()?;
        let meta = self.lua.create_table()?;
        meta.raw_set("__index", self.lua.globals())?;
        meta.raw_set("__metatable", PROTECTED_METATABLE)?;
        meta.set_readonly(true);
        env.set_metatable(Some(meta));
        Ok(env)
    }

    /// Runs the memory monitor outside a safe-point, for the end of a run.
    pub(crate) fn memory_checkpoint(&self) -> std::result::Result<(), QuotaTrip> {
        self.slot.memory_checkpoint(&self.lua)
    }

    /// Records an allocator refusal against the armed run.
    pub(crate) fn record_refusal(&self) {
        self.slot.refused(self.lua.used_memory());
    }

    pub(crate) fn lua(&self) -> &Lua {
        &self.lua
    }

    pub(crate) fn set_anchor(&self, index: usize, anchor: Anchor) {
        if let Some(slot) = self.anchors.borrow_mut().get_mut(index) {
            *slot = anchor;
        }
    }

    /// Pops the anchor at `index` if it is on top. Returns `false` otherwise.
    pub(crate) fn pop_anchor(&self, index: usize) -> bool {
        let mut anchors = self.anchors.borrow_mut();
        if anchors.len() == index + 1 {
            anchors.pop();
            true
        } else {
            false
        }
    }

    /// Ends the armed run and lifts the allocator cap.
    pub(crate) fn release(&self, previous_limit: usize) {
        self.slot.disarm();
        if let Err(err) = self.lua.set_memory_limit(previous_limit) {
            log::warn!("failed to restore memory limit: {err}");
        }
    }
}

impl fmt::Debug for HostEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostEnvironment")
            .field("identity", &self.identity)
            .field("stack_depth", &self.stack_depth())
            .field("runs", &self.runs.get())
            .finish()
    }
}
