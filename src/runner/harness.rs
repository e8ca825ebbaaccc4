//! The end-to-end harness pipeline.
//!
//! [`Harness`] strings the components together for one script at a time:
//!
//! ```text
//! source -> compile -> spawn context -> load -> resume loop -> settle -> teardown
//!        -> collect -> check invariants
//! ```
//!
//! Each run constructs its own [`QuotaState`]; the only thing runs share is the locked
//! host. Compile failures are reported as [`RunOutcome::CompileFailed`] without ever
//! touching the host.
//!
//! # Configuration
//!
//! | Field | Default | `fuzzing()` | `relaxed()` |
//! |-------|---------|-------------|-------------|
//! | `quota.cpu_budget` | 10 ms | 10 ms | 1 s |
//! | `quota.memory_budget` | 256 KiB | 256 KiB | 16 MiB |
//! | `chunk_name` | `=script` | `=fuzz` | `=script` |
//! | `collect_after_run` | `true` | `true` | `true` |
//! | `abort_on_violation` | `true` | `true` | `true` |
//!
//! # Example
//!
//! ```rust,no_run
//! use luaubox::prelude::*;
//!
//! let harness = Harness::new(HarnessConfig::default())?;
//! let report = harness.run_source("return 1 + 1")?;
//! assert_eq!(report.outcome, RunOutcome::Completed);
//! # Ok::<(), luaubox::Error>(())
//! ```

use std::{rc::Rc, time::Duration};

use crate::{
    frontend::{compile, compile_bytes, Bytecode, CompileResult},
    quota::{QuotaConfig, QuotaState},
    runner::{
        invariant::InvariantChecker,
        outcome::{RunOutcome, RunReport},
        resume::ResumeLoop,
    },
    sandbox::HostEnvironment,
    Result,
};

/// Chunk name used when none is configured.
pub const DEFAULT_CHUNK_NAME: &str = "=script";

/// Harness configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HarnessConfig {
    /// Budgets applied to every run.
    pub quota: QuotaConfig,

    /// Chunk name reported in script error messages and tracebacks.
    pub chunk_name: String,

    /// Whether to run a full collection on the host after every run.
    ///
    /// Bounds host memory growth across many runs. Disabling it is only useful for
    /// benchmarking the run itself.
    pub collect_after_run: bool,

    /// Whether an invariant violation aborts the process.
    ///
    /// When `false`, the violation is returned as
    /// [`Error::Invariant`](crate::Error::Invariant) instead. The host must not be
    /// reused after that.
    pub abort_on_violation: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        HarnessConfig {
            quota: QuotaConfig::default(),
            chunk_name: DEFAULT_CHUNK_NAME.to_string(),
            collect_after_run: true,
            abort_on_violation: true,
        }
    }
}

impl HarnessConfig {
    /// Configuration used by the fuzz entry point.
    pub fn fuzzing() -> Self {
        HarnessConfig {
            chunk_name: "=fuzz".to_string(),
            ..Default::default()
        }
    }

    /// Generous budgets for running scripts by hand.
    pub fn relaxed() -> Self {
        HarnessConfig {
            quota: QuotaConfig::new()
                .with_cpu_budget(Duration::from_secs(1))
                .with_memory_budget(16 * 1024 * 1024),
            ..Default::default()
        }
    }

    /// Sets the run budgets.
    #[must_use]
    pub fn with_quota(mut self, quota: QuotaConfig) -> Self {
        self.quota = quota;
        self
    }

    /// Sets the chunk name.
    #[must_use]
    pub fn with_chunk_name(mut self, name: impl Into<String>) -> Self {
        self.chunk_name = name.into();
        self
    }

    /// Sets whether the host is collected after every run.
    #[must_use]
    pub fn with_collect_after_run(mut self, collect: bool) -> Self {
        self.collect_after_run = collect;
        self
    }

    /// Sets whether invariant violations abort the process.
    #[must_use]
    pub fn with_abort_on_violation(mut self, abort: bool) -> Self {
        self.abort_on_violation = abort;
        self
    }
}

/// Runs scripts one at a time on a locked host.
#[derive(Debug)]
pub struct Harness {
    host: Rc<HostEnvironment>,
    config: HarnessConfig,
}

impl Harness {
    /// Creates a harness on this thread's shared host.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`](crate::Error::InvalidConfig) for a zero budget,
    /// or the host creation error.
    pub fn new(config: HarnessConfig) -> Result<Self> {
        Self::with_host(HostEnvironment::shared()?, config)
    }

    /// Creates a harness on `host`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`](crate::Error::InvalidConfig) for a zero budget.
    pub fn with_host(host: Rc<HostEnvironment>, config: HarnessConfig) -> Result<Self> {
        config.quota.validate()?;
        Ok(Harness { host, config })
    }

    /// Returns the host runs execute on.
    pub fn host(&self) -> &HostEnvironment {
        &self.host
    }

    /// Returns the configuration.
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Compiles and runs `source`.
    ///
    /// # Errors
    ///
    /// Script failures are never errors; they are reported through
    /// [`RunReport::outcome`]. See [`run_bytecode`](Self::run_bytecode) for the errors
    /// that remain.
    pub fn run_source(&self, source: &str) -> Result<RunReport> {
        self.run_compiled(compile(source))
    }

    /// Compiles and runs raw source bytes with C-string semantics.
    ///
    /// # Errors
    ///
    /// See [`run_bytecode`](Self::run_bytecode).
    pub fn run_bytes(&self, source: &[u8]) -> Result<RunReport> {
        self.run_compiled(compile_bytes(source))
    }

    fn run_compiled(&self, compiled: CompileResult) -> Result<RunReport> {
        match compiled {
            CompileResult::Bytecode(bytecode) => self.run_bytecode(&bytecode),
            failed => {
                let message = failed.error_text().unwrap_or_default();
                Ok(RunReport::new(RunOutcome::CompileFailed).with_message(message))
            }
        }
    }

    /// Loads and runs `bytecode` in a fresh execution context.
    ///
    /// # Errors
    ///
    /// - [`Error::ContextBusy`](crate::Error::ContextBusy) if a context of the host is
    ///   already alive
    /// - [`Error::Lua`](crate::Error::Lua) if the interpreter refuses to spawn the context
    ///   or to collect afterwards
    /// - [`Error::Invariant`](crate::Error::Invariant) if the host was left unbalanced and
    ///   `abort_on_violation` is off
    pub fn run_bytecode(&self, bytecode: &Bytecode) -> Result<RunReport> {
        let quota = Rc::new(QuotaState::new(self.config.quota));
        let checker = InvariantChecker::new(&self.host);

        let (report, settled) = {
            let mut context = self.host.spawn_context(Rc::clone(&quota))?;
            let report = match context.load(bytecode, &self.config.chunk_name) {
                Ok(()) => ResumeLoop::new(&mut context).run(),
                Err(err) => {
                    log::debug!("context {} rejected bytecode: {err}", context.identity());
                    RunReport::new(RunOutcome::LoadFailed).with_message(err.to_string())
                }
            };
            let settled = checker.settle(&mut context, report.outcome);
            (report, settled)
        };

        if self.config.collect_after_run {
            self.host.collect()?;
        }

        let checked = settled.and_then(|_| checker.check(&self.host, &quota));
        if self.config.abort_on_violation {
            InvariantChecker::enforce(checked);
        } else {
            checked?;
        }
        Ok(report)
    }
}

/// Runs arbitrary bytes as script source under the fuzzing configuration.
///
/// Malformed input is an expected, silent rejection. The function only fails loudly, by
/// aborting the process, when a sandbox invariant is violated.
pub fn fuzz_one(data: &[u8]) {
    let harness = match Harness::new(HarnessConfig::fuzzing()) {
        Ok(harness) => harness,
        Err(err) => {
            log::warn!("fuzz harness unavailable: {err}");
            return;
        }
    };

    if let Err(err) = harness.run_bytes(data) {
        log::debug!("fuzz input rejected: {err}");
    }
}
