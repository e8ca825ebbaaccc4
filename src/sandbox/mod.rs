//! Isolation context manager.
//!
//! This module owns the two levels of isolation every script run goes through:
//!
//! - [`HostEnvironment`] - one locked interpreter state per OS thread. It carries the
//!   protected builtin surface, the safe-point callback that enforces quotas, and the
//!   sandbox identity.
//! - [`ExecutionContext`] - one disposable interpreter thread per run, with a private
//!   global environment, its own memory category and an identity inherited from the
//!   host through an [`InheritancePolicy`].
//!
//! # Memory Categories
//!
//! The interpreter does not expose allocation tags. A context's memory category is
//! therefore defined as everything allocated after the context was spawned: the host
//! records the total in use at spawn time as the context's baseline, and the exact
//! script usage is the current total minus that baseline. This only attributes
//! correctly while a single context is alive, which the host enforces by refusing to
//! spawn a second one ([`Error::ContextBusy`](crate::Error::ContextBusy)).
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::rc::Rc;
//! use luaubox::prelude::*;
//!
//! let host = HostEnvironment::create()?;
//! let quota = Rc::new(QuotaState::new(QuotaConfig::default()));
//! let bytecode = compile("return 1").into_result()?;
//!
//! let mut context = host.spawn_context(quota)?;
//! context.load(&bytecode, "=example")?;
//! # Ok::<(), luaubox::Error>(())
//! ```

mod context;
mod host;
mod identity;

pub use context::{ExecutionContext, Residue};
pub use host::HostEnvironment;
pub use identity::{InheritFromHost, InheritancePolicy, SandboxIdentity, DEFAULT_SANDBOX_NAME};
