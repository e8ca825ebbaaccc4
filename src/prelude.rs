//! # luaubox Prelude
//!
//! This module provides a convenient prelude for the most commonly used types from the
//! luaubox library. Import this module to get quick access to everything needed to
//! compile and run a script under quotas.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all luaubox operations
pub use crate::Error;

/// The result type used throughout luaubox
pub use crate::Result;

// ================================================================================================
// Front-End
// ================================================================================================

/// Compilation entry points and results
pub use crate::frontend::{compile, compile_bytes, Bytecode, CompileResult};

/// Syntax tree entry point and results
pub use crate::frontend::{parse_to_tree, SyntaxTree, TreeResult};

/// Located diagnostics
pub use crate::frontend::{render_diagnostics, Diagnostic};

// ================================================================================================
// Quotas and Isolation
// ================================================================================================

/// Budgets and per-run monitor state
pub use crate::quota::{QuotaConfig, QuotaState, QuotaTrip};

/// Host environment and execution contexts
pub use crate::sandbox::{ExecutionContext, HostEnvironment, SandboxIdentity};

// ================================================================================================
// Running Scripts
// ================================================================================================

/// Harness pipeline and configuration
pub use crate::runner::{fuzz_one, Harness, HarnessConfig};

/// Run classification
pub use crate::runner::{RunOutcome, RunReport};

/// Lower-level loop and invariant checks
pub use crate::runner::{InvariantChecker, LoopState, ResumeLoop};
