//! Running scripts: the resume loop, outcomes, invariants and the harness pipeline.
//!
//! - [`ResumeLoop`] - drives one execution context through
//!   `Loaded -> Running <-> Suspended -> Completed | Failed`
//! - [`RunOutcome`] / [`RunReport`] - terminal classification of a run
//! - [`InvariantChecker`] - verifies the host came back to its pre-run state
//! - [`Harness`] - compile, spawn, load, resume, check, discard
//! - [`fuzz_one`] - the fuzzing entry point

mod harness;
mod invariant;
mod outcome;
mod resume;

pub use harness::{fuzz_one, Harness, HarnessConfig, DEFAULT_CHUNK_NAME};
pub use invariant::{InvariantChecker, InvariantViolation};
pub use outcome::{RunOutcome, RunReport};
pub use resume::{LoopState, ResumeLoop};
