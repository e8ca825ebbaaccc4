// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # luaubox
//!
//! A resource-bounded sandbox harness for untrusted Luau scripts.
//!
//! `luaubox` compiles script source to bytecode and runs that bytecode inside an isolated
//! execution context of a locked Luau host, under independently enforced CPU-time and
//! memory budgets. It is built for running adversarial or fuzz-generated scripts without
//! risking runaway execution, unbounded allocation or a corrupted host.
//!
//! ## Features
//!
//! - **Located diagnostics** - parse errors as `(line,column): message`, lowering failures
//!   as a single message
//! - **JSON syntax trees** - the parsed tree plus comment locations
//! - **CPU budget** - enforced at interpreter safe-points and between resumes
//! - **Memory budget** - two-tier accounting at every safe-point, with an allocator ceiling
//!   as a backstop and refusals that `pcall` cannot hide
//! - **Isolation** - one locked host, one disposable context per run, private globals
//! - **Invariant checks** - the host must come back balanced after every run
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use luaubox::prelude::*;
//!
//! let harness = Harness::new(HarnessConfig::default())?;
//!
//! let report = harness.run_source("while true do end")?;
//! assert_eq!(report.outcome, RunOutcome::TimedOut);
//!
//! let report = harness.run_source("return 'ok'")?;
//! assert_eq!(report.outcome, RunOutcome::Completed);
//! # Ok::<(), luaubox::Error>(())
//! ```
//!
//! ## Architecture
//!
//! Data flows through the modules in this order:
//!
//! - [`frontend`] - source text to [`frontend::Bytecode`] or diagnostics, and to JSON trees
//! - [`sandbox`] - the locked [`sandbox::HostEnvironment`] and per-run
//!   [`sandbox::ExecutionContext`]s
//! - [`quota`] - the CPU and memory monitors armed for each run
//! - [`runner`] - the resume loop, invariant checker and the [`runner::Harness`] pipeline
//!
//! ### Enforcement Granularity
//!
//! The interpreter cannot be preempted mid-instruction. Quotas take effect at its
//! safe-points (loop back-edges, calls) and whenever the resume loop is about to re-enter
//! a yielded script. A script can therefore overrun the CPU budget by at most one
//! safe-point interval. Memory requests are refused all-or-nothing at the allocator.
//!
//! ### Thread Model
//!
//! The interpreter is single-threaded. Hosts are neither `Send` nor `Sync`; each OS
//! thread that needs one gets its own through [`sandbox::HostEnvironment::shared`].
//!
//! ## Error Handling
//!
//! Harness operations return [`Result<T, Error>`](Result). Script failures are not
//! errors; they are classified as a [`runner::RunOutcome`]:
//!
//! ```rust,no_run
//! use luaubox::{runner::{Harness, HarnessConfig}, Error};
//!
//! let harness = Harness::new(HarnessConfig::default())?;
//! match harness.run_source("error('boom')") {
//!     Ok(report) => println!("{}", report.outcome),
//!     Err(Error::ContextBusy) => println!("host is busy"),
//!     Err(e) => println!("harness failure: {e}"),
//! }
//! # Ok::<(), luaubox::Error>(())
//! ```
//!
//! ## Development and Testing
//!
//! ### Fuzzing
//!
//! ```bash
//! cargo install cargo-fuzz
//!
//! # Run scripts under quotas
//! cargo +nightly fuzz run script --release
//!
//! # Syntax tree rendering
//! cargo +nightly fuzz run tree --release -- -jobs=4 -fork=1
//! ```
//!
//! ### Testing
//!
//! ```bash
//! cargo test
//! cargo bench
//! ```

pub(crate) mod error;

/// Shared functionality which is used in unit- and integration-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types.
///
/// # Example
///
/// ```rust,no_run
/// use luaubox::prelude::*;
///
/// let bytecode = compile("return 1").into_result()?;
/// let harness = Harness::new(HarnessConfig::fuzzing())?;
/// let report = harness.run_bytecode(&bytecode)?;
/// println!("{}", report.outcome);
/// # Ok::<(), luaubox::Error>(())
/// ```
pub mod prelude;

/// Source text to bytecode, syntax trees and located diagnostics.
pub mod frontend;

/// CPU and memory quota monitors.
pub mod quota;

/// Locked host environment and disposable execution contexts.
pub mod sandbox;

/// Resume loop, run outcomes, invariant checks and the harness pipeline.
pub mod runner;

/// `luaubox` Result type
///
/// A type alias for `std::result::Result<T, Error>` where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `luaubox` Error type
///
/// The main error type for all operations in this crate.
pub use error::Error;

pub use runner::fuzz_one;
