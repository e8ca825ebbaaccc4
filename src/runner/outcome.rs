//! Terminal run classification and the per-run report.

use std::time::Duration;

use serde::Serialize;
use strum::{Display, EnumCount, EnumIter};

/// How a run ended.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumIter, EnumCount, Serialize,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum RunOutcome {
    /// The script returned without ever yielding.
    Completed,
    /// The script yielded at least once and was resumed until it returned.
    YieldedToCompletion,
    /// The CPU budget was exhausted, inside the interpreter or between resumes.
    TimedOut,
    /// A memory request was refused.
    MemoryExceeded,
    /// The source did not compile. No context was spawned.
    CompileFailed,
    /// The loader rejected the bytecode. The resume loop never started.
    LoadFailed,
    /// Any other uncaught script error.
    RuntimeError,
}

impl RunOutcome {
    /// Returns `true` for the two outcomes where the script ran to its end.
    pub fn is_success(self) -> bool {
        matches!(self, RunOutcome::Completed | RunOutcome::YieldedToCompletion)
    }

    /// Returns `true` if a quota monitor ended the run.
    pub fn is_quota(self) -> bool {
        matches!(self, RunOutcome::TimedOut | RunOutcome::MemoryExceeded)
    }
}

/// Everything the harness observed about one run.
///
/// The failure message is for the harness and its tooling only; automation consumers
/// are expected to act on [`outcome`](Self::outcome) alone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunReport {
    /// Terminal classification.
    pub outcome: RunOutcome,
    /// Number of explicit yields observed.
    pub yields: u32,
    /// Number of times the interpreter was entered.
    pub resumes: u32,
    /// CPU time elapsed since the run started.
    pub elapsed: Duration,
    /// Script-attributed bytes in use when the run ended.
    pub script_bytes: usize,
    /// Number of values returned by a completed script.
    pub returned: usize,
    /// Error text of a failed run.
    pub message: Option<String>,
}

impl RunReport {
    /// Creates an empty report for `outcome`.
    pub fn new(outcome: RunOutcome) -> Self {
        RunReport {
            outcome,
            yields: 0,
            resumes: 0,
            elapsed: Duration::ZERO,
            script_bytes: 0,
            returned: 0,
            message: None,
        }
    }

    /// Attaches a failure message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_outcome_names() {
        assert_eq!(RunOutcome::TimedOut.to_string(), "timed-out");
        assert_eq!(
            RunOutcome::YieldedToCompletion.to_string(),
            "yielded-to-completion"
        );
        assert_eq!(
            serde_json::to_string(&RunOutcome::MemoryExceeded).unwrap(),
            "\"memory-exceeded\""
        );
    }

    #[test]
    fn test_outcome_classes() {
        assert_eq!(RunOutcome::COUNT, 7);
        let successes = RunOutcome::iter().filter(|o| o.is_success()).count();
        let quotas = RunOutcome::iter().filter(|o| o.is_quota()).count();
        assert_eq!(successes, 2);
        assert_eq!(quotas, 2);
    }

    #[test]
    fn test_report_message() {
        let report = RunReport::new(RunOutcome::LoadFailed).with_message("bad header");
        assert_eq!(report.message.as_deref(), Some("bad header"));
        assert_eq!(report.resumes, 0);
    }
}
