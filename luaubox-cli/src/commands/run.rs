use std::{path::Path, time::Duration};

use luaubox::{
    quota::QuotaConfig,
    runner::{Harness, HarnessConfig, RunOutcome},
};
use serde::Serialize;

use crate::{
    app::GlobalOptions,
    commands::common::read_source,
    output::{print_output, Align, TabWriter},
};

#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub file: String,
    pub outcome: RunOutcome,
    pub yields: u32,
    pub resumes: u32,
    pub elapsed_us: u128,
    pub script_bytes: usize,
    pub returned: usize,
    pub cpu_budget_ms: u64,
    pub memory_budget_kb: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

pub fn run(
    path: &Path,
    cpu_ms: u64,
    memory_kb: usize,
    opts: &GlobalOptions,
) -> anyhow::Result<bool> {
    let source = read_source(path)?;

    let quota = QuotaConfig::new()
        .with_cpu_budget(Duration::from_millis(cpu_ms))
        .with_memory_budget(memory_kb.saturating_mul(1024));
    let chunk_name = format!(
        "={}",
        path.file_name()
            .map_or_else(|| "script".into(), |name| name.to_string_lossy())
    );
    let config = HarnessConfig::relaxed()
        .with_quota(quota)
        .with_chunk_name(chunk_name);

    let harness = Harness::new(config)?;
    let report = harness.run_bytes(&source)?;
    log::debug!("{report:?}");

    let summary = RunSummary {
        file: path.display().to_string(),
        outcome: report.outcome,
        yields: report.yields,
        resumes: report.resumes,
        elapsed_us: report.elapsed.as_micros(),
        script_bytes: report.script_bytes,
        returned: report.returned,
        cpu_budget_ms: cpu_ms,
        memory_budget_kb: memory_kb,
        message: report.message,
    };

    print_output(&summary, opts, |s| {
        let mut tw = TabWriter::new(Align::Left, Align::Left);
        tw.row("File", &s.file);
        tw.row("Outcome", s.outcome);
        tw.row("Resumes", s.resumes);
        tw.row("Yields", s.yields);
        tw.row("Returned", s.returned);
        tw.row(
            "CPU",
            format!("{} us of {} ms", s.elapsed_us, s.cpu_budget_ms),
        );
        tw.row(
            "Memory",
            format!("{} bytes of {} KiB", s.script_bytes, s.memory_budget_kb),
        );
        if let Some(message) = &s.message {
            tw.row("Message", message);
        }
        tw.print();
    })?;

    Ok(summary.outcome.is_success())
}
