use std::path::Path;

use anyhow::Context;
use luaubox::frontend::{compile_bytes, CompileResult, Diagnostic, COMPILE_OPTIONS_VERSION};
use serde::Serialize;

use crate::{
    app::GlobalOptions,
    commands::common::read_source,
    output::{print_diagnostics, print_output, Align, TabWriter},
};

#[derive(Debug, Serialize)]
pub struct CompileSummary {
    pub file: String,
    pub success: bool,
    pub bytecode_size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytecode_version: Option<u8>,
    pub options_version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub fn run(path: &Path, output: Option<&Path>, opts: &GlobalOptions) -> anyhow::Result<bool> {
    let source = read_source(path)?;
    let result = compile_bytes(&source);

    let mut summary = CompileSummary {
        file: path.display().to_string(),
        success: result.is_success(),
        bytecode_size: 0,
        bytecode_version: None,
        options_version: COMPILE_OPTIONS_VERSION,
        output: None,
        diagnostics: result.diagnostics().to_vec(),
        error: None,
    };

    match &result {
        CompileResult::Bytecode(bytecode) => {
            summary.bytecode_size = bytecode.len();
            summary.bytecode_version = bytecode.version();
            if let Some(out) = output {
                std::fs::write(out, bytecode.as_bytes())
                    .with_context(|| format!("failed to write bytecode: {}", out.display()))?;
                summary.output = Some(out.display().to_string());
            }
        }
        CompileResult::ParseErrors(_) => {}
        CompileResult::LowerError(message) => summary.error = Some(message.clone()),
    }

    print_output(&summary, opts, |s| {
        if !s.success {
            print_diagnostics(&s.diagnostics);
            if let Some(error) = &s.error {
                eprintln!("{error}");
            }
            return;
        }

        let mut tw = TabWriter::new(Align::Left, Align::Right);
        tw.row("File", &s.file);
        tw.row("Bytecode", format!("{} bytes", s.bytecode_size));
        if let Some(version) = s.bytecode_version {
            tw.row("Format", version);
        }
        tw.row("Options", format!("v{}", s.options_version));
        if let Some(out) = &s.output {
            tw.row("Written", out);
        }
        tw.print();
    })?;

    Ok(summary.success)
}
