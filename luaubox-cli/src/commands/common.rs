use std::path::Path;

use anyhow::Context;

/// Read a script file as raw bytes.
pub fn read_source(path: &Path) -> anyhow::Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("failed to read script: {}", path.display()))
}

/// Read a script file as UTF-8 text.
pub fn read_source_text(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("failed to read script: {}", path.display()))
}
