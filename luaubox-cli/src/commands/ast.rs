use std::path::Path;

use luaubox::frontend::{parse_to_tree, TreeResult};

use crate::{app::GlobalOptions, commands::common::read_source_text, output::print_diagnostics};

/// The tree is JSON either way, so `--json` only affects the failure path.
pub fn run(path: &Path, opts: &GlobalOptions) -> anyhow::Result<bool> {
    let source = read_source_text(path)?;

    match parse_to_tree(&source)? {
        TreeResult::Tree(tree) => {
            println!("{}", tree.json());
            Ok(true)
        }
        TreeResult::ParseErrors(diagnostics) => {
            if opts.json {
                println!("{}", serde_json::to_string_pretty(&diagnostics)?);
            } else {
                print_diagnostics(&diagnostics);
            }
            Ok(false)
        }
    }
}
