use comfy_table::{presets, CellAlignment, ContentArrangement, Table};
use luaubox::frontend::Diagnostic;
use serde::Serialize;

use crate::app::GlobalOptions;

/// Print `data` as JSON (if `--json`) or call `display_fn` for human-readable output.
pub fn print_output<T: Serialize>(
    data: &T,
    opts: &GlobalOptions,
    display_fn: impl FnOnce(&T),
) -> anyhow::Result<()> {
    if opts.json {
        let json = serde_json::to_string_pretty(data)?;
        println!("{json}");
    } else {
        display_fn(data);
    }
    Ok(())
}

/// Print diagnostics in `(line,column): message` form on stderr.
pub fn print_diagnostics(diagnostics: &[Diagnostic]) {
    for diagnostic in diagnostics {
        eprintln!("{diagnostic}");
    }
}

/// Column alignment for tabular output.
#[derive(Clone, Copy)]
pub enum Align {
    Left,
    Right,
}

/// Key/value writer backed by `comfy-table`, without borders or separators.
pub struct TabWriter {
    table: Table,
    aligns: [Align; 2],
}

impl TabWriter {
    /// Create a two-column writer with the given alignments.
    pub fn new(key: Align, value: Align) -> Self {
        let mut table = Table::new();
        table
            .load_preset(presets::NOTHING)
            .set_content_arrangement(ContentArrangement::Dynamic);

        Self {
            table,
            aligns: [key, value],
        }
    }

    /// Add a `key: value` row.
    pub fn row(&mut self, key: &str, value: impl ToString) {
        self.table.add_row(vec![format!("{key}:"), value.to_string()]);
    }

    /// Print the table to stdout.
    pub fn print(mut self) {
        // Columns only exist once rows were added.
        for (i, align) in self.aligns.into_iter().enumerate() {
            let cell_align = match align {
                Align::Left => CellAlignment::Left,
                Align::Right => CellAlignment::Right,
            };
            if let Some(col) = self.table.column_mut(i) {
                col.set_cell_alignment(cell_align);
                col.set_padding(if i == 0 { (0, 1) } else { (1, 0) });
            }
        }

        for line in self.table.to_string().lines() {
            println!("{}", line.trim_end());
        }
    }
}
