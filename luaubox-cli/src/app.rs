use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// luaubox - compile, inspect and run Luau scripts under CPU and memory quotas
#[derive(Debug, Parser)]
#[command(name = "luaubox", version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOptions,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared across all subcommands.
#[derive(Debug, Parser)]
pub struct GlobalOptions {
    /// Emit output as JSON instead of human-readable text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose (debug-level) logging output.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Compile a script to bytecode, or print its diagnostics.
    Compile {
        /// Path to the Luau source file.
        #[arg(value_name = "FILE")]
        path: PathBuf,

        /// Write the bytecode to this file.
        #[arg(short, long, value_name = "OUT")]
        output: Option<PathBuf>,
    },

    /// Print the syntax tree and comment locations of a script as JSON.
    Ast {
        /// Path to the Luau source file.
        #[arg(value_name = "FILE")]
        path: PathBuf,
    },

    /// Compile and run a script in the sandbox and report the outcome.
    Run {
        /// Path to the Luau source file.
        #[arg(value_name = "FILE")]
        path: PathBuf,

        /// CPU budget in milliseconds.
        #[arg(long, value_name = "MS", default_value_t = 1000)]
        cpu_ms: u64,

        /// Memory budget in KiB.
        #[arg(long, value_name = "KIB", default_value_t = 16 * 1024)]
        memory_kb: usize,
    },
}
