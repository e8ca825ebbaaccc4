mod app;
mod commands;
mod output;

use clap::Parser;

use crate::app::{Cli, Command};

fn main() -> anyhow::Result<()> {
    ctrlc::set_handler(|| {
        eprintln!("\nCancelled.");
        std::process::exit(130);
    })?;

    let cli = Cli::parse();

    // Show luaubox info+ on stderr unless --json; --verbose enables debug; RUST_LOG overrides
    if !cli.global.json {
        let level = if cli.global.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        };
        env_logger::Builder::new()
            .filter_module("luaubox", level)
            .parse_default_env()
            .target(env_logger::Target::Stderr)
            .format_timestamp(None)
            .format_module_path(false)
            .format_target(false)
            .init();
    }

    let success = match &cli.command {
        Command::Compile { path, output } => {
            commands::compile::run(path, output.as_deref(), &cli.global)?
        }
        Command::Ast { path } => commands::ast::run(path, &cli.global)?,
        Command::Run {
            path,
            cpu_ms,
            memory_kb,
        } => commands::run::run(path, *cpu_ms, *memory_kb, &cli.global)?,
    };

    if !success {
        std::process::exit(1);
    }
    Ok(())
}
