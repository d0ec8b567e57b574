mod cli;
mod commands;

use cli::{Cli, Commands};
use commands::{mismatch, opportunity, preprocess, run};
use tracing_subscriber::EnvFilter;

/// Log to stderr: warn by default, info with -v, debug with -vv. RUST_LOG wins when set.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

pub fn execute() -> anyhow::Result<()> {
    use clap::Parser;

    let cli = Cli::parse();
    init_logging(cli.verbose);

    match &cli.command {
        Commands::Preprocess => preprocess::run(&cli),
        Commands::Opportunity(args) => opportunity::run(&cli, args),
        Commands::Mismatch => mismatch::run(&cli),
        Commands::Run(args) => run::run(&cli, args),
    }
}

fn main() -> anyhow::Result<()> { execute() }
