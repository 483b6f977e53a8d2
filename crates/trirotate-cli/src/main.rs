mod cli;
mod commands;
mod config;
mod error;
mod utils;

use clap::Parser;
use tracing::error;
use tracing_subscriber::filter::LevelFilter;

fn main() {
    let cli = cli::Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let result = match cli.command {
        cli::Commands::Run(args) => commands::run::run(args),
    };

    if let Err(e) = result {
        error!("{e}");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Log to stderr, keeping stdout for the run summary.
fn init_logging(verbosity: u8, quiet: bool) {
    let level = if quiet {
        LevelFilter::OFF
    } else {
        match verbosity {
            0 => LevelFilter::WARN,
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}
