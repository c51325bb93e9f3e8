mod commands;
mod summary;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tuneframe", about = "Assemble polarimetric products from tunable-filter frames")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show frame archive contents
    Info(commands::info::InfoArgs),
    /// List sequences or resolve one into its channel layout
    Tables(commands::tables::TablesArgs),
    /// Print or save the default assembly config
    Config(commands::config::ConfigArgs),
    /// Assemble products from a frame archive
    Run(commands::run::RunArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match &cli.command {
        Commands::Info(args) => commands::info::run(args),
        Commands::Tables(args) => commands::tables::run(args),
        Commands::Config(args) => commands::config::run(args),
        Commands::Run(args) => commands::run::run(args),
    }
}
