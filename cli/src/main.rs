use clap::{Parser, Subcommand};
use commands::{
    inspect::{run_inspect, InspectArgs},
    spool::{run_spool, SpoolArgs},
};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

#[derive(Parser, Debug)]
#[command(author, version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Spool(SpoolArgs),
    Inspect(InspectArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // log to stderr, stdout carries the records
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Spool(args) => run_spool(args).await,
        Commands::Inspect(args) => run_inspect(args).await,
    }
}
