use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod config;

#[derive(Parser)]
#[command(name = "ferry", about = "Plugin host with hot reload")]
#[command(version, propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Load plugins and keep them running until interrupted
    Run(commands::run::RunArgs),
    /// List plugin modules found in the search roots
    List(commands::list::ListArgs),
    /// Manage configuration
    Config(commands::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Run(args) => commands::run::run(args).await,
        Commands::List(args) => commands::list::run(args).await,
        Commands::Config(args) => commands::config::run(args),
    }
}
