use anyhow::Result;
use clap::{Parser, Subcommand};
use threadweave_backend::cli;
use threadweave_backend::config::ThreadweaveConfig;
use threadweave_backend::node::ThreadweaveNode;
use threadweave_backend::telemetry;
use threadweave_backend::utils;

#[derive(Parser)]
#[command(author, version, about = "Threadweave backend daemon and CLI")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (Axum) for REST/API access
    Serve,
    /// Start the interactive CLI for users, threads, and comments
    Cli,
}

#[tokio::main]
async fn main() -> Result<()> {
    utils::print_banner();
    telemetry::init_tracing();

    let args = Args::parse();

    let config = ThreadweaveConfig::from_env()?;
    let node = ThreadweaveNode::start(config).await?;
    tracing::info!("bootstrap complete");

    let outcome = match args.command.unwrap_or(Command::Cli) {
        Command::Serve => node.run_http_server().await,
        Command::Cli => {
            let snapshot = node.snapshot();
            cli::run_cli(snapshot.config, snapshot.database).await
        }
    };

    node.shutdown()?;
    outcome
}
