//! newsdesk - inspect and feed the news agent's context memory

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use newsdesk_cli::commands::{
    CompressCommand, FingerprintCommand, IngestCommand, SearchCommand, StatsCommand,
};
use newsdesk_cli::error::CliResult;
use newsdesk_cli::output::OutputFormat;
use newsdesk_memory::Config;

#[derive(Parser)]
#[command(name = "newsdesk")]
#[command(about = "Context-budgeted memory for the news agent")]
#[command(version)]
pub struct Cli {
    #[clap(long, short, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[clap(long, short = 'd', global = true, help = "Path to data directory")]
    pub data_dir: Option<PathBuf>,

    #[clap(long, short = 'c', global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    #[clap(about = "Show the fingerprint and content id of a source reference")]
    Fingerprint(FingerprintCommand),

    #[clap(about = "Compress a text file to a character budget")]
    Compress(CompressCommand),

    #[clap(about = "Fetch, compress and store sources")]
    Ingest(IngestCommand),

    #[clap(about = "Retrieve stored content relevant to a query")]
    Search(SearchCommand),

    #[clap(about = "Show archive statistics")]
    Stats(StatsCommand),
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> CliResult<()> {
    init_logging();

    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Table
    };

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(data_dir) = cli.data_dir.clone() {
        config.storage.data_dir = data_dir;
    }

    match &cli.command {
        Command::Fingerprint(cmd) => cmd.execute(format).await,
        Command::Compress(cmd) => cmd.execute(&config, format).await,
        Command::Ingest(cmd) => cmd.execute(&config, format).await,
        Command::Search(cmd) => cmd.execute(&config, format).await,
        Command::Stats(cmd) => cmd.execute(&config, format).await,
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,newsdesk_memory=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
