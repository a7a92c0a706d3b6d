use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod catalog;
mod cli;
mod config;
mod engine;
mod image;
mod verify;

use cli::{OutputFormat, VerifyArgs};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    verify_args: VerifyArgs,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List local images and their signature status
    #[command(visible_alias = "ls")]
    #[command(visible_alias = "l")]
    List {
        /// Only list images, do not run verification
        #[arg(long)]
        no_verify: bool,
        /// Output format
        #[arg(long, short, value_enum, default_value_t)]
        output: OutputFormat,
    },
    /// Verify all local images and show the ones with a valid signature
    #[command(visible_alias = "v")]
    Verify {
        /// Fail if any image cannot be verified
        #[arg(long)]
        require_all: bool,
        /// Output format
        #[arg(long, short, value_enum, default_value_t)]
        output: OutputFormat,
    },
    /// Show the image table and re-verify on demand
    #[command(visible_alias = "w")]
    Watch,
    /// Split image references into registry, user, name, tag and digest
    Parse {
        /// Image references (e.g., alpine:3.19, registry.io/team/app:2.3)
        #[arg(required = true)]
        references: Vec<String>,
        /// Output format
        #[arg(long, short, value_enum, default_value_t)]
        output: OutputFormat,
    },
}

fn default_log_level(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so table and JSON output stay clean
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_log_level(cli.verbose).into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match &cli.command {
        Commands::List { no_verify, output } => {
            let mut catalog = cli::build_catalog(&cli.verify_args)?;
            cli::images::list_images(&mut catalog, *no_verify, *output).await?;
        }
        Commands::Verify {
            require_all,
            output,
        } => {
            let mut catalog = cli::build_catalog(&cli.verify_args)?;
            cli::images::verify_images(&mut catalog, *require_all, *output).await?;
        }
        Commands::Watch => {
            let catalog = cli::build_catalog(&cli.verify_args)?;
            cli::watch::watch_images(catalog).await?;
        }
        Commands::Parse { references, output } => {
            cli::parse::parse_references(references, *output)?;
        }
    }

    Ok(())
}
