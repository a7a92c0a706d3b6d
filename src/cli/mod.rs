// Command implementations and shared CLI plumbing

pub mod images;
pub mod parse;
pub mod render;
pub mod watch;

use anyhow::Result;
use clap::{Args, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::catalog::Catalog;
use crate::config::{env_var_non_empty, Config, Settings};
use crate::engine::{DockerEngine, ImageLister, InspectFile};
use crate::verify::{TokioProcessRunner, Verifier};

/// Verification-related CLI arguments that can be flattened into command structs
#[derive(Debug, Clone, Default, Args)]
pub struct VerifyArgs {
    /// Path to the cosign binary
    #[arg(long, global = true)]
    pub cosign: Option<PathBuf>,

    /// Public key used to verify signatures
    #[arg(long, global = true)]
    pub key: Option<PathBuf>,

    /// Maximum number of verification processes running at once
    #[arg(long, short = 'j', global = true)]
    pub concurrency: Option<usize>,

    /// Timeout for a single verification (e.g., 30s, 2m)
    #[arg(long, global = true)]
    pub timeout: Option<String>,

    /// Config file to use instead of ~/.config/sigcheck/config.json
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Read images from `docker image inspect` JSON output instead of the engine
    #[arg(long, global = true)]
    pub images_from: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

/// Wire up a catalog from CLI arguments, environment and config file
pub fn build_catalog(args: &VerifyArgs) -> Result<Catalog> {
    let config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let settings = Settings::resolve(&config, args, env_var_non_empty)?;
    debug!("Resolved settings: {:?}", settings);

    let cosign = &settings.verifier.cosign_path;
    if cosign.is_absolute() && !cosign.exists() {
        warn!(
            "Verification binary {} not found; every image will be reported as unverified",
            cosign.display()
        );
    }

    let lister: Arc<dyn ImageLister> = match &args.images_from {
        Some(path) => Arc::new(InspectFile::new(path)),
        None => Arc::new(DockerEngine::connect()?),
    };
    let verifier = Verifier::new(Arc::new(TokioProcessRunner), settings.verifier);

    Ok(Catalog::new(lister, verifier, settings.concurrency))
}
