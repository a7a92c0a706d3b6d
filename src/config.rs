use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::catalog::DEFAULT_CONCURRENCY;
use crate::cli::VerifyArgs;
use crate::verify::VerifierSettings;

/// Default location of the verification binary
pub const DEFAULT_COSIGN_PATH: &str = "/data/bin/linux/cosign";
/// Public key every image signature is checked against
pub const DEFAULT_PUBLIC_KEY_PATH: &str = "/data/cosign.pub";
pub const DEFAULT_VERIFY_TIMEOUT: Duration = Duration::from_secs(60);

/// Global config file (`~/.config/sigcheck/config.json`)
#[derive(Debug, Serialize, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub cosign_path: Option<PathBuf>,
    pub public_key_path: Option<PathBuf>,
    pub concurrency: Option<usize>,
    /// Duration string, e.g. "30s" or "2m"
    pub verify_timeout: Option<String>,
}

impl Config {
    /// Get the path to the config file
    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Failed to get home directory")?;
        Ok(home.join(".config").join("sigcheck").join("config.json"))
    }

    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from `path`, falling back to defaults if it does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config file at {}, using defaults", path.display());
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let config: Config = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        debug!("Loaded config from {}", path.display());
        Ok(config)
    }
}

/// Read an environment variable, treating empty strings as if the variable is not set.
pub fn env_var_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Fully resolved runtime settings
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub verifier: VerifierSettings,
    pub concurrency: usize,
}

impl Settings {
    /// Merge CLI flags, environment and config file
    ///
    /// Precedence (highest to lowest):
    /// 1. CLI flags (VerifyArgs)
    /// 2. Environment variables (SIGCHECK_*)
    /// 3. Config file
    /// 4. Defaults
    pub fn resolve(
        config: &Config,
        args: &VerifyArgs,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let cosign_path = args
            .cosign
            .clone()
            .or_else(|| env("SIGCHECK_COSIGN").map(PathBuf::from))
            .or_else(|| config.cosign_path.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_COSIGN_PATH));

        let public_key_path = args
            .key
            .clone()
            .or_else(|| env("SIGCHECK_KEY").map(PathBuf::from))
            .or_else(|| config.public_key_path.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PUBLIC_KEY_PATH));

        let concurrency = match args.concurrency {
            Some(n) => n,
            None => match env("SIGCHECK_CONCURRENCY") {
                Some(s) => s
                    .parse()
                    .with_context(|| format!("Invalid SIGCHECK_CONCURRENCY '{}'", s))?,
                None => config.concurrency.unwrap_or(DEFAULT_CONCURRENCY),
            },
        };
        if concurrency == 0 {
            bail!("Concurrency must be at least 1");
        }

        let timeout = match args
            .timeout
            .clone()
            .or_else(|| env("SIGCHECK_TIMEOUT"))
            .or_else(|| config.verify_timeout.clone())
        {
            Some(s) => parse_duration(&s)?,
            None => DEFAULT_VERIFY_TIMEOUT,
        };

        Ok(Self {
            verifier: VerifierSettings {
                cosign_path,
                public_key_path,
                timeout,
            },
            concurrency,
        })
    }
}

/// Parse duration strings like "500ms", "30s", "2m", "1h"
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        bail!("Duration string is empty");
    }

    let (num_str, unit) = if let Some(num_str) = s.strip_suffix("ms") {
        (num_str, "ms")
    } else {
        let split = s.len() - s.chars().last().map(char::len_utf8).unwrap_or(0);
        (&s[..split], &s[split..])
    };

    let num: u64 = num_str
        .parse()
        .with_context(|| format!("Invalid duration number in '{}'", s))?;

    let secs_per_unit = match unit {
        "ms" => return Ok(Duration::from_millis(num)),
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        _ => bail!("Invalid duration unit '{}'. Use ms, s, m, or h", unit),
    };

    let secs = match num.checked_mul(secs_per_unit) {
        Some(secs) => secs,
        None => bail!("Duration '{}' is too large", s),
    };
    let duration = Duration::from_secs(secs);

    Ok(duration)
}
