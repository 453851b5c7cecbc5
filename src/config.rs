//! Tool configuration: CLI flags, `.formgram.toml`, and `FORMGRAM_`-prefixed env vars
use std::path::PathBuf;

use clap::Args;
use figment::{
    providers::{Env, Format as _, Toml},
    value::{Dict, Map},
    Figment, Metadata, Profile, Provider,
};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::error::{Error, Result};

/// The parsed and validated config for the tool (§2 "Configuration").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[skip_serializing_none]
#[non_exhaustive]
pub struct Config {
    /// Stop parsing after this many bytes from the start offset, unless overridden per-invocation.
    pub byte_limit: Option<u64>,
    /// Stop parsing after this many records, unless overridden per-invocation.
    pub record_limit: Option<usize>,
    /// Default output format for subcommands that print a tool-surface result.
    pub json: bool,
    /// Minify JSON output.
    pub compact: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            byte_limit: None,
            record_limit: None,
            json: false,
            compact: false,
        }
    }
}

impl Config {
    pub fn from(provider: impl Provider) -> Result<Config> {
        Figment::from(provider)
            .extract()
            .map_err(|err| Error::Figment(Box::new(err)))
    }

    #[must_use]
    pub fn figment() -> Figment {
        Figment::from(Config::default())
            .admerge(Toml::file(".formgram.toml"))
            .admerge(Env::prefixed("FORMGRAM_"))
    }
}

impl Provider for Config {
    fn metadata(&self) -> Metadata {
        Metadata::named("formgram config")
    }

    fn data(&self) -> std::result::Result<Map<Profile, Dict>, figment::Error> {
        figment::providers::Serialized::defaults(Config::default()).data()
    }
}

/// Shared output flags, present on every subcommand that emits a tool-surface result.
#[derive(Args, Debug, Clone, Default)]
pub struct OutputArgs {
    /// Print the result as JSON instead of a human-readable summary.
    #[arg(long)]
    pub json: bool,

    /// Minify JSON output (only meaningful with `--json`).
    #[arg(long)]
    pub compact: bool,

    /// Write output to a file instead of stdout.
    #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
    pub out: Option<PathBuf>,
}

/// Read the configuration from the config file and environment variables, then apply
/// per-invocation CLI overrides.
pub fn read_config(output: &OutputArgs) -> Result<Config> {
    let mut config: Config = Config::figment()
        .extract()
        .map_err(|err| Error::Figment(Box::new(err)))?;
    if output.json {
        config.json = true;
    }
    if output.compact {
        config.compact = true;
    }
    Ok(config)
}

/// Write a default `.formgram.toml` to the current directory, matching the teacher's `init`
/// subcommand.
pub fn write_default_config() -> Result<PathBuf> {
    let path = PathBuf::from(".formgram.toml");
    let text = toml::to_string_pretty(&Config::default())
        .expect("Config serializes without custom (de)serialize impls");
    std::fs::write(&path, text).map_err(|err| Error::Io {
        path: path.clone(),
        err,
    })?;
    Ok(path)
}
