use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use clap::ValueEnum;
use serde::Deserialize;

use kl_core::{AssemblerConfig, BigramPolicy, DEFAULT_SEPARATOR};

pub const CONFIG_ENV: &str = "KL_CONFIG";

/// Contents of a TOML config file. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub separator: Option<String>,
    pub max_span_length: Option<usize>,
    pub bigram_policy: Option<BigramPolicy>,
    pub fallback_probability: Option<f64>,
}

/// Values given on the command line; they win over the file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub separator: Option<String>,
    pub max_span_length: Option<usize>,
    pub bigram_policy: Option<BigramPolicy>,
}

#[derive(Debug)]
pub struct Settings {
    pub separator: String,
    pub assembler: AssemblerConfig,
}

/// `--config` first, then `$KL_CONFIG`. A named file that is missing is an error.
pub fn config_path(flag: Option<&Path>) -> Option<PathBuf> {
    flag.map(Path::to_path_buf)
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
}

pub fn load_file(path: &Path) -> Result<FileConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    toml::from_str(&contents).map_err(|e| anyhow!("invalid config {}: {e}", path.display()))
}

pub fn resolve(file: FileConfig, overrides: Overrides) -> Settings {
    let defaults = AssemblerConfig::default();
    Settings {
        separator: overrides
            .separator
            .or(file.separator)
            .unwrap_or_else(|| DEFAULT_SEPARATOR.to_string()),
        assembler: AssemblerConfig {
            max_span_length: overrides
                .max_span_length
                .or(file.max_span_length)
                .unwrap_or(defaults.max_span_length),
            bigram_policy: overrides
                .bigram_policy
                .or(file.bigram_policy)
                .unwrap_or(defaults.bigram_policy),
            fallback_probability: file
                .fallback_probability
                .unwrap_or(defaults.fallback_probability),
        },
    }
}

pub fn load(flag: Option<&Path>, overrides: Overrides) -> Result<Settings> {
    let file = match config_path(flag) {
        Some(path) => {
            let file = load_file(&path)?;
            tracing::debug!(path = %path.display(), "loaded config");
            file
        }
        None => FileConfig::default(),
    };
    Ok(resolve(file, overrides))
}

/// `--bigram-policy` values. Mirrors [`BigramPolicy`] so `kl-core` stays
/// free of clap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum PolicyArg {
    /// A matching bigram's score replaces the unigram score
    Replace,
    /// Bigram and unigram scores are summed
    Additive,
    /// The larger of the two wins
    Max,
}

impl From<PolicyArg> for BigramPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Replace => BigramPolicy::Replace,
            PolicyArg::Additive => BigramPolicy::Additive,
            PolicyArg::Max => BigramPolicy::Max,
        }
    }
}
