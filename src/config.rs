use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::governor::RatePolicy;

/// Configuration file structure.
///
/// Every value is optional; command-line flags and environment variables
/// take precedence over anything set here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub gitlab: GitLabConfig,

    #[serde(default)]
    pub github: GitHubConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GitLabConfig {
    /// GitLab personal access token
    pub token: Option<String>,

    /// GitLab instance base URL
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GitHubConfig {
    /// GitHub personal access token
    pub token: Option<String>,

    /// GitHub API base URL
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RateLimitConfig {
    #[serde(default = "default_base_interval_ms")]
    pub base_interval_ms: u64,

    #[serde(default = "default_cautious_remaining")]
    pub cautious_remaining: u64,

    #[serde(default = "default_cautious_interval_ms")]
    pub cautious_interval_ms: u64,

    #[serde(default = "default_critical_remaining")]
    pub critical_remaining: u64,

    #[serde(default = "default_critical_interval_ms")]
    pub critical_interval_ms: u64,

    /// Wait after a 429 that carries no `Retry-After`
    #[serde(default = "default_retry_after_secs")]
    pub default_retry_after_secs: u64,

    #[serde(default = "default_max_throttle_retries")]
    pub max_throttle_retries: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Directory for generated refs files when no explicit output is given
    pub directory: Option<PathBuf>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            base_interval_ms: default_base_interval_ms(),
            cautious_remaining: default_cautious_remaining(),
            cautious_interval_ms: default_cautious_interval_ms(),
            critical_remaining: default_critical_remaining(),
            critical_interval_ms: default_critical_interval_ms(),
            default_retry_after_secs: default_retry_after_secs(),
            max_throttle_retries: default_max_throttle_retries(),
        }
    }
}

fn default_base_interval_ms() -> u64 {
    100
}

fn default_cautious_remaining() -> u64 {
    10
}

fn default_cautious_interval_ms() -> u64 {
    1_000
}

fn default_critical_remaining() -> u64 {
    5
}

fn default_critical_interval_ms() -> u64 {
    5_000
}

fn default_retry_after_secs() -> u64 {
    60
}

fn default_max_throttle_retries() -> u32 {
    5
}

impl RateLimitConfig {
    pub fn policy(&self) -> Result<RatePolicy> {
        if self.critical_remaining > self.cautious_remaining {
            anyhow::bail!(
                "rate-limit.critical-remaining ({}) must not exceed rate-limit.cautious-remaining ({})",
                self.critical_remaining,
                self.cautious_remaining
            );
        }

        Ok(RatePolicy {
            base_interval: Duration::from_millis(self.base_interval_ms),
            cautious_remaining: self.cautious_remaining,
            cautious_interval: Duration::from_millis(self.cautious_interval_ms),
            critical_remaining: self.critical_remaining,
            critical_interval: Duration::from_millis(self.critical_interval_ms),
            default_retry_after: Duration::from_secs(self.default_retry_after_secs),
            max_throttle_retries: self.max_throttle_retries,
        })
    }
}

impl Config {
    /// Load configuration from a file.
    ///
    /// Searches for configuration files in this order:
    /// 1. Specified path (must exist)
    /// 2. ./gl-create-refs.toml
    /// 3. ./gl-create-refs.json
    /// 4. ./gl-create-refs.yaml
    /// 5. ./gl-create-refs.yml
    ///
    /// Returns default configuration if no file is found.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from_path(path);
        }

        let candidates = [
            "gl-create-refs.toml",
            "gl-create-refs.json",
            "gl-create-refs.yaml",
            "gl-create-refs.yml",
        ];

        for candidate in &candidates {
            let path = Path::new(candidate);
            if path.exists() {
                return Self::load_from_path(path);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file path.
    fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        match extension {
            "toml" => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display())),
            "json" => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display())),
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display())),
            _ => {
                // Try TOML first, then JSON, then YAML
                toml::from_str(&contents)
                    .or_else(|_| serde_json::from_str(&contents))
                    .or_else(|_| serde_yaml::from_str(&contents))
                    .with_context(|| format!("Failed to parse config file: {}", path.display()))
            }
        }
    }
}
