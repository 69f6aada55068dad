use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::ExitError;

/// Config file name, looked up at the workspace root.
pub const CONFIG_TOML: &str = ".chainwatch.toml";

/// Name of the global config file under the user config dir.
pub const GLOBAL_CONFIG: &str = "config.toml";

/// Environment variable holding the API credential.
pub const API_KEY_ENV: &str = "CHAINWATCH_API_KEY";

/// Top-level .chainwatch.toml config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

/// Tunables for the supervisory loop. Thresholds and the estimate
/// multiplier are empirically chosen defaults, not derived constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Seconds between status polls.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
    /// Seconds to wait for a worker to acknowledge a stop request.
    #[serde(default = "default_stop_wait")]
    pub stop_wait: u64,
    /// Seconds between status polls inside the stop-wait.
    #[serde(default = "default_stop_poll")]
    pub stop_poll: u64,
    /// Hard ceiling on worker replacements for one task.
    #[serde(default = "default_max_chain_depth")]
    pub max_chain_depth: u32,
    /// Nudges sent to a stalled worker before rotating it out.
    #[serde(default = "default_followup_attempts")]
    pub followup_attempts: u32,
    /// Estimated context units at which the worker gets a wrap-up warning.
    #[serde(default = "default_warn_threshold")]
    pub warn_threshold: u64,
    /// Estimated context units at which the worker is force-rotated.
    #[serde(default = "default_force_threshold")]
    pub force_threshold: u64,
    /// Assistant messages carried into the handoff summary.
    #[serde(default = "default_summary_messages")]
    pub summary_messages: usize,
    /// Per-message truncation length in the handoff summary.
    #[serde(default = "default_summary_truncate")]
    pub summary_truncate: usize,
    /// Task checklist file name, relative to the workspace.
    #[serde(default = "default_artifact")]
    pub artifact: String,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            stop_wait: default_stop_wait(),
            stop_poll: default_stop_poll(),
            max_chain_depth: default_max_chain_depth(),
            followup_attempts: default_followup_attempts(),
            warn_threshold: default_warn_threshold(),
            force_threshold: default_force_threshold(),
            summary_messages: default_summary_messages(),
            summary_truncate: default_summary_truncate(),
            artifact: default_artifact(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub key: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            key: None,
        }
    }
}

fn default_poll_interval() -> u64 {
    30
}

fn default_stop_wait() -> u64 {
    60
}

fn default_stop_poll() -> u64 {
    2
}

fn default_max_chain_depth() -> u32 {
    5
}

fn default_followup_attempts() -> u32 {
    3
}

fn default_warn_threshold() -> u64 {
    45_000
}

fn default_force_threshold() -> u64 {
    50_000
}

fn default_summary_messages() -> usize {
    5
}

fn default_summary_truncate() -> usize {
    500
}

fn default_artifact() -> String {
    "TASKS.md".to_string()
}

fn default_base_url() -> String {
    "https://api.chainwatch.dev".to_string()
}

impl Config {
    /// Load config for a workspace, falling back to defaults when no
    /// `.chainwatch.toml` exists there.
    pub fn load_for_workspace(workspace: &Path) -> anyhow::Result<Self> {
        let path = workspace.join(CONFIG_TOML);
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load and validate config from an explicit path.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Self = toml::from_str(&raw)
            .map_err(|e| ExitError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.watch.warn_threshold >= self.watch.force_threshold {
            return Err(ExitError::Config(format!(
                "warn_threshold ({}) must be below force_threshold ({})",
                self.watch.warn_threshold, self.watch.force_threshold
            ))
            .into());
        }
        if self.watch.max_chain_depth == 0 {
            return Err(ExitError::Config("max_chain_depth must be at least 1".to_string()).into());
        }
        Ok(())
    }

    /// Resolve the API credential: env var, then this config, then the
    /// global config. First match wins.
    pub fn resolve_api_key(&self) -> anyhow::Result<String> {
        if let Ok(key) = std::env::var(API_KEY_ENV)
            && !key.is_empty()
        {
            return Ok(key);
        }
        if let Some(ref key) = self.api.key
            && !key.is_empty()
        {
            return Ok(key.clone());
        }
        if let Some(global) = global_config_path()
            && global.exists()
            && let Ok(config) = Self::load(&global)
            && let Some(key) = config.api.key
            && !key.is_empty()
        {
            return Ok(key);
        }
        Err(ExitError::MissingCredential.into())
    }
}

/// Path of the global config file (`~/.config/chainwatch/config.toml`).
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("chainwatch").join(GLOBAL_CONFIG))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_ordered() {
        let config = Config::default();
        assert!(config.watch.warn_threshold < config.watch.force_threshold);
        assert_eq!(config.watch.poll_interval, 30);
        assert_eq!(config.watch.followup_attempts, 3);
        assert_eq!(config.watch.max_chain_depth, 5);
    }

    #[test]
    fn load_partial_toml_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_TOML);
        std::fs::write(&path, "[watch]\npoll_interval = 5\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.watch.poll_interval, 5);
        assert_eq!(config.watch.force_threshold, 50_000);
        assert_eq!(config.watch.artifact, "TASKS.md");
    }

    #[test]
    fn rejects_inverted_thresholds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_TOML);
        std::fs::write(
            &path,
            "[watch]\nwarn_threshold = 60000\nforce_threshold = 50000\n",
        )
        .unwrap();

        let err = Config::load(&path).unwrap_err();
        let exit_err = err.downcast_ref::<ExitError>().unwrap();
        assert!(matches!(exit_err, ExitError::Config(_)));
    }

    #[test]
    fn missing_workspace_config_is_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_for_workspace(dir.path()).unwrap();
        assert_eq!(config.watch.warn_threshold, 45_000);
    }

    #[test]
    fn api_key_from_workspace_config() {
        // Not exercising the env-var path here: other tests run in the
        // same process and env mutation would race them.
        let config = Config {
            api: ApiConfig {
                base_url: default_base_url(),
                key: Some("cw-test-key".to_string()),
            },
            ..Config::default()
        };
        assert_eq!(config.resolve_api_key().unwrap(), "cw-test-key");
    }
}
