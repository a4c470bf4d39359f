//! Configuration loading and management.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use wl_client::SourcesConfig;

/// Application configuration.
///
/// Adapter sections (`[tempo]`, `[toggl]`, ...) sit at the top level of the
/// file. Secrets never appear in the `Debug` output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Deadline for each network call or command, in seconds.
    pub timeout_secs: u64,
    /// Longest entry summary shown in upload progress.
    pub progress_message_length: usize,
    #[serde(flatten)]
    pub sources: SourcesConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout_secs: wl_client::DEFAULT_TIMEOUT.as_secs(),
            progress_message_length: 50,
            sources: SourcesConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    ///
    /// Later layers win: defaults, `~/.config/wl/config.toml`, the given
    /// file, then `WL_*` environment variables (`WL_TEMPO__URL` sets
    /// `tempo.url`).
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed("WL_").split("__"));

        figment.extract()
    }

    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Returns the platform-specific config directory for wl.
///
/// On Linux: `~/.config/wl`
pub fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("wl"))
}
