//! Selecting and constructing sources and targets by name.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::adapters::clockify::{ClockifyClient, ClockifyConfig};
use crate::adapters::harvest::{HarvestClient, HarvestConfig};
use crate::adapters::tempo::{TempoClient, TempoConfig};
use crate::adapters::timewarrior::{TimewarriorClient, TimewarriorConfig};
use crate::adapters::toggl::{TogglClient, TogglConfig};
use crate::client::{Fetcher, Uploader};
use crate::error::ConfigError;

/// Systems entries can be fetched from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Clockify,
    Harvest,
    Tempo,
    Timewarrior,
    Toggl,
}

impl SourceKind {
    pub const ALL: [Self; 5] = [
        Self::Clockify,
        Self::Harvest,
        Self::Tempo,
        Self::Timewarrior,
        Self::Toggl,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Clockify => "clockify",
            Self::Harvest => "harvest",
            Self::Tempo => "tempo",
            Self::Timewarrior => "timewarrior",
            Self::Toggl => "toggl",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownSource {
                name: s.to_string(),
                expected: join(Self::ALL.iter().map(|kind| kind.as_str())),
            })
    }
}

/// Systems entries can be uploaded to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Tempo,
}

impl TargetKind {
    pub const ALL: [Self; 1] = [Self::Tempo];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tempo => "tempo",
        }
    }

    /// The source backed by the same system, if any.
    pub const fn as_source(self) -> SourceKind {
        match self {
            Self::Tempo => SourceKind::Tempo,
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownTarget {
                name: s.to_string(),
                expected: join(Self::ALL.iter().map(|kind| kind.as_str())),
            })
    }
}

fn join<'a>(names: impl Iterator<Item = &'a str>) -> String {
    names.collect::<Vec<_>>().join(", ")
}

/// Connection settings for every adapter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub clockify: ClockifyConfig,
    pub harvest: HarvestConfig,
    pub tempo: TempoConfig,
    pub timewarrior: TimewarriorConfig,
    pub toggl: TogglConfig,
}

/// Rejects syncing a system into itself.
pub fn ensure_distinct(source: SourceKind, target: TargetKind) -> Result<(), ConfigError> {
    if target.as_source() == source {
        return Err(ConfigError::SourceIsTarget);
    }
    Ok(())
}

/// Builds the fetcher for `kind`. Each network call times out after `timeout`.
pub fn build_fetcher(
    kind: SourceKind,
    config: &SourcesConfig,
    timeout: Duration,
) -> Result<Arc<dyn Fetcher>, ConfigError> {
    let fetcher: Arc<dyn Fetcher> = match kind {
        SourceKind::Clockify => Arc::new(ClockifyClient::new(&config.clockify, timeout)?),
        SourceKind::Harvest => Arc::new(HarvestClient::new(&config.harvest, timeout)?),
        SourceKind::Tempo => Arc::new(TempoClient::new(&config.tempo, timeout)?),
        SourceKind::Timewarrior => Arc::new(TimewarriorClient::new(&config.timewarrior, timeout)?),
        SourceKind::Toggl => Arc::new(TogglClient::new(&config.toggl, timeout)?),
    };
    Ok(fetcher)
}

/// Builds the uploader for `kind`.
pub fn build_uploader(
    kind: TargetKind,
    config: &SourcesConfig,
    timeout: Duration,
) -> Result<Arc<dyn Uploader>, ConfigError> {
    let uploader: Arc<dyn Uploader> = match kind {
        TargetKind::Tempo => Arc::new(TempoClient::new(&config.tempo, timeout)?),
    };
    Ok(uploader)
}
