use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::player::PlayerSnapshot;
use crate::{Result, TallyError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub endpoint: String,
    pub timeout_secs: u64,
}

/// Identity of the tracked player. The guid, when present, takes priority
/// over the display name since names can collide or change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    pub name: String,
    pub guid: Option<String>,
}

impl PlayerConfig {
    pub fn matches(&self, snapshot: &PlayerSnapshot) -> bool {
        match &self.guid {
            Some(guid) => *guid == snapshot.guid,
            None => self.name == snapshot.name,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Baseline directory override. Defaults to a per-user data directory.
    pub root_dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    pub poll_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpsConfig {
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TallyConfig {
    pub source: SourceConfig,
    pub player: PlayerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    pub tracker: TrackerConfig,
    pub ops: OpsConfig,
}

impl TallyConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref).map_err(|err| {
            TallyError::Configuration(format!(
                "unable to read config file {}: {err}",
                path_ref.display()
            ))
        })?;
        toml::from_str(&contents).map_err(|err| {
            TallyError::Configuration(format!(
                "failed to parse config file {}: {err}",
                path_ref.display()
            ))
        })
    }

    pub fn validate(&self) -> Result<()> {
        if !self.source.endpoint.starts_with("http://") && !self.source.endpoint.starts_with("https://")
        {
            return Err(TallyError::Configuration(
                "source.endpoint must be an http(s) URL".into(),
            ));
        }
        if self.source.timeout_secs == 0 {
            return Err(TallyError::Configuration(
                "source.timeout_secs must be greater than zero".into(),
            ));
        }
        if self.player.name.trim().is_empty() {
            return Err(TallyError::Configuration(
                "player.name must not be empty".into(),
            ));
        }
        if self.tracker.poll_interval_secs == 0 {
            return Err(TallyError::Configuration(
                "tracker.poll_interval_secs must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
