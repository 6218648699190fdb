use anyhow::{Context, Result};
use danfoss_eco_lib::{
    queue::{PushPolicy, DEFAULT_CAPACITY},
    xxtea::Key,
};
use serde::Deserialize;
use std::fs::File;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// The valve key as 32 hex digits.
    pub key: Option<String>,
    #[serde(default)]
    pub queue: QueueConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Without a timeout a full queue rejects new commands immediately.
    #[serde(default, with = "humantime_serde")]
    pub push_timeout: Option<Duration>,
}

fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            push_timeout: None,
        }
    }
}

impl QueueConfig {
    pub fn push_policy(&self) -> PushPolicy {
        self.push_timeout.map_or(PushPolicy::Reject, PushPolicy::Block)
    }
}

impl Config {
    pub const DEFAULT_CONFIG_FILE: &'static str = "ecoctl.yml";

    /// Loads the configuration. A missing default file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() && path == Path::new(Self::DEFAULT_CONFIG_FILE) {
            log::debug!("No config file at {path:?}, using defaults");
            return Ok(Self::default());
        }
        log::debug!("Loading config file from {path:?}");
        let file =
            File::open(path).with_context(|| format!("Cannot open config file {path:?}"))?;
        Self::from_reader(file).with_context(|| format!("Cannot parse config file {path:?}"))
    }

    fn from_reader(reader: impl std::io::Read) -> Result<Self> {
        Ok(serde_yaml::from_reader(reader)?)
    }

    pub fn key(&self) -> Result<Option<Key>> {
        self.key
            .as_deref()
            .map(|key| key.parse::<Key>().context("Invalid key in config file"))
            .transpose()
    }
}
