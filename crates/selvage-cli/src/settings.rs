//! Operator configuration.
//!
//! Layered from a TOML file plus `SELVAGE_`-prefixed environment variables
//! and re-read on every invocation, so weight or exclusion tuning takes
//! effect on the next run without a rebuild.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::Deserialize;

use selvage_core::config::{ScoringWeights, SegmentTable, SelectorConfig, SyncTuning};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
  /// Path of the SQLite store file.
  pub store_path:   PathBuf,
  /// Base URL of the remote commerce API.
  pub api_base_url: String,
  pub api_token:    String,
  pub sync:         SyncTuning,
  pub weights:      ScoringWeights,
  pub selector:     SelectorConfig,
  pub segments:     SegmentTable,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      store_path:   PathBuf::from("selvage.db"),
      api_base_url: String::new(),
      api_token:    String::new(),
      sync:         SyncTuning::default(),
      weights:      ScoringWeights::default(),
      selector:     SelectorConfig::default(),
      segments:     SegmentTable::default(),
    }
  }
}

impl Settings {
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path.to_owned()).required(false))
      .add_source(config::Environment::with_prefix("SELVAGE").separator("__"))
      .build()
      .context("failed to read configuration")?;
    settings
      .try_deserialize()
      .context("failed to deserialise settings")
  }
}
