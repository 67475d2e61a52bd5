//! Configuration for the talk-motion bridge

use crate::error::BridgeError;
use crate::ingestion::AudioFormat;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Environment prefix for configuration overrides (`TALK__DECODE_BUDGET_TICKS=600`)
pub const ENV_PREFIX: &str = "TALK";

/// Bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Verbose per-command and per-event logging
    pub enable_logging: bool,

    /// Ticks to wait for an async decode before giving up (300 = ~5s at 60Hz)
    pub decode_budget_ticks: u32,

    /// Ticks between the last-sentence event and `OnPlaybackCompleted`
    pub completion_delay_ticks: u32,

    /// Nominal host tick rate, used by the simulator loop and timeline clock
    pub tick_rate_hz: f64,

    /// Format assumed when a prepare payload omits `format`
    pub default_audio_format: String,

    /// Avatar instantiated at startup when the scene has none
    pub initial_avatar: Option<String>,

    /// Avatar catalog: ids the host may switch to
    pub avatars: Vec<AvatarAssetConfig>,
}

/// One catalog entry mapping an avatar id to a loadable asset
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AvatarAssetConfig {
    pub id: String,
    pub asset: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            enable_logging: true,
            decode_budget_ticks: 300,
            completion_delay_ticks: 2,
            tick_rate_hz: 60.0,
            default_audio_format: "wav".to_string(),
            initial_avatar: None,
            avatars: Vec::new(),
        }
    }
}

impl BridgeConfig {
    /// Load defaults, then an optional TOML file, then `TALK__*` environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, BridgeError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            if !path.exists() {
                return Err(BridgeError::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            builder = builder.add_source(config::File::from(path));
        }

        let built = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: BridgeConfig = built.try_deserialize()?;
        config.validate().map_err(BridgeError::Config)?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.decode_budget_ticks == 0 || self.decode_budget_ticks > 36_000 {
            return Err("Decode budget must be between 1 and 36000 ticks".to_string());
        }

        if self.completion_delay_ticks > 600 {
            return Err("Completion delay must be at most 600 ticks".to_string());
        }

        if !self.tick_rate_hz.is_finite() || !(1.0..=1000.0).contains(&self.tick_rate_hz) {
            return Err("Tick rate must be between 1 and 1000 Hz".to_string());
        }

        if AudioFormat::from_name(&self.default_audio_format) == AudioFormat::Unknown {
            return Err(format!(
                "Unknown default audio format: {}",
                self.default_audio_format
            ));
        }

        let mut seen = HashSet::new();
        for avatar in &self.avatars {
            if avatar.id.trim().is_empty() {
                return Err("Avatar ID cannot be empty".to_string());
            }
            if avatar.id.len() > 256 {
                return Err("Avatar ID too long (max 256 chars)".to_string());
            }
            if avatar.id.chars().any(|c| c.is_control()) {
                return Err("Avatar ID contains invalid characters".to_string());
            }
            if avatar.asset.trim().is_empty() {
                return Err(format!("Avatar '{}' has no asset", avatar.id));
            }
            if !seen.insert(avatar.id.as_str()) {
                return Err(format!("Duplicate avatar ID: {}", avatar.id));
            }
        }

        if let Some(ref initial) = self.initial_avatar {
            if !self.avatars.iter().any(|a| &a.id == initial) {
                return Err(format!("Initial avatar '{}' is not in the catalog", initial));
            }
        }

        Ok(())
    }

    /// Seconds covered by one tick at the nominal rate
    pub fn tick_seconds(&self) -> f64 {
        1.0 / self.tick_rate_hz
    }
}
