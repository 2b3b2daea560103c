//! Agent configuration.

use std::time::Duration;

use serde::Deserialize;

const DEFAULT_TELEMETRY_INTERVAL_SECS: u64 = 10;

/// Runtime configuration with environment variable overrides.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Seconds between volume telemetry publications.
    /// Override: `AUDIO_AGENT_TELEMETRY_INTERVAL`
    pub telemetry_interval_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            telemetry_interval_secs: DEFAULT_TELEMETRY_INTERVAL_SECS,
        }
    }
}

impl AgentConfig {
    /// Default configuration with environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(val) = std::env::var("AUDIO_AGENT_TELEMETRY_INTERVAL") {
            if let Ok(secs) = val.parse() {
                config.telemetry_interval_secs = secs;
            }
        }
        config
    }

    /// Interval between telemetry publications. Zero falls back to the
    /// default so the publish loop stays well formed.
    pub fn telemetry_interval(&self) -> Duration {
        let secs = if self.telemetry_interval_secs == 0 {
            DEFAULT_TELEMETRY_INTERVAL_SECS
        } else {
            self.telemetry_interval_secs
        };
        Duration::from_secs(secs)
    }
}
