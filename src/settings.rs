use config::{Config, ConfigError, File};
use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
pub struct Server {
    pub listen: String,
}

/// Money policy, injected so it can vary per environment and per test.
#[derive(Clone, Debug, Deserialize)]
pub struct Policy {
    pub minimum_withdrawal_cents: i64,
    pub tax_percentage: u32,
    pub referral_bonus_cents: i64,
    /// Offset of the server's calendar day from UTC, in minutes. Daily task
    /// quotas reset at local midnight, not on a rolling 24h window.
    pub utc_offset_minutes: i32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Settings {
    pub server: Server,
    pub policy: Policy,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load("config.toml")
    }

    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .build()?;

        config.try_deserialize()
    }
}
