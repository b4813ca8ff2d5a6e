use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::Result;

/// Credentials and naming for one web boiler account.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub prefix: Option<String>,
}

impl AccountConfig {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            prefix: None,
        }
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Prefix prepended to entity names: trailing whitespace trimmed, one
    /// separating space added when non-empty.
    pub fn display_prefix(&self) -> String {
        let trimmed = self.prefix.as_deref().unwrap_or("").trim_end();
        if trimmed.is_empty() {
            String::new()
        } else {
            format!("{trimmed} ")
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    #[serde(deserialize_with = "seconds")]
    pub login_retry_interval: Duration,
    #[serde(deserialize_with = "seconds")]
    pub refresh_interval: Duration,
    #[serde(deserialize_with = "seconds")]
    pub tick_period: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            login_retry_interval: Duration::from_secs(60),
            refresh_interval: Duration::from_secs(600),
            tick_period: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    #[serde(deserialize_with = "seconds")]
    pub check_period: Duration,
    #[serde(deserialize_with = "seconds")]
    pub stale_after: Duration,
    #[serde(deserialize_with = "seconds")]
    pub reload_cooldown: Duration,
}

impl WatchdogConfig {
    /// How long the watchdog tolerates never having seen a parameter timestamp.
    pub fn no_timestamp_grace(&self) -> Duration {
        self.check_period * 2
    }
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            check_period: Duration::from_secs(2 * 60),
            stale_after: Duration::from_secs(10 * 60),
            reload_cooldown: Duration::from_secs(15 * 60),
        }
    }
}

/// Tunables for one account entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub session: SessionConfig,
    pub watchdog: WatchdogConfig,
}

impl Settings {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

fn seconds<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_secs)
}
