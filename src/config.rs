use std::time::Duration;

use camino::Utf8Path;
use config::{Config, ConfigError};
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Bridge base url. When missing, the bridge is located by discovery.
    pub url: Option<Url>,
    /// Application key created by `create-user`.
    #[serde(default)]
    pub username: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExporterConfig {
    pub listen_address: String,
    pub listen_port: u16,
    pub poll_interval_ms: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    pub bridge: BridgeConfig,
    pub exporter: ExporterConfig,
}

impl ExporterConfig {
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

pub fn parse(filename: &Utf8Path) -> Result<AppConfig, ConfigError> {
    let settings = Config::builder()
        .set_default("bridge.timeout_secs", 10)?
        .set_default("exporter.listen_address", "0.0.0.0")?
        .set_default("exporter.listen_port", 7362)?
        .set_default("exporter.poll_interval_ms", 1000)?
        .add_source(config::File::with_name(filename.as_str()).required(false))
        .build()?;

    settings.try_deserialize()
}
