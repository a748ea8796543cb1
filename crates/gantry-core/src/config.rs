use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use snafu::{ResultExt, Snafu};
use tokio::fs;

#[derive(Snafu, Debug)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    #[snafu(display("failed to read config file {}: {source}", path.display()))]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to parse config file: {source}"))]
    Parse { source: toml::de::Error },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

const DEFAULT_PATH: &str = "gantry.toml";

/// Settings for the fleet mock and the state cache. Every field has a
/// default, so running without a config file is fine.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub http: HttpConfig,
    pub state: StateConfig,
    pub fleet: FleetConfig,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { port: 8000 }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    pub poll_interval_ms: u64,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    pub update_interval_ms: u64,
    pub robots: Vec<String>,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            update_interval_ms: 250,
            robots: vec![
                "freight1".to_string(),
                "freight2".to_string(),
                "freight3".to_string(),
            ],
        }
    }
}

impl Config {
    /// Load from `path`, falling back to `gantry.toml` in the working
    /// directory, falling back to defaults when no file exists.
    pub async fn load(path: Option<PathBuf>) -> ConfigResult<Self> {
        let path = path.unwrap_or_else(|| PathBuf::from(DEFAULT_PATH));
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(&path)
            .await
            .context(ReadSnafu { path: path.clone() })?;
        toml::from_str(&text).context(ParseSnafu)
    }

    pub fn base_url(&self) -> String {
        format!("http://localhost:{}", self.http.port)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.state.poll_interval_ms)
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.fleet.update_interval_ms)
    }
}
