//! Configuration loading
//!
//! Configuration is a TOML file; every field has a default so an empty file
//! is valid.

mod schema;

pub use schema::*;

use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{CallError, Result};
use crate::session::SessionConfig;

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "RTC_CALL_CONFIG";

impl CallConfig {
    /// Parse and validate a TOML document
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: CallConfig = toml::from_str(text)
            .map_err(|e| CallError::Config(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file
    pub async fn load(path: &Path) -> Result<Self> {
        debug!("Loading configuration from {}", path.display());
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            CallError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&text)
    }

    /// Load from `path`, then `$RTC_CALL_CONFIG`, else defaults
    pub async fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from));

        match path {
            Some(p) => Self::load(&p).await,
            None => Ok(Self::default()),
        }
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| CallError::Config(format!("Failed to encode configuration: {}", e)))
    }

    pub fn validate(&self) -> Result<()> {
        if self.rtc.candidate_queue_capacity == 0 {
            return Err(CallError::Config(
                "rtc.candidate_queue_capacity must be greater than zero".to_string(),
            ));
        }
        if self.signaling.channel_capacity == 0 {
            return Err(CallError::Config(
                "signaling.channel_capacity must be greater than zero".to_string(),
            ));
        }
        for turn in &self.rtc.turn_servers {
            if turn.urls.is_empty() {
                return Err(CallError::Config("TURN server without URLs".to_string()));
            }
            if turn.username.is_empty() || turn.credential.is_empty() {
                return Err(CallError::Config(format!(
                    "TURN server {} is missing credentials",
                    turn.urls[0]
                )));
            }
        }
        if !self.media.audio && !self.media.video {
            return Err(CallError::Config(
                "media must request audio, video or both".to_string(),
            ));
        }
        Ok(())
    }

    /// Session parameters for a new call
    pub fn session_config(&self) -> SessionConfig {
        let mut config = SessionConfig::new(self.session.role)
            .with_candidate_queue_capacity(self.rtc.candidate_queue_capacity)
            .with_close_on_failure(self.session.close_on_failure);
        if let Some(polite) = self.session.polite {
            config = config.with_polite(polite);
        }
        config
    }
}
