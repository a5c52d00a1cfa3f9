//! Application configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use trellis_session::DEFAULT_TTL_MINUTES;

use crate::error::CoreError;
use crate::Result;

pub const ENV_SESSION_DIR: &str = "TRELLIS_SESSION_DIR";
pub const ENV_SESSION_TTL: &str = "TRELLIS_SESSION_TTL";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the session database
    pub session_dir: PathBuf,
    /// Session lifetime in minutes
    #[serde(default = "default_ttl")]
    pub session_ttl_minutes: u32,
}

fn default_ttl() -> u32 {
    DEFAULT_TTL_MINUTES
}

impl Config {
    pub fn new(session_dir: PathBuf) -> Self {
        Self {
            session_dir,
            session_ttl_minutes: DEFAULT_TTL_MINUTES,
        }
    }

    /// Directory of the running executable, falling back to the working directory
    pub fn install_dir() -> PathBuf {
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Defaults overridden by `TRELLIS_SESSION_DIR` / `TRELLIS_SESSION_TTL`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(dir) = lookup(ENV_SESSION_DIR).filter(|d| !d.trim().is_empty()) {
            config.session_dir = PathBuf::from(dir);
        }

        if let Some(ttl) = lookup(ENV_SESSION_TTL) {
            config.session_ttl_minutes = ttl.trim().parse().map_err(|_| {
                CoreError::Config(format!(
                    "{} must be a whole number of minutes, got '{}'",
                    ENV_SESSION_TTL, ttl
                ))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.session_ttl_minutes == 0 {
            return Err(CoreError::Config(
                "session TTL must be at least one minute".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(Self::install_dir().join("sessions"))
    }
}
