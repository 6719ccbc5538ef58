use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::error::{Error, Result};

fn default_checkpoint_dir() -> PathBuf {
    PathBuf::from("./data/sum")
}

fn default_retransmit_interval_ms() -> u64 {
    sum_core::DEFAULT_RETRANSMIT_INTERVAL.as_millis() as u64
}

fn default_bind_addr() -> String {
    "127.0.0.1:0".to_string()
}

/// Runtime configuration for the agent binary, sourced from environment
/// variables (or flags, for local use) rather than a config file: there is
/// nothing here a running agent needs to reload, only what it needs at
/// startup.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Status update manager demonstration agent")]
pub struct Config {
    /// Directory under which each task's checkpoint log is created.
    #[arg(long, env = "SUM_CHECKPOINT_DIR", default_value_os_t = default_checkpoint_dir())]
    pub checkpoint_dir: PathBuf,

    /// Interval, in milliseconds, between retransmissions of an
    /// unacknowledged update.
    #[arg(long, env = "SUM_RETRANSMIT_INTERVAL_MS", default_value_t = default_retransmit_interval_ms())]
    pub retransmit_interval_ms: u64,

    /// Local endpoint reported to the manager's `initialize`, for transports
    /// to advertise as the origin of outbound sends.
    #[arg(long, env = "SUM_BIND_ADDR", default_value_t = default_bind_addr())]
    pub bind_addr: String,
}

impl Config {
    /// Parses configuration and validates it up front, so a bad environment
    /// is reported before the manager starts rather than on first use.
    pub fn load() -> Result<Self> {
        let config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    pub fn retransmit_interval(&self) -> Duration {
        Duration::from_millis(self.retransmit_interval_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.retransmit_interval_ms == 0 {
            return Err(Error::Config(
                "SUM_RETRANSMIT_INTERVAL_MS must be greater than zero".to_string(),
            ));
        }
        if self.bind_addr.trim().is_empty() {
            return Err(Error::Config("SUM_BIND_ADDR must not be empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Config {
        Config {
            checkpoint_dir: default_checkpoint_dir(),
            retransmit_interval_ms: default_retransmit_interval_ms(),
            bind_addr: default_bind_addr(),
        }
    }

    #[test]
    fn defaults_validate() {
        assert!(base().validate().is_ok());
    }

    #[test]
    fn zero_retransmit_interval_is_rejected() {
        let mut config = base();
        config.retransmit_interval_ms = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn empty_bind_addr_is_rejected() {
        let mut config = base();
        config.bind_addr = "  ".to_string();
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
