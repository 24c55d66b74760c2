//! Engine configuration

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::ConfigError;
use crate::framing::MAX_FRAME_SIZE;

pub const STRICT_MODE_ENV: &str = "LIGHTRPC_STRICT_MODE";
pub const DEBUG_IO_ENV: &str = "LIGHTRPC_DEBUG_IO";
pub const DEBUG_IO_IN_ENV: &str = "LIGHTRPC_DEBUG_IO_IN";

/// Settings shared by the client and server engines.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Reject named params that match no field instead of ignoring them.
    pub strict_mode: bool,
    /// Log every frame verbatim, both directions.
    pub debug_io: bool,
    /// Log inbound frames only.
    pub debug_io_inbound: bool,
    pub request_timeout_secs: u64,
    pub max_frame_size: usize,
    pub queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            strict_mode: false,
            debug_io: false,
            debug_io_inbound: false,
            request_timeout_secs: 20,
            max_frame_size: MAX_FRAME_SIZE,
            queue_capacity: 100,
        }
    }
}

/// Which way a frame is travelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Inbound => f.write_str("in"),
            Direction::Outbound => f.write_str("out"),
        }
    }
}

impl EngineConfig {
    /// Defaults, with the toggles switched on by the presence of their
    /// environment variables.
    pub fn from_env() -> Self {
        let set = |name: &str| std::env::var_os(name).is_some();
        Self {
            strict_mode: set(STRICT_MODE_ENV),
            debug_io: set(DEBUG_IO_ENV),
            debug_io_inbound: set(DEBUG_IO_IN_ENV),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "Request timeout must be greater than 0".to_string(),
            ));
        }

        if self.max_frame_size == 0 {
            return Err(ConfigError::Validation(
                "Max frame size must be greater than 0".to_string(),
            ));
        }

        if self.queue_capacity == 0 {
            return Err(ConfigError::Validation(
                "Queue capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Whether frames travelling in `direction` are logged verbatim.
    pub fn logs_wire(&self, direction: Direction) -> bool {
        self.debug_io || (direction == Direction::Inbound && self.debug_io_inbound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        std::env::remove_var(STRICT_MODE_ENV);
        std::env::remove_var(DEBUG_IO_ENV);
        std::env::remove_var(DEBUG_IO_IN_ENV);
    }

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert!(!config.strict_mode);
        assert_eq!(config.request_timeout(), Duration::from_secs(20));
        assert_eq!(config.max_frame_size, 500 * 1024 * 1023);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let config = EngineConfig {
            request_timeout_secs: 0,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());

        let config = EngineConfig {
            queue_capacity: 0,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());

        let config = EngineConfig {
            max_frame_size: 0,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_config_deserializes_with_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"strict_mode":true}"#).unwrap();
        assert!(config.strict_mode);
        assert_eq!(config.request_timeout_secs, 20);
    }

    #[test]
    fn test_wire_logging_directions() {
        let inbound_only = EngineConfig {
            debug_io_inbound: true,
            ..EngineConfig::default()
        };
        assert!(inbound_only.logs_wire(Direction::Inbound));
        assert!(!inbound_only.logs_wire(Direction::Outbound));

        let both = EngineConfig {
            debug_io: true,
            ..EngineConfig::default()
        };
        assert!(both.logs_wire(Direction::Inbound));
        assert!(both.logs_wire(Direction::Outbound));

        assert!(!EngineConfig::default().logs_wire(Direction::Inbound));
    }

    #[test]
    #[serial]
    fn test_from_env_toggles() {
        clear_env();
        std::env::set_var(STRICT_MODE_ENV, "");
        std::env::set_var(DEBUG_IO_IN_ENV, "1");

        let config = EngineConfig::from_env();
        assert!(config.strict_mode);
        assert!(!config.debug_io);
        assert!(config.debug_io_inbound);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        clear_env();
        let config = EngineConfig::from_env();
        assert_eq!(config, EngineConfig::default());
    }
}
