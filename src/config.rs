use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::layout::Layout;
use crate::state::ControllerState;

/// EEPROM size of the ATmega328P the focuser board was built around.
pub const DEFAULT_CAPACITY: usize = 1024;

/// How often `tick` looks at the dirty flag.
pub const DEFAULT_CHECK_PERIOD_MS: u32 = 1000;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Bytes in the persistent region, used to size the backing store.
    pub capacity: usize,
    pub check_period_ms: u32,
    /// State written on first boot and on reset-to-defaults.
    pub defaults: ControllerState,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            check_period_ms: DEFAULT_CHECK_PERIOD_MS,
            defaults: ControllerState::default(),
        }
    }
}

impl StorageConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).context("Failed to parse storage config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        Layout::new(self.capacity)?;
        if !self.defaults.is_consistent() {
            anyhow::bail!("Default state violates its own limits: {:?}", self.defaults);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StepMode;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = StorageConfig::from_json(r#"{ "check_period_ms": 250 }"#).unwrap();
        assert_eq!(config.check_period_ms, 250);
        assert_eq!(config.capacity, DEFAULT_CAPACITY);
        assert_eq!(config.defaults, ControllerState::default());
    }

    #[test]
    fn test_json_overrides_defaults() {
        let json = r#"{
            "capacity": 512,
            "defaults": {
                "position": 0, "target_position": 0,
                "max_position": 20000, "max_movement": 2000,
                "step_mode": 16, "step_mode_manual": 16, "speed_mode": 2,
                "settle_buffer_ms": 100, "idle_eeprom_write_ms": 60000,
                "reverse_direction": true,
                "motor_move_current_pct": 50, "motor_hold_current_pct": 5
            }
        }"#;
        let config = StorageConfig::from_json(json).unwrap();
        assert_eq!(config.capacity, 512);
        assert_eq!(config.defaults.step_mode, StepMode::Sixteenth);
        assert!(config.defaults.reverse_direction);
    }

    #[test]
    fn test_rejects_tiny_region() {
        assert!(StorageConfig::from_json(r#"{ "capacity": 30 }"#).is_err());
    }

    #[test]
    fn test_rejects_inconsistent_defaults() {
        let config = StorageConfig {
            defaults: ControllerState {
                max_position: 500,
                ..ControllerState::default()
            },
            ..StorageConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
