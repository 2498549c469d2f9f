//! Position memory and settings storage for a focuser controller.

pub mod checksum;
pub mod clock;
pub mod command;
pub mod config;
pub mod diagnostics;
pub mod eeprom;
pub mod error;
pub mod layout;
pub mod state;
pub mod storage;

pub use clock::{Clock, MockClock, SystemClock};
pub use config::StorageConfig;
pub use eeprom::{Eeprom, RamEeprom};
pub use error::{RegionTooSmall, RejectedValue};
pub use state::{ControllerState, SpeedMode, StepMode};
pub use storage::StorageManager;
