use serde::{Deserialize, Serialize};

use crate::error::RejectedValue;

pub const MIN_MAX_POSITION: u32 = 10_000;
pub const MIN_MAX_MOVEMENT: u32 = 1_000;
pub const MIN_CURRENT_PCT: u8 = 1;
pub const MAX_CURRENT_PCT: u8 = 100;

/// Microstep division of a full motor step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum StepMode {
    Full,
    Half,
    Quarter,
    Eighth,
    Sixteenth,
    ThirtySecond,
    SixtyFourth,
    OneTwentyEighth,
    TwoFiftySixth,
}

impl StepMode {
    pub const ALL: [StepMode; 9] = [
        StepMode::Full,
        StepMode::Half,
        StepMode::Quarter,
        StepMode::Eighth,
        StepMode::Sixteenth,
        StepMode::ThirtySecond,
        StepMode::SixtyFourth,
        StepMode::OneTwentyEighth,
        StepMode::TwoFiftySixth,
    ];

    /// Divisor as stored and as typed on the console (1, 2, 4 ... 256).
    pub fn divisor(self) -> u16 {
        match self {
            StepMode::Full => 1,
            StepMode::Half => 2,
            StepMode::Quarter => 4,
            StepMode::Eighth => 8,
            StepMode::Sixteenth => 16,
            StepMode::ThirtySecond => 32,
            StepMode::SixtyFourth => 64,
            StepMode::OneTwentyEighth => 128,
            StepMode::TwoFiftySixth => 256,
        }
    }
}

impl TryFrom<u16> for StepMode {
    type Error = RejectedValue;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        StepMode::ALL
            .into_iter()
            .find(|mode| mode.divisor() == value)
            .ok_or(RejectedValue::StepMode(value))
    }
}

impl From<StepMode> for u16 {
    fn from(mode: StepMode) -> u16 {
        mode.divisor()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum SpeedMode {
    VerySlow = 1,
    Slow = 2,
    Medium = 3,
    Fast = 4,
    VeryFast = 5,
}

impl TryFrom<u8> for SpeedMode {
    type Error = RejectedValue;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(SpeedMode::VerySlow),
            2 => Ok(SpeedMode::Slow),
            3 => Ok(SpeedMode::Medium),
            4 => Ok(SpeedMode::Fast),
            5 => Ok(SpeedMode::VeryFast),
            _ => Err(RejectedValue::SpeedMode(value)),
        }
    }
}

impl From<SpeedMode> for u8 {
    fn from(mode: SpeedMode) -> u8 {
        mode as u8
    }
}

/// Everything the focuser remembers across power cycles.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerState {
    pub position: u32,
    pub target_position: u32,
    pub max_position: u32,
    pub max_movement: u32,
    pub step_mode: StepMode,
    pub step_mode_manual: StepMode,
    pub speed_mode: SpeedMode,
    pub settle_buffer_ms: u32,
    pub idle_eeprom_write_ms: u32,
    pub reverse_direction: bool,
    pub motor_move_current_pct: u8,
    pub motor_hold_current_pct: u8,
    #[serde(default)]
    pub checksum: u32,
}

impl Default for ControllerState {
    fn default() -> Self {
        Self {
            position: 0,
            target_position: 0,
            max_position: 1_000_000,
            max_movement: 5_000,
            step_mode: StepMode::OneTwentyEighth,
            step_mode_manual: StepMode::Quarter,
            speed_mode: SpeedMode::Medium,
            settle_buffer_ms: 0,
            idle_eeprom_write_ms: 180_000,
            reverse_direction: false,
            motor_move_current_pct: 75,
            motor_hold_current_pct: 10,
            checksum: 0,
        }
    }
}

impl ControllerState {
    /// Whether the range invariants hold. Enum fields are valid by type.
    pub fn is_consistent(&self) -> bool {
        self.max_position >= MIN_MAX_POSITION
            && self.max_movement >= MIN_MAX_MOVEMENT
            && self.position <= self.max_position
            && self.target_position <= self.max_position
            && (MIN_CURRENT_PCT..=MAX_CURRENT_PCT).contains(&self.motor_move_current_pct)
            && (MIN_CURRENT_PCT..=MAX_CURRENT_PCT).contains(&self.motor_hold_current_pct)
    }
}
