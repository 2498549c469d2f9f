//! Byte layout of the persistent region.
//!
//! ```text
//! 0                       24          36          48
//! ┌───────────────────────┬───────────┬───────────┬─────
//! │ configuration block   │ slot 0    │ slot 1    │ ...  slot N-1
//! └───────────────────────┴───────────┴───────────┴─────
//! ```
//!
//! All integers are little-endian. A slot holds position, target position
//! and checksum, in that order.

use crate::error::RegionTooSmall;
use crate::state::{ControllerState, SpeedMode, StepMode};

pub const CONFIG_BLOCK_SIZE: usize = 24;
pub const SLOT_SIZE: usize = 12;
/// Offset of the checksum inside a slot.
pub const SLOT_CHECKSUM_OFFSET: usize = 8;

/// One configuration field inside the configuration block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldSpan {
    pub name: &'static str,
    pub offset: usize,
    pub len: usize,
}

impl FieldSpan {
    const fn new(name: &'static str, offset: usize, len: usize) -> Self {
        Self { name, offset, len }
    }

    pub fn range(&self) -> core::ops::Range<usize> {
        self.offset..self.offset + self.len
    }
}

pub const CONFIG_FIELDS: [FieldSpan; 10] = [
    FieldSpan::new("max_position", 0, 4),
    FieldSpan::new("max_movement", 4, 4),
    FieldSpan::new("step_mode", 8, 2),
    FieldSpan::new("step_mode_manual", 10, 2),
    FieldSpan::new("speed_mode", 12, 1),
    FieldSpan::new("settle_buffer_ms", 13, 4),
    FieldSpan::new("idle_eeprom_write_ms", 17, 4),
    FieldSpan::new("reverse_direction", 21, 1),
    FieldSpan::new("motor_move_current_pct", 22, 1),
    FieldSpan::new("motor_hold_current_pct", 23, 1),
];

pub fn encode_config(state: &ControllerState) -> [u8; CONFIG_BLOCK_SIZE] {
    let mut buf = [0u8; CONFIG_BLOCK_SIZE];
    buf[0..4].copy_from_slice(&state.max_position.to_le_bytes());
    buf[4..8].copy_from_slice(&state.max_movement.to_le_bytes());
    buf[8..10].copy_from_slice(&u16::from(state.step_mode).to_le_bytes());
    buf[10..12].copy_from_slice(&u16::from(state.step_mode_manual).to_le_bytes());
    buf[12] = state.speed_mode.into();
    buf[13..17].copy_from_slice(&state.settle_buffer_ms.to_le_bytes());
    buf[17..21].copy_from_slice(&state.idle_eeprom_write_ms.to_le_bytes());
    buf[21] = state.reverse_direction as u8;
    buf[22] = state.motor_move_current_pct;
    buf[23] = state.motor_hold_current_pct;
    buf
}

/// Decode a configuration block into a state with position and target at 0.
///
/// Returns `None` when the bytes cannot be a block this firmware wrote: an
/// unknown step or speed value, a bool other than 0/1, or a field outside
/// its range.
pub fn decode_config(buf: &[u8; CONFIG_BLOCK_SIZE]) -> Option<ControllerState> {
    let u32_at = |at: usize| u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);
    let u16_at = |at: usize| u16::from_le_bytes([buf[at], buf[at + 1]]);

    let reverse_direction = match buf[21] {
        0 => false,
        1 => true,
        _ => return None,
    };

    let state = ControllerState {
        position: 0,
        target_position: 0,
        max_position: u32_at(0),
        max_movement: u32_at(4),
        step_mode: StepMode::try_from(u16_at(8)).ok()?,
        step_mode_manual: StepMode::try_from(u16_at(10)).ok()?,
        speed_mode: SpeedMode::try_from(buf[12]).ok()?,
        settle_buffer_ms: u32_at(13),
        idle_eeprom_write_ms: u32_at(17),
        reverse_direction,
        motor_move_current_pct: buf[22],
        motor_hold_current_pct: buf[23],
        checksum: 0,
    };

    state.is_consistent().then_some(state)
}

/// One position log record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PositionSlot {
    pub position: u32,
    pub target_position: u32,
    pub checksum: u32,
}

impl PositionSlot {
    pub fn of(state: &ControllerState) -> Self {
        Self {
            position: state.position,
            target_position: state.target_position,
            checksum: state.checksum,
        }
    }

    pub fn to_bytes(self) -> [u8; SLOT_SIZE] {
        let mut buf = [0u8; SLOT_SIZE];
        buf[0..4].copy_from_slice(&self.position.to_le_bytes());
        buf[4..8].copy_from_slice(&self.target_position.to_le_bytes());
        buf[8..12].copy_from_slice(&self.checksum.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8; SLOT_SIZE]) -> Self {
        let u32_at = |at: usize| u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);
        Self {
            position: u32_at(0),
            target_position: u32_at(4),
            checksum: u32_at(8),
        }
    }
}

/// Slot geometry of a region of a given capacity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Layout {
    capacity: usize,
    slot_count: usize,
}

impl Layout {
    pub fn new(capacity: usize) -> Result<Self, RegionTooSmall> {
        let slot_count = capacity.saturating_sub(CONFIG_BLOCK_SIZE) / SLOT_SIZE;
        if slot_count == 0 {
            return Err(RegionTooSmall { capacity });
        }
        Ok(Self { capacity, slot_count })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    pub fn slot_address(&self, index: usize) -> usize {
        CONFIG_BLOCK_SIZE + index * SLOT_SIZE
    }

    /// Slot after `index`, back to the first one past the end of the region.
    pub fn next_slot(&self, index: usize) -> usize {
        if index + 1 >= self.slot_count {
            0
        } else {
            index + 1
        }
    }
}
