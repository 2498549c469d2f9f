use std::fmt;

use serde::Serialize;

use crate::state::ControllerState;

/// Snapshot of the storage manager for the debug dump.
#[derive(Clone, Debug, Serialize)]
pub struct Diagnostics {
    pub cursor_address: usize,
    pub cursor_slot: usize,
    pub slot_count: usize,
    pub field_writes_since_boot: u32,
    pub bytes_written_since_boot: u32,
    pub dirty: bool,
    pub position_change_pending: bool,
    pub state: ControllerState,
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = &self.state;
        writeln!(f, "current sliding address: {} (slot {})", self.cursor_address, self.cursor_slot)?;
        writeln!(f, "sliding slots count: {}", self.slot_count)?;
        writeln!(f, "property writes since boot: {}", self.field_writes_since_boot)?;
        writeln!(f, "bytes written since boot: {}", self.bytes_written_since_boot)?;
        writeln!(f, "dirty: {}", self.dirty)?;
        writeln!(f, "position change pending: {}", self.position_change_pending)?;
        writeln!(f, "maxPosition: {}", s.max_position)?;
        writeln!(f, "maxMovement: {}", s.max_movement)?;
        writeln!(f, "stepMode: {}", u16::from(s.step_mode))?;
        writeln!(f, "stepModeManual: {}", u16::from(s.step_mode_manual))?;
        writeln!(f, "speedMode: {}", u8::from(s.speed_mode))?;
        writeln!(f, "settleBufferMs: {}", s.settle_buffer_ms)?;
        writeln!(f, "idleEepromWriteMs: {}", s.idle_eeprom_write_ms)?;
        writeln!(f, "reverseDirection: {}", s.reverse_direction)?;
        writeln!(f, "motorMoveCurrentPct: {}", s.motor_move_current_pct)?;
        writeln!(f, "motorHoldCurrentPct: {}", s.motor_hold_current_pct)?;
        writeln!(f, "position: {}", s.position)?;
        writeln!(f, "targetPosition: {}", s.target_position)?;
        write!(f, "checksum: {}", s.checksum)
    }
}
