use crate::state::ControllerState;

/// Wrapping sum of every field except `checksum` itself.
///
/// Only detects torn or corrupted writes. Swapped fields, or errors that
/// cancel out, go unnoticed.
pub fn checksum(state: &ControllerState) -> u32 {
    [
        state.position,
        state.target_position,
        state.max_position,
        state.max_movement,
        u16::from(state.step_mode) as u32,
        u16::from(state.step_mode_manual) as u32,
        u8::from(state.speed_mode) as u32,
        state.settle_buffer_ms,
        state.idle_eeprom_write_ms,
        state.reverse_direction as u32,
        state.motor_move_current_pct as u32,
        state.motor_hold_current_pct as u32,
    ]
    .into_iter()
    .fold(0u32, u32::wrapping_add)
}
