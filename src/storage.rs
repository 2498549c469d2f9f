//! Persistent focuser state on a small EEPROM.
//!
//! Configuration fields are written in place and only when their bytes
//! change. Position and target position change on every move, so they rotate
//! through a log of slots. Exactly one slot carries a valid checksum at any
//! time, which is how `load` finds the live one after a power cut.

use crate::checksum::checksum;
use crate::clock::Clock;
use crate::config::StorageConfig;
use crate::diagnostics::Diagnostics;
use crate::eeprom::Eeprom;
use crate::error::{RegionTooSmall, RejectedValue};
use crate::layout::{
    decode_config, encode_config, Layout, PositionSlot, CONFIG_BLOCK_SIZE, CONFIG_FIELDS,
    SLOT_CHECKSUM_OFFSET, SLOT_SIZE,
};
use crate::state::{
    ControllerState, SpeedMode, StepMode, MAX_CURRENT_PCT, MIN_CURRENT_PCT, MIN_MAX_MOVEMENT,
    MIN_MAX_POSITION,
};

pub struct StorageManager<E: Eeprom, C: Clock> {
    eeprom: E,
    clock: C,
    layout: Layout,
    check_period_ms: u32,
    defaults: ControllerState,

    state: ControllerState,
    cursor: usize,
    dirty: bool,
    last_position_change_ms: Option<u32>,
    last_check_ms: u32,
    field_writes: u32,
    bytes_written: u32,
}

impl<E: Eeprom, C: Clock> StorageManager<E, C> {
    /// Wrap a storage region. Nothing is read until `init`.
    pub fn new(eeprom: E, clock: C, config: &StorageConfig) -> Result<Self, RegionTooSmall> {
        let layout = Layout::new(eeprom.capacity())?;
        let now = clock.now_ms();
        Ok(Self {
            eeprom,
            clock,
            layout,
            check_period_ms: config.check_period_ms,
            defaults: config.defaults.clone(),
            state: config.defaults.clone(),
            cursor: 0,
            dirty: false,
            last_position_change_ms: None,
            last_check_ms: now,
            field_writes: 0,
            bytes_written: 0,
        })
    }

    pub fn init(&mut self) {
        self.load();
        self.last_check_ms = self.clock.now_ms();
    }

    /// Restore state from storage, falling back to defaults when no slot
    /// validates.
    pub fn load(&mut self) {
        let mut buf = [0u8; CONFIG_BLOCK_SIZE];
        self.eeprom.read_block(0, &mut buf);

        let restored = decode_config(&buf).and_then(|config| self.find_active_slot(&config));
        match restored {
            Some((index, state)) => {
                log::info!(
                    "Restored state from slot {}: position={}, target={}",
                    index,
                    state.position,
                    state.target_position
                );
                self.state = state;
                self.cursor = index;
                self.dirty = false;
                self.last_position_change_ms = None;
            }
            None => {
                log::warn!("No valid position slot found, storage is blank or corrupt. Writing defaults");
                self.reset_to_defaults();
            }
        }
    }

    /// First slot, in address order, whose checksum matches. There is never
    /// more than one, see `commit`.
    fn find_active_slot(&mut self, config: &ControllerState) -> Option<(usize, ControllerState)> {
        for index in 0..self.layout.slot_count() {
            let slot = self.read_slot(index);
            let candidate = ControllerState {
                position: slot.position,
                target_position: slot.target_position,
                checksum: slot.checksum,
                ..config.clone()
            };
            if slot.checksum != checksum(&candidate) {
                continue;
            }
            if !candidate.is_consistent() {
                log::warn!("Slot {} checksums but is out of range", index);
                return None;
            }
            return Some((index, candidate));
        }
        None
    }

    /// Checksum value that makes the slot at `index` fail validation against
    /// the current configuration. Normally 0, unless 0 is exactly what the
    /// slot's contents sum to.
    fn invalid_checksum_for(&mut self, index: usize) -> u32 {
        let slot = self.read_slot(index);
        let stale = ControllerState {
            position: slot.position,
            target_position: slot.target_position,
            ..self.state.clone()
        };
        if checksum(&stale) == 0 {
            1
        } else {
            0
        }
    }

    /// Write the in-memory state back to storage.
    ///
    /// `force_full_write` restarts the position log at slot 0. Otherwise the
    /// active slot is left alone when it already matches, or invalidated and
    /// replaced by the next one.
    pub fn commit(&mut self, force_full_write: bool) {
        self.last_check_ms = self.clock.now_ms();
        self.dirty = false;
        self.last_position_change_ms = None;
        self.state.checksum = checksum(&self.state);

        let writes_before = self.bytes_written;

        let config = encode_config(&self.state);
        for field in CONFIG_FIELDS {
            if self.write_if_changed(field.offset, &config[field.range()]) {
                log::trace!("Wrote {}", field.name);
            }
        }

        let slot = PositionSlot::of(&self.state);
        if force_full_write {
            self.cursor = 0;
        } else {
            if self.read_slot(self.cursor) == slot {
                log::debug!(
                    "Commit: slot {} up to date, {} config bytes written",
                    self.cursor,
                    self.bytes_written - writes_before
                );
                return;
            }

            let old_checksum = self.layout.slot_address(self.cursor) + SLOT_CHECKSUM_OFFSET;
            let invalid = self.invalid_checksum_for(self.cursor);
            self.write_if_changed(old_checksum, &invalid.to_le_bytes());
            self.cursor = self.layout.next_slot(self.cursor);
        }

        let address = self.layout.slot_address(self.cursor);
        self.write(address, &slot.to_bytes(), 3);

        log::debug!(
            "Commit: position={} target={} in slot {}, {} bytes written",
            slot.position,
            slot.target_position,
            self.cursor,
            self.bytes_written - writes_before
        );
    }

    /// Debounce check, meant to run on every pass of the control loop.
    pub fn tick(&mut self) {
        let now = self.clock.now_ms();

        if now.wrapping_sub(self.last_check_ms) > self.check_period_ms {
            if self.dirty {
                self.commit(false);
            }
            self.last_check_ms = self.clock.now_ms();
        } else if let Some(changed_at) = self.last_position_change_ms {
            if now.wrapping_sub(changed_at) > self.state.idle_eeprom_write_ms {
                self.commit(false);
            }
        }
    }

    pub fn reset_to_defaults(&mut self) {
        log::info!("Resetting storage to defaults");
        self.state = self.defaults.clone();
        self.commit(true);
    }

    fn read_slot(&mut self, index: usize) -> PositionSlot {
        let mut buf = [0u8; SLOT_SIZE];
        self.eeprom.read_block(self.layout.slot_address(index), &mut buf);
        PositionSlot::from_bytes(&buf)
    }

    /// Write `data` holding `properties` stored fields.
    fn write(&mut self, address: usize, data: &[u8], properties: u32) {
        self.eeprom.write_block(address, data);
        self.field_writes += properties;
        self.bytes_written += data.len() as u32;
    }

    fn write_if_changed(&mut self, address: usize, data: &[u8]) -> bool {
        let mut stored = [0u8; 4];
        let stored = &mut stored[..data.len()];
        self.eeprom.read_block(address, stored);
        if stored == data {
            return false;
        }
        self.write(address, data, 1);
        true
    }

    fn mark_position_changed(&mut self) {
        self.last_position_change_ms = Some(self.clock.now_ms());
    }

    pub fn diagnostics(&self) -> Diagnostics {
        Diagnostics {
            cursor_address: self.layout.slot_address(self.cursor),
            cursor_slot: self.cursor,
            slot_count: self.layout.slot_count(),
            field_writes_since_boot: self.field_writes,
            bytes_written_since_boot: self.bytes_written,
            dirty: self.dirty,
            position_change_pending: self.last_position_change_ms.is_some(),
            state: self.state.clone(),
        }
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_position_change_pending(&self) -> bool {
        self.last_position_change_ms.is_some()
    }

    pub fn bytes_written(&self) -> u32 {
        self.bytes_written
    }

    pub fn field_writes(&self) -> u32 {
        self.field_writes
    }

    /// Give back the storage driver and clock, e.g. to boot a fresh manager
    /// on the same region.
    pub fn into_parts(self) -> (E, C) {
        (self.eeprom, self.clock)
    }

    pub fn get_position(&self) -> u32 {
        self.state.position
    }

    /// Record where the motor is now. Persisted by the idle trigger.
    pub fn set_position(&mut self, value: u32) {
        self.state.position = value.min(self.state.max_position);
        self.mark_position_changed();
    }

    /// Declare the current position and target, e.g. after homing.
    pub fn sync_position(&mut self, value: u32) {
        let value = value.min(self.state.max_position);
        self.state.position = value;
        self.state.target_position = value;
        self.dirty = true;
    }

    pub fn get_target_position(&self) -> u32 {
        self.state.target_position
    }

    pub fn set_target_position(&mut self, value: u32) -> Result<(), RejectedValue> {
        if value.abs_diff(self.state.position) > self.state.max_movement {
            return Err(RejectedValue::TargetOutOfReach {
                requested: value,
                position: self.state.position,
                max_movement: self.state.max_movement,
            });
        }

        self.state.target_position = value.min(self.state.max_position);
        self.mark_position_changed();
        Ok(())
    }

    pub fn get_max_position(&self) -> u32 {
        self.state.max_position
    }

    pub fn set_max_position(&mut self, value: u32) {
        let value = value.max(MIN_MAX_POSITION);
        self.state.position = self.state.position.min(value);
        self.state.target_position = self.state.target_position.min(value);
        self.state.max_position = value;
        self.dirty = true;
    }

    pub fn get_max_movement(&self) -> u32 {
        self.state.max_movement
    }

    pub fn set_max_movement(&mut self, value: u32) {
        self.state.max_movement = value.max(MIN_MAX_MOVEMENT);
        self.dirty = true;
    }

    pub fn get_step_mode(&self) -> StepMode {
        self.state.step_mode
    }

    pub fn set_step_mode(&mut self, value: u16) -> Result<(), RejectedValue> {
        self.state.step_mode = StepMode::try_from(value)?;
        self.dirty = true;
        Ok(())
    }

    pub fn get_step_mode_manual(&self) -> StepMode {
        self.state.step_mode_manual
    }

    pub fn set_step_mode_manual(&mut self, value: u16) -> Result<(), RejectedValue> {
        self.state.step_mode_manual = StepMode::try_from(value)?;
        self.dirty = true;
        Ok(())
    }

    pub fn get_speed_mode(&self) -> SpeedMode {
        self.state.speed_mode
    }

    pub fn set_speed_mode(&mut self, value: u8) -> Result<(), RejectedValue> {
        self.state.speed_mode = SpeedMode::try_from(value)?;
        self.dirty = true;
        Ok(())
    }

    pub fn get_settle_buffer_ms(&self) -> u32 {
        self.state.settle_buffer_ms
    }

    pub fn set_settle_buffer_ms(&mut self, value: u32) {
        self.state.settle_buffer_ms = value;
        self.dirty = true;
    }

    pub fn get_idle_eeprom_write_ms(&self) -> u32 {
        self.state.idle_eeprom_write_ms
    }

    pub fn set_idle_eeprom_write_ms(&mut self, value: u32) {
        self.state.idle_eeprom_write_ms = value;
        self.dirty = true;
    }

    pub fn get_reverse_direction(&self) -> bool {
        self.state.reverse_direction
    }

    pub fn set_reverse_direction(&mut self, value: bool) {
        self.state.reverse_direction = value;
        self.dirty = true;
    }

    pub fn get_motor_move_current_pct(&self) -> u8 {
        self.state.motor_move_current_pct
    }

    pub fn set_motor_move_current_pct(&mut self, value: u8) {
        self.state.motor_move_current_pct = value.clamp(MIN_CURRENT_PCT, MAX_CURRENT_PCT);
        self.dirty = true;
    }

    pub fn get_motor_hold_current_pct(&self) -> u8 {
        self.state.motor_hold_current_pct
    }

    pub fn set_motor_hold_current_pct(&mut self, value: u8) {
        self.state.motor_hold_current_pct = value.clamp(MIN_CURRENT_PCT, MAX_CURRENT_PCT);
        self.dirty = true;
    }
}
