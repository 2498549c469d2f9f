use std::collections::BTreeSet;

use focuser_storage::checksum::checksum;
use focuser_storage::layout::{decode_config, encode_config, PositionSlot, CONFIG_BLOCK_SIZE, SLOT_SIZE};
use focuser_storage::{
    Clock, ControllerState, Eeprom, MockClock, RamEeprom, RejectedValue, StorageConfig, StorageManager,
};

const CAPACITY: usize = CONFIG_BLOCK_SIZE + 8 * SLOT_SIZE;
const CHECK_PERIOD_MS: u32 = 1000;

fn config() -> StorageConfig {
    StorageConfig {
        capacity: CAPACITY,
        check_period_ms: CHECK_PERIOD_MS,
        ..StorageConfig::default()
    }
}

fn boot(eeprom: RamEeprom, clock: &MockClock) -> StorageManager<RamEeprom, MockClock> {
    let mut manager = StorageManager::new(eeprom, clock.clone(), &config()).unwrap();
    manager.init();
    manager
}

fn reboot(manager: StorageManager<RamEeprom, MockClock>) -> StorageManager<RamEeprom, MockClock> {
    let (eeprom, clock) = manager.into_parts();
    boot(eeprom, &clock)
}

/// Indices of every slot whose checksum matches the stored configuration.
fn valid_slots(eeprom: &RamEeprom) -> Vec<usize> {
    let bytes = eeprom.as_bytes();
    let mut config_block = [0u8; CONFIG_BLOCK_SIZE];
    config_block.copy_from_slice(&bytes[..CONFIG_BLOCK_SIZE]);
    let config = decode_config(&config_block).expect("config block should decode");

    let slot_count = (bytes.len() - CONFIG_BLOCK_SIZE) / SLOT_SIZE;
    (0..slot_count)
        .filter(|&index| {
            let at = CONFIG_BLOCK_SIZE + index * SLOT_SIZE;
            let mut raw = [0u8; SLOT_SIZE];
            raw.copy_from_slice(&bytes[at..at + SLOT_SIZE]);
            let slot = PositionSlot::from_bytes(&raw);
            let candidate = ControllerState {
                position: slot.position,
                target_position: slot.target_position,
                ..config.clone()
            };
            slot.checksum == checksum(&candidate)
        })
        .collect()
}

#[test]
fn test_fresh_zeroed_storage_boots_to_defaults() {
    let clock = MockClock::new(0);
    let manager = boot(RamEeprom::new(CAPACITY), &clock);

    assert_eq!(manager.get_position(), 0);
    assert_eq!(manager.get_max_position(), ControllerState::default().max_position);
    assert_eq!(manager.cursor(), 0);

    let dump = manager.diagnostics().to_string();
    assert!(dump.contains(&format!("current sliding address: {} (slot 0)", CONFIG_BLOCK_SIZE)));
    assert!(dump.contains("sliding slots count: 8"));
}

#[test]
fn test_erased_storage_boots_to_defaults() {
    let clock = MockClock::new(0);
    let manager = boot(RamEeprom::erased(CAPACITY), &clock);
    assert_eq!(manager.get_position(), 0);
    assert_eq!(manager.cursor(), 0);

    let (eeprom, _) = manager.into_parts();
    assert_eq!(valid_slots(&eeprom), vec![0]);
}

#[test]
fn test_reload_reproduces_last_commit() {
    let clock = MockClock::new(0);
    let mut manager = boot(RamEeprom::new(CAPACITY), &clock);

    manager.set_max_position(200_000);
    manager.set_max_movement(20_000);
    manager.set_step_mode(64).unwrap();
    manager.set_step_mode_manual(2).unwrap();
    manager.set_speed_mode(1).unwrap();
    manager.set_settle_buffer_ms(750);
    manager.set_idle_eeprom_write_ms(30_000);
    manager.set_reverse_direction(true);
    manager.set_motor_move_current_pct(60);
    manager.set_motor_hold_current_pct(15);
    manager.sync_position(12_345);
    manager.commit(false);

    manager.set_position(13_000);
    manager.set_target_position(25_000).unwrap();
    manager.commit(false);

    let expected = manager.state().clone();
    let manager = reboot(manager);
    assert_eq!(manager.state(), &expected);
    assert_eq!(manager.cursor(), 2);
}

#[test]
fn test_uncommitted_changes_are_lost_on_reboot() {
    let clock = MockClock::new(0);
    let mut manager = boot(RamEeprom::new(CAPACITY), &clock);
    manager.sync_position(500);
    manager.commit(false);

    manager.set_position(900);
    let manager = reboot(manager);
    assert_eq!(manager.get_position(), 500);
}

#[test]
fn test_position_log_wraps_and_keeps_one_live_slot() {
    let clock = MockClock::new(0);
    let mut manager = boot(RamEeprom::new(CAPACITY), &clock);
    let slot_count = manager.layout().slot_count();

    let mut cursors = BTreeSet::new();
    for step in 1..=(3 * slot_count as u32 + 2) {
        manager.set_position(step * 10);
        manager.commit(false);
        cursors.insert(manager.cursor());
    }
    assert!(cursors.len() <= slot_count);

    let expected = manager.state().clone();
    let expected_cursor = manager.cursor();
    let (eeprom, clock) = manager.into_parts();

    // each slot took a share of the writes instead of one hot spot
    for index in 0..slot_count {
        let position_byte = CONFIG_BLOCK_SIZE + index * SLOT_SIZE;
        assert!(eeprom.write_count(position_byte) >= 3, "slot {}", index);
        assert!(eeprom.write_count(position_byte) <= 5, "slot {}", index);
    }
    assert_eq!(valid_slots(&eeprom), vec![expected_cursor]);

    let manager = boot(eeprom, &clock);
    assert_eq!(manager.state(), &expected);
    assert_eq!(manager.cursor(), expected_cursor);
}

#[test]
fn test_second_commit_is_a_no_op() {
    let clock = MockClock::new(0);
    let mut manager = boot(RamEeprom::new(CAPACITY), &clock);
    manager.set_max_movement(4000);
    manager.set_position(77);
    manager.commit(false);

    let written = manager.bytes_written();
    let cursor = manager.cursor();
    manager.commit(false);

    assert_eq!(manager.bytes_written(), written);
    assert_eq!(manager.cursor(), cursor);
}

#[test]
fn test_max_position_floor_is_persisted() {
    let clock = MockClock::new(0);
    let mut manager = boot(RamEeprom::new(CAPACITY), &clock);
    manager.set_max_position(5);
    manager.commit(false);

    let manager = reboot(manager);
    assert_eq!(manager.get_max_position(), 10_000);
}

#[test]
fn test_target_out_of_reach_is_rejected() {
    let clock = MockClock::new(0);
    let mut manager = boot(RamEeprom::new(CAPACITY), &clock);
    manager.set_max_movement(1000);

    assert_eq!(
        manager.set_target_position(20_000),
        Err(RejectedValue::TargetOutOfReach {
            requested: 20_000,
            position: 0,
            max_movement: 1000
        })
    );
    assert_eq!(manager.get_target_position(), 0);
    assert!(!manager.is_position_change_pending());

    assert!(manager.set_target_position(1000).is_ok());
    assert_eq!(manager.set_target_position(2001).map_err(|_| ()), Err(()));
    assert_eq!(manager.get_target_position(), 1000);
}

#[test]
fn test_dirty_commit_waits_for_check_period() {
    let clock = MockClock::new(0);
    let mut manager = boot(RamEeprom::new(CAPACITY), &clock);

    manager.sync_position(500);
    manager.tick();
    assert!(manager.is_dirty());

    clock.advance(CHECK_PERIOD_MS);
    manager.tick();
    assert!(manager.is_dirty(), "period must be exceeded, not just reached");

    clock.advance(1);
    manager.tick();
    assert!(!manager.is_dirty());

    let manager = reboot(manager);
    assert_eq!(manager.get_position(), 500);
    assert_eq!(manager.get_target_position(), 500);
}

#[test]
fn test_idle_position_commit() {
    let clock = MockClock::new(0);
    let mut manager = boot(RamEeprom::new(CAPACITY), &clock);
    manager.set_idle_eeprom_write_ms(300);
    manager.commit(false);

    clock.advance(100);
    manager.set_position(4321);

    clock.advance(300);
    manager.tick();
    assert!(manager.is_position_change_pending());

    clock.advance(1);
    manager.tick();
    assert!(!manager.is_position_change_pending());

    let manager = reboot(manager);
    assert_eq!(manager.get_position(), 4321);
}

#[test]
fn test_periodic_check_takes_priority_over_idle() {
    let clock = MockClock::new(0);
    let mut manager = boot(RamEeprom::new(CAPACITY), &clock);
    manager.set_idle_eeprom_write_ms(10);
    manager.commit(false);

    manager.set_position(100);
    clock.advance(CHECK_PERIOD_MS + 1);

    // the periodic branch fires and finds nothing dirty
    manager.tick();
    assert!(manager.is_position_change_pending());

    // next tick is inside the period, so the idle trigger gets its turn
    manager.tick();
    assert!(!manager.is_position_change_pending());
}

#[test]
fn test_position_change_at_time_zero_is_still_pending() {
    let clock = MockClock::new(0);
    let mut manager = StorageManager::new(RamEeprom::new(CAPACITY), clock.clone(), &config()).unwrap();
    manager.init();
    manager.set_idle_eeprom_write_ms(5);
    manager.commit(false);

    clock.set(0);
    manager.set_position(9);
    assert!(manager.is_position_change_pending());
}

#[test]
fn test_timers_survive_clock_wraparound() {
    let clock = MockClock::new(u32::MAX - 500);
    let mut manager = boot(RamEeprom::new(CAPACITY), &clock);

    manager.sync_position(600);
    clock.advance(CHECK_PERIOD_MS / 2);
    manager.tick();
    assert!(manager.is_dirty(), "wrapped clock must not look like a huge elapsed time");

    clock.advance(CHECK_PERIOD_MS);
    assert!(clock.now_ms() < 2000);
    manager.tick();
    assert!(!manager.is_dirty());

    manager.set_idle_eeprom_write_ms(200);
    manager.commit(false);
    clock.set(u32::MAX - 50);
    manager.tick();
    manager.set_position(700);
    clock.advance(100);
    manager.tick();
    assert!(manager.is_position_change_pending());
    clock.advance(150);
    manager.tick();
    assert!(!manager.is_position_change_pending());

    let manager = reboot(manager);
    assert_eq!(manager.get_position(), 700);
}

#[test]
fn test_torn_slot_write_falls_back_to_previous_slot() {
    let clock = MockClock::new(0);
    let mut manager = boot(RamEeprom::new(CAPACITY), &clock);
    manager.sync_position(1000);
    manager.commit(false);
    let cursor = manager.cursor();

    let (mut eeprom, clock) = manager.into_parts();
    let at = CONFIG_BLOCK_SIZE + cursor * SLOT_SIZE;
    eeprom.corrupt(at, &[0xAA, 0xAA]);

    // the previous slot was invalidated, so nothing validates any more
    let manager = boot(eeprom, &clock);
    assert_eq!(manager.get_position(), 0);
    assert_eq!(manager.cursor(), 0);
}

#[test]
fn test_corrupt_config_block_resets_to_defaults() {
    let clock = MockClock::new(0);
    let mut manager = boot(RamEeprom::new(CAPACITY), &clock);
    manager.set_settle_buffer_ms(99);
    manager.commit(false);

    let (mut eeprom, clock) = manager.into_parts();
    eeprom.corrupt(8, &[3, 0]); // step mode 3 does not exist

    let manager = boot(eeprom, &clock);
    assert_eq!(manager.get_settle_buffer_ms(), ControllerState::default().settle_buffer_ms);
}

#[test]
fn test_reset_to_defaults_survives_reboot() {
    let clock = MockClock::new(0);
    let mut manager = boot(RamEeprom::new(CAPACITY), &clock);
    manager.set_max_movement(9000);
    for position in [100, 200, 300] {
        manager.set_position(position);
        manager.commit(false);
    }

    manager.reset_to_defaults();
    let manager = reboot(manager);
    assert_eq!(manager.get_position(), 0);
    assert_eq!(manager.get_max_movement(), ControllerState::default().max_movement);
    assert_eq!(manager.cursor(), 0);
}

#[test]
fn test_custom_defaults_from_config() {
    let clock = MockClock::new(0);
    let config = StorageConfig::from_json(
        r#"{ "defaults": {
            "position": 0, "target_position": 0,
            "max_position": 10000, "max_movement": 1000,
            "step_mode": 8, "step_mode_manual": 8, "speed_mode": 4,
            "settle_buffer_ms": 0, "idle_eeprom_write_ms": 1000,
            "reverse_direction": false,
            "motor_move_current_pct": 80, "motor_hold_current_pct": 20
        } }"#,
    )
    .unwrap();
    let mut manager = StorageManager::new(RamEeprom::new(config.capacity), clock, &config).unwrap();
    manager.init();

    assert_eq!(manager.get_max_position(), 10_000);
    assert_eq!(u16::from(manager.get_step_mode()), 8);
    assert_eq!(manager.layout().slot_count(), 83);
}

#[test]
fn test_driver_borrowed_by_reference() {
    let clock = MockClock::new(0);
    let mut eeprom = RamEeprom::new(CAPACITY);
    {
        let mut manager = StorageManager::new(&mut eeprom, clock.clone(), &config()).unwrap();
        manager.init();
        manager.sync_position(2500);
        manager.commit(false);
    }
    assert_eq!(valid_slots(&eeprom), vec![1]);
}

fn write_slot(eeprom: &mut RamEeprom, index: usize, config: &ControllerState, position: u32, target: u32) {
    let state = ControllerState {
        position,
        target_position: target,
        ..config.clone()
    };
    let slot = PositionSlot {
        position,
        target_position: target,
        checksum: checksum(&state),
    };
    eeprom.write_block(CONFIG_BLOCK_SIZE + index * SLOT_SIZE, &slot.to_bytes());
}

#[test]
fn test_scan_stops_at_first_matching_slot_even_if_out_of_range() {
    let config = ControllerState {
        max_position: 20_000,
        ..ControllerState::default()
    };
    let mut eeprom = RamEeprom::new(CAPACITY);
    eeprom.write_block(0, &encode_config(&config));
    write_slot(&mut eeprom, 0, &config, 30_000, 30_000);
    write_slot(&mut eeprom, 2, &config, 1234, 1234);

    let clock = MockClock::new(0);
    let manager = boot(eeprom, &clock);

    assert_eq!(manager.cursor(), 0);
    assert_eq!(manager.get_position(), 0);
    assert_eq!(manager.get_max_position(), ControllerState::default().max_position);
}

#[test]
fn test_invalidation_holds_when_state_sums_to_zero() {
    let clock = MockClock::new(0);
    let mut manager = boot(RamEeprom::new(CAPACITY), &clock);

    let settle = 0u32.wrapping_sub(checksum(manager.state()));
    manager.set_settle_buffer_ms(settle);
    manager.commit(false);
    assert_eq!(manager.state().checksum, 0);

    manager.set_position(10);
    manager.commit(false);
    let cursor = manager.cursor();

    let (eeprom, clock) = manager.into_parts();
    assert_eq!(valid_slots(&eeprom), vec![cursor]);

    let manager = boot(eeprom, &clock);
    assert_eq!(manager.get_position(), 10);
    assert_eq!(manager.cursor(), cursor);
}
