use std::str::FromStr;

use anyhow::{Context, Result};

use crate::clock::Clock;
use crate::eeprom::Eeprom;
use crate::storage::StorageManager;

const HELP: &str = "\
Available commands:
  help                               - Show this help message
  dump                               - Print storage diagnostics
  get_state                          - Get persisted state in JSON format
  commit                             - Write pending changes now
  reset                              - Reset all settings to defaults
  get_position                       - Get current position
  set_position <steps>               - Record current position
  sync_position <steps>              - Set position and target (e.g. after homing)
  get_target_position                - Get target position
  set_target_position <steps>        - Set target position (within max movement)
  set_max_position <steps>           - Set max position (min 10000)
  set_max_movement <steps>           - Set max single movement (min 1000)
  set_step_mode <1|2|4|...|256>      - Set step mode
  set_step_mode_manual <1|2|...|256> - Set manual step mode
  set_speed_mode <1-5>               - Set speed mode (1 very slow .. 5 very fast)
  set_settle_buffer_ms <ms>          - Set settle buffer
  set_idle_eeprom_write_ms <ms>      - Set idle delay before position is saved
  set_reverse_direction <true|false> - Set motor direction
  set_motor_move_current <1-100>     - Set move current in percent
  set_motor_hold_current <1-100>     - Set hold current in percent";

/// Percentages are clamped by the setters, so out-of-range numbers are
/// accepted here and saturated to fit a byte.
fn parse_pct(command: &str, args: &str) -> Result<u8> {
    let value: u32 = parse_arg(command, args)?;
    Ok(value.min(u8::MAX as u32) as u8)
}

fn parse_arg<T: FromStr>(command: &str, args: &str) -> Result<T> {
    args.trim()
        .parse::<T>()
        .map_err(|_| anyhow::anyhow!("Invalid value for {}: '{}'", command, args))
}

/// Run one console line against the storage manager and return the reply.
pub fn execute_command<E: Eeprom, C: Clock>(
    manager: &mut StorageManager<E, C>,
    cmdline: &str,
) -> Result<String> {
    let cmdline = cmdline.trim();
    let parts = cmdline.splitn(2, ' ').collect::<Vec<&str>>();
    let command = parts[0];
    let args = if parts.len() > 1 { parts[1] } else { "" };

    let reply = match command {
        "help" => HELP.to_string(),
        "dump" => manager.diagnostics().to_string(),
        "get_state" => serde_json::to_string_pretty(manager.state()).context("Failed to serialize state")?,
        "commit" => {
            manager.commit(false);
            "Committed".to_string()
        }
        "reset" => {
            manager.reset_to_defaults();
            "Settings reset to defaults".to_string()
        }
        "get_position" => manager.get_position().to_string(),
        "set_position" => {
            manager.set_position(parse_arg(command, args)?);
            format!("Position set to {}", manager.get_position())
        }
        "sync_position" => {
            manager.sync_position(parse_arg(command, args)?);
            format!("Position synced to {}", manager.get_position())
        }
        "get_target_position" => manager.get_target_position().to_string(),
        "set_target_position" => {
            manager.set_target_position(parse_arg(command, args)?)?;
            format!("Target position set to {}", manager.get_target_position())
        }
        "set_max_position" => {
            manager.set_max_position(parse_arg(command, args)?);
            format!("Max position set to {}", manager.get_max_position())
        }
        "set_max_movement" => {
            manager.set_max_movement(parse_arg(command, args)?);
            format!("Max movement set to {}", manager.get_max_movement())
        }
        "set_step_mode" => {
            manager.set_step_mode(parse_arg(command, args)?)?;
            format!("Step mode set to {}", u16::from(manager.get_step_mode()))
        }
        "set_step_mode_manual" => {
            manager.set_step_mode_manual(parse_arg(command, args)?)?;
            format!("Manual step mode set to {}", u16::from(manager.get_step_mode_manual()))
        }
        "set_speed_mode" => {
            manager.set_speed_mode(parse_arg(command, args)?)?;
            format!("Speed mode set to {:?}", manager.get_speed_mode())
        }
        "set_settle_buffer_ms" => {
            manager.set_settle_buffer_ms(parse_arg(command, args)?);
            format!("Settle buffer set to {} ms", manager.get_settle_buffer_ms())
        }
        "set_idle_eeprom_write_ms" => {
            manager.set_idle_eeprom_write_ms(parse_arg(command, args)?);
            format!("Idle write delay set to {} ms", manager.get_idle_eeprom_write_ms())
        }
        "set_reverse_direction" => {
            let value: bool = parse_arg(command, args)
                .context("Use 'true' or 'false'")?;
            manager.set_reverse_direction(value);
            format!("Reverse direction set to {}", value)
        }
        "set_motor_move_current" => {
            manager.set_motor_move_current_pct(parse_pct(command, args)?);
            format!("Move current set to {}%", manager.get_motor_move_current_pct())
        }
        "set_motor_hold_current" => {
            manager.set_motor_hold_current_pct(parse_pct(command, args)?);
            format!("Hold current set to {}%", manager.get_motor_hold_current_pct())
        }
        _ => anyhow::bail!("Unknown command: {}", command),
    };
    Ok(reply)
}
