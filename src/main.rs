use std::io::{self, BufRead};
use std::sync::mpsc;

#[cfg(target_os = "espidf")]
use esp_idf_svc::hal::delay::FreeRtos;

use focuser_storage::command::execute_command;
use focuser_storage::{Clock, Eeprom, StorageConfig, StorageManager, SystemClock};

#[cfg(target_os = "espidf")]
mod nvs_eeprom;

const LOOP_DELAY_MS: u32 = 10;

fn main() {
    #[cfg(target_os = "espidf")]
    {
        // It is necessary to call this function once. Otherwise, some patches to the runtime
        // implemented by esp-idf-sys might not link properly. See https://github.com/esp-rs/esp-idf-template/issues/71
        esp_idf_svc::sys::link_patches();

        // Bind the log crate to the ESP Logging facilities
        esp_idf_svc::log::EspLogger::initialize_default();
    }

    #[cfg(not(target_os = "espidf"))]
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Focuser storage starting");

    if let Err(e) = run_app() {
        log::error!("App error: {}", e);
        halt();
    }
}

#[cfg(target_os = "espidf")]
fn halt() -> ! {
    loop {
        log::info!("System halted. Restarting in 10 seconds...");
        FreeRtos::delay_ms(10000);
    }
}

#[cfg(not(target_os = "espidf"))]
fn halt() -> ! {
    std::process::exit(1);
}

#[cfg(target_os = "espidf")]
fn run_app() -> anyhow::Result<()> {
    use esp_idf_svc::hal::peripherals::Peripherals;
    use esp_idf_svc::hal::usb_serial;
    use esp_idf_svc::io::vfs::BlockingStdIo;
    use esp_idf_svc::nvs::EspDefaultNvsPartition;

    let nvs = EspDefaultNvsPartition::take()?;
    let peripherals = Peripherals::take()?;
    let p = peripherals.pins;

    // setup stdin, gpio12 and gpio13 are the USB serial pins
    let usb_serial = usb_serial::UsbSerialDriver::new(
        peripherals.usb_serial,
        p.gpio12,
        p.gpio13,
        &usb_serial::config::Config::default(),
    )?;
    let _blocking_io = BlockingStdIo::usb_serial(usb_serial)?;

    let config = StorageConfig::default();
    let eeprom = nvs_eeprom::NvsEeprom::new(nvs, config.capacity)?;
    run_storage(eeprom, SystemClock::new(), &config)
}

#[cfg(not(target_os = "espidf"))]
fn run_app() -> anyhow::Result<()> {
    use anyhow::Context;
    use focuser_storage::RamEeprom;

    let config = match std::env::args().nth(1) {
        Some(path) => {
            let json = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path))?;
            StorageConfig::from_json(&json)?
        }
        None => StorageConfig::default(),
    };

    log::info!("Simulating a {} byte EEPROM in RAM", config.capacity);
    run_storage(RamEeprom::erased(config.capacity), SystemClock::new(), &config)
}

/// Boot the storage manager and run the control loop: console commands,
/// then the debounce check.
fn run_storage<E: Eeprom, C: Clock>(eeprom: E, clock: C, config: &StorageConfig) -> anyhow::Result<()> {
    let mut manager = StorageManager::new(eeprom, clock, config)?;
    manager.init();
    log::info!("Storage ready, type 'help' for commands\r\n{}", manager.diagnostics());

    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || read_stdin_lines(tx));

    loop {
        loop {
            match rx.try_recv() {
                Ok(cmdline) => {
                    log::info!("Command: {}", cmdline);
                    match execute_command(&mut manager, &cmdline) {
                        Ok(reply) => println!("{}", reply),
                        Err(e) => log::error!("{:#}", e),
                    }
                }
                Err(mpsc::TryRecvError::Empty) => break,
                Err(mpsc::TryRecvError::Disconnected) => {
                    log::info!("Console closed, writing pending changes");
                    manager.commit(false);
                    return Ok(());
                }
            }
        }

        manager.tick();
        delay_ms(LOOP_DELAY_MS);
    }
}

fn read_stdin_lines(tx: mpsc::Sender<String>) {
    let stdin = io::stdin();
    loop {
        let mut handle = stdin.lock();
        let mut cmdline = String::new();
        match handle.read_line(&mut cmdline) {
            Ok(0) => {
                if cfg!(target_os = "espidf") {
                    delay_ms(LOOP_DELAY_MS);
                    continue;
                }
                return;
            }
            Ok(_) => {}
            Err(e) => {
                match e.kind() {
                    std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::Interrupted => {
                        delay_ms(LOOP_DELAY_MS);
                        continue;
                    }
                    _ => {
                        log::info!("read_stdin_lines: read from stdin failed: {e}");
                        continue;
                    }
                }
            }
        }

        let cmdline = cmdline.trim();
        if cmdline.is_empty() {
            continue;
        }
        if tx.send(cmdline.to_string()).is_err() {
            return;
        }
    }
}

#[cfg(target_os = "espidf")]
fn delay_ms(ms: u32) {
    FreeRtos::delay_ms(ms);
}

#[cfg(not(target_os = "espidf"))]
fn delay_ms(ms: u32) {
    std::thread::sleep(std::time::Duration::from_millis(ms as u64));
}
