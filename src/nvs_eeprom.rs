use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};

use anyhow::Result;
use focuser_storage::Eeprom;

const NAMESPACE: &str = "focuser";
const BLOB_KEY: &str = "eeprom";

/// EEPROM emulated on a single NVS blob.
///
/// Reads are served from a RAM mirror. Every write updates the mirror and
/// saves the blob again. A failed save is logged and the mirror stays
/// authoritative until the next successful one.
pub struct NvsEeprom {
    nvs: EspNvs<NvsDefault>,
    mirror: Vec<u8>,
}

impl NvsEeprom {
    pub fn new(nvs_partition: EspDefaultNvsPartition, capacity: usize) -> Result<Self> {
        let nvs = EspNvs::new(nvs_partition, NAMESPACE, true)?;
        let mut mirror = vec![0xFF; capacity];

        let stored_len = match nvs.get_blob(BLOB_KEY, &mut mirror) {
            Ok(stored) => stored.map(|s| s.len()),
            Err(e) => {
                log::warn!("Failed to read EEPROM blob, starting blank: {}", e);
                None
            }
        };

        match stored_len {
            Some(len) if len == capacity => log::info!("Loaded {} byte EEPROM image from NVS", len),
            Some(len) => {
                log::warn!("EEPROM image is {} bytes, expected {}, starting blank", len, capacity);
                mirror.fill(0xFF);
            }
            None => {
                log::info!("No EEPROM image in NVS, starting blank");
                mirror.fill(0xFF);
            }
        }

        Ok(Self { nvs, mirror })
    }
}

impl Eeprom for NvsEeprom {
    fn capacity(&self) -> usize {
        self.mirror.len()
    }

    fn read_block(&mut self, address: usize, buf: &mut [u8]) {
        buf.copy_from_slice(&self.mirror[address..address + buf.len()]);
    }

    fn write_block(&mut self, address: usize, data: &[u8]) {
        self.mirror[address..address + data.len()].copy_from_slice(data);
        if let Err(e) = self.nvs.set_blob(BLOB_KEY, &self.mirror) {
            log::error!("Failed to save EEPROM image to NVS: {}", e);
        }
    }
}
