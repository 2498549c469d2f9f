/// Byte-addressable non-volatile memory.
///
/// Reads and writes always complete. Keeping `address + len` inside
/// `capacity()` is the caller's job.
pub trait Eeprom {
    fn capacity(&self) -> usize;
    fn read_block(&mut self, address: usize, buf: &mut [u8]);
    fn write_block(&mut self, address: usize, data: &[u8]);
}

impl<E: Eeprom + ?Sized> Eeprom for &mut E {
    fn capacity(&self) -> usize {
        (**self).capacity()
    }

    fn read_block(&mut self, address: usize, buf: &mut [u8]) {
        (**self).read_block(address, buf)
    }

    fn write_block(&mut self, address: usize, data: &[u8]) {
        (**self).write_block(address, data)
    }
}

/// In-memory EEPROM with a write counter per byte.
///
/// Used by the host simulator and by tests to check how writes spread
/// over the region.
#[derive(Debug, Clone)]
pub struct RamEeprom {
    cells: Vec<u8>,
    write_counts: Vec<u32>,
}

impl RamEeprom {
    /// Zero-filled region, the state some parts leave the factory in.
    pub fn new(capacity: usize) -> Self {
        Self::filled(capacity, 0x00)
    }

    /// Region in the erased state (all 0xFF).
    pub fn erased(capacity: usize) -> Self {
        Self::filled(capacity, 0xFF)
    }

    pub fn filled(capacity: usize, value: u8) -> Self {
        Self {
            cells: vec![value; capacity],
            write_counts: vec![0; capacity],
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            cells: bytes.to_vec(),
            write_counts: vec![0; bytes.len()],
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.cells
    }

    /// Number of times the byte at `address` has been written.
    pub fn write_count(&self, address: usize) -> u32 {
        self.write_counts[address]
    }

    pub fn total_writes(&self) -> u64 {
        self.write_counts.iter().map(|&c| c as u64).sum()
    }

    /// Overwrite bytes without counting them as wear, to simulate corruption.
    pub fn corrupt(&mut self, address: usize, data: &[u8]) {
        self.cells[address..address + data.len()].copy_from_slice(data);
    }
}

impl Eeprom for RamEeprom {
    fn capacity(&self) -> usize {
        self.cells.len()
    }

    fn read_block(&mut self, address: usize, buf: &mut [u8]) {
        buf.copy_from_slice(&self.cells[address..address + buf.len()]);
    }

    fn write_block(&mut self, address: usize, data: &[u8]) {
        self.cells[address..address + data.len()].copy_from_slice(data);
        for count in &mut self.write_counts[address..address + data.len()] {
            *count += 1;
        }
    }
}
