use std::cell::Cell;
use std::rc::Rc;
use std::time;

/// Milliseconds since boot. Wraps at 2^32, so callers compare with
/// `wrapping_sub`.
pub trait Clock {
    fn now_ms(&self) -> u32;
}

/// Milliseconds since an `Instant`, truncated to 32 bits.
pub struct SystemClock {
    boot: time::Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            boot: time::Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u32 {
        self.boot.elapsed().as_millis() as u32
    }
}

/// Settable clock. Clones share the same time, so a test can keep one
/// handle while the storage manager owns another.
#[derive(Debug, Clone, Default)]
pub struct MockClock {
    now: Rc<Cell<u32>>,
}

impl MockClock {
    pub fn new(start_ms: u32) -> Self {
        Self {
            now: Rc::new(Cell::new(start_ms)),
        }
    }

    pub fn set(&self, ms: u32) {
        self.now.set(ms);
    }

    pub fn advance(&self, ms: u32) {
        self.now.set(self.now.get().wrapping_add(ms));
    }
}

impl Clock for MockClock {
    fn now_ms(&self) -> u32 {
        self.now.get()
    }
}
