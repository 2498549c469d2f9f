/// A setter refused its input. Nothing in memory or in storage was changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RejectedValue {
    #[error("invalid step mode {0}, expected one of 1, 2, 4, 8, 16, 32, 64, 128, 256")]
    StepMode(u16),

    #[error("invalid speed mode {0}, expected 1 (very slow) to 5 (very fast)")]
    SpeedMode(u8),

    #[error("target {requested} is more than {max_movement} steps away from position {position}")]
    TargetOutOfReach {
        requested: u32,
        position: u32,
        max_movement: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("storage region of {capacity} bytes cannot hold the configuration block and one position slot")]
pub struct RegionTooSmall {
    pub capacity: usize,
}
