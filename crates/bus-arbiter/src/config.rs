use crate::mask::MAX_SLOTS;

/// Construction parameters for an [`Arbiter`](crate::Arbiter).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ArbiterConfig {
    /// Number of client slots. At most [`MAX_SLOTS`].
    pub capacity: usize,
}

impl ArbiterConfig {
    pub const fn with_capacity(capacity: usize) -> Self {
        Self { capacity }
    }
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self::with_capacity(MAX_SLOTS)
    }
}
