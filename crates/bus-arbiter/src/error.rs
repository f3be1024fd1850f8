use crate::mask::SlotId;

/// Errors reported by the arbiter itself.
///
/// Failures of a client's own bus traffic never show up here; those travel
/// through [`Consumer::on_failure`](crate::Consumer::on_failure).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ArbiterError {
    /// Requested capacity does not fit in one slot mask.
    CapacityExceeded(usize),
    /// Every slot is attached.
    PoolExhausted,
    /// The client is not attached to this arbiter.
    NotAttached,
    /// The client already holds the given slot.
    AlreadyAttached(SlotId),
    /// `n` slots are still attached or the bus is owned.
    InUse(usize),
    /// The arbiter has been released and accepts no new clients.
    Closed,
    /// The work queue has no entry left to reserve for another arbiter.
    QueueExhausted,
}

impl core::fmt::Display for ArbiterError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ArbiterError::CapacityExceeded(n) => {
                write!(f, "capacity {} exceeds {} slots", n, crate::MAX_SLOTS)
            }
            ArbiterError::PoolExhausted => write!(f, "no free slot"),
            ArbiterError::NotAttached => write!(f, "client is not attached"),
            ArbiterError::AlreadyAttached(slot) => {
                write!(f, "client already attached at slot {}", slot.index())
            }
            ArbiterError::InUse(n) => write!(f, "{} slots still in use", n),
            ArbiterError::Closed => write!(f, "arbiter is closed"),
            ArbiterError::QueueExhausted => write!(f, "work queue is full"),
        }
    }
}
