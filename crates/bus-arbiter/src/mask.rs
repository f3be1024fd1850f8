use portable_atomic::{AtomicU32, Ordering};

/// Largest number of slots an arbiter can hold: one bit per slot in a `u32`.
pub const MAX_SLOTS: usize = u32::BITS as usize;

/// Index of a client slot, which is also the slot's bit position.
///
/// Higher indices win arbitration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SlotId(u8);

impl SlotId {
    /// Returns the slot at `index`, or `None` if it does not fit in a mask.
    pub const fn new(index: usize) -> Option<Self> {
        if index < MAX_SLOTS {
            Some(Self(index as u8))
        } else {
            None
        }
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// The single-bit mask `1 << index`.
    #[inline]
    pub const fn mask(self) -> SlotMask {
        SlotMask(1 << self.0)
    }
}

/// Fixed-width set of slots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SlotMask(u32);

impl SlotMask {
    pub const EMPTY: Self = Self(0);
    pub const FULL: Self = Self(u32::MAX);

    /// Mask with the lowest `count` slots set. Counts past `MAX_SLOTS` saturate.
    pub const fn first(count: usize) -> Self {
        if count >= MAX_SLOTS {
            Self::FULL
        } else {
            Self((1 << count) - 1)
        }
    }

    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn contains(self, slot: SlotId) -> bool {
        self.0 & slot.mask().0 != 0
    }

    /// Number of slots in the set.
    #[inline]
    pub const fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Highest-priority member of the set.
    #[inline]
    pub const fn highest(self) -> Option<SlotId> {
        if self.0 == 0 {
            None
        } else {
            Some(SlotId((u32::BITS - 1 - self.0.leading_zeros()) as u8))
        }
    }

    #[inline]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    #[inline]
    pub const fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    #[inline]
    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    #[inline]
    pub const fn is_disjoint(self, other: Self) -> bool {
        self.0 & other.0 == 0
    }

    #[inline]
    pub const fn is_subset(self, other: Self) -> bool {
        self.0 & !other.0 == 0
    }

    /// Iterates members from highest to lowest, the order they would be
    /// serviced in.
    pub fn iter(self) -> SlotIter {
        SlotIter(self)
    }
}

impl IntoIterator for SlotMask {
    type Item = SlotId;
    type IntoIter = SlotIter;

    fn into_iter(self) -> SlotIter {
        self.iter()
    }
}

impl FromIterator<SlotId> for SlotMask {
    fn from_iter<I: IntoIterator<Item = SlotId>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::EMPTY, |acc, slot| acc.union(slot.mask()))
    }
}

/// Iterator over a [`SlotMask`], highest slot first.
#[derive(Debug, Clone)]
pub struct SlotIter(SlotMask);

impl Iterator for SlotIter {
    type Item = SlotId;

    fn next(&mut self) -> Option<SlotId> {
        let slot = self.0.highest()?;
        self.0 = self.0.difference(slot.mask());
        Some(slot)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.0.len();
        (n, Some(n))
    }
}

impl ExactSizeIterator for SlotIter {}

/// A [`SlotMask`] shared between interrupt and worker contexts.
///
/// Every mutation is a single atomic read-modify-write, so writers touching
/// different bits never clobber each other.
pub(crate) struct AtomicSlotMask(AtomicU32);

impl AtomicSlotMask {
    pub(crate) const fn new(mask: SlotMask) -> Self {
        Self(AtomicU32::new(mask.0))
    }

    #[inline]
    pub(crate) fn load(&self) -> SlotMask {
        SlotMask(self.0.load(Ordering::SeqCst))
    }

    /// Sets `mask`, returning the value seen before the update.
    #[inline]
    pub(crate) fn fetch_set(&self, mask: SlotMask) -> SlotMask {
        SlotMask(self.0.fetch_or(mask.0, Ordering::SeqCst))
    }

    /// Clears `mask`, returning the value seen before the update.
    #[inline]
    pub(crate) fn fetch_clear(&self, mask: SlotMask) -> SlotMask {
        SlotMask(self.0.fetch_and(!mask.0, Ordering::SeqCst))
    }

    /// Removes the highest set slot and returns it.
    ///
    /// A concurrent clearer may win the race for a given bit; in that case the
    /// next-highest candidate is tried until the mask is observed empty.
    pub(crate) fn claim_highest(&self) -> Option<SlotId> {
        loop {
            let slot = self.load().highest()?;
            if self.fetch_clear(slot.mask()).contains(slot) {
                return Some(slot);
            }
        }
    }
}
