use core::cell::Cell;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use portable_atomic::{AtomicBool, AtomicU8, Ordering};

use crate::client::{
    BusClient, Consumer, Delivery, Endpoint, Fault, Notifier, Step, Tag,
};
use crate::config::ArbiterConfig;
use crate::error::ArbiterError;
use crate::mask::{AtomicSlotMask, SlotId, SlotMask, MAX_SLOTS};
use crate::queue::{Job, WorkQueue};

/// Encoding of "no slot owns the bus" in `Arbiter::current`.
const IDLE: u8 = u8::MAX;

/// What a slot is bound to. Copied out under the slot lock.
#[derive(Clone, Copy)]
struct Binding<'a> {
    client: Option<&'a dyn BusClient<'a>>,
    tag: Tag,
}

impl Binding<'_> {
    const EMPTY: Self = Self { client: None, tag: Tag(0) };
}

struct Slot<'a, M: RawMutex> {
    binding: Mutex<M, Cell<Binding<'a>>>,
}

impl<M: RawMutex> Slot<'_, M> {
    const fn new() -> Self {
        Self { binding: Mutex::new(Cell::new(Binding::EMPTY)) }
    }
}

/// Point-in-time view of the arbiter's bookkeeping.
///
/// Fields are loaded one after another, so a snapshot taken while interrupts
/// are notifying may mix two instants. Taken from the worker, `current` is
/// exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ArbiterStatus {
    pub free: SlotMask,
    pub pending: SlotMask,
    pub detaching: SlotMask,
    pub occupied: SlotMask,
    pub current: Option<SlotId>,
}

/// Arbitrates one shared bus between up to [`MAX_SLOTS`] client state
/// machines.
///
/// Interrupt context talks to the arbiter only through atomic updates of the
/// `free`, `pending` and `detaching` masks. The bus owner (`current`) is
/// written only by [`Arbiter::dispatch`], which must run on the worker that
/// drains the injected [`WorkQueue`].
///
/// Priority is strictly by slot index, highest first.
pub struct Arbiter<'a, M: RawMutex> {
    slots: [Slot<'a, M>; MAX_SLOTS],
    capacity: usize,
    free: AtomicSlotMask,
    pending: AtomicSlotMask,
    detaching: AtomicSlotMask,
    current: AtomicU8,
    closed: AtomicBool,
    /// Set while a pass of this arbiter sits in the queue.
    queued: AtomicBool,
    /// Serialises the duplicate check, slot claim and bind of `attach`.
    attach_lock: Mutex<M, ()>,
    queue: &'a dyn WorkQueue<'a>,
    consumer: &'a dyn Consumer,
}

impl<'a, M: RawMutex> Arbiter<'a, M> {
    /// Creates an arbiter with every slot free and the bus idle.
    ///
    /// Reserves one entry of `queue` for the arbiter's passes; fails with
    /// [`ArbiterError::QueueExhausted`] when the queue has no room left.
    pub fn new(
        config: ArbiterConfig,
        queue: &'a dyn WorkQueue<'a>,
        consumer: &'a dyn Consumer,
    ) -> Result<Self, ArbiterError> {
        if config.capacity > MAX_SLOTS {
            return Err(ArbiterError::CapacityExceeded(config.capacity));
        }
        if !queue.reserve() {
            return Err(ArbiterError::QueueExhausted);
        }

        Ok(Self {
            slots: core::array::from_fn(|_| Slot::new()),
            capacity: config.capacity,
            free: AtomicSlotMask::new(SlotMask::first(config.capacity)),
            pending: AtomicSlotMask::new(SlotMask::EMPTY),
            detaching: AtomicSlotMask::new(SlotMask::EMPTY),
            current: AtomicU8::new(IDLE),
            closed: AtomicBool::new(false),
            queued: AtomicBool::new(false),
            attach_lock: Mutex::new(()),
            queue,
            consumer,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slot currently owning the bus.
    pub fn current(&self) -> Option<SlotId> {
        match self.current.load(Ordering::SeqCst) {
            IDLE => None,
            index => SlotId::new(index as usize),
        }
    }

    #[inline]
    pub fn is_busy(&self) -> bool {
        self.current().is_some()
    }

    /// Slots bound to a client, including ones whose detach is in progress.
    pub fn occupied(&self) -> SlotMask {
        SlotMask::first(self.capacity).difference(self.free.load())
    }

    pub fn attached_count(&self) -> usize {
        self.occupied().len()
    }

    pub fn status(&self) -> ArbiterStatus {
        let free = self.free.load();
        ArbiterStatus {
            free,
            pending: self.pending.load(),
            detaching: self.detaching.load(),
            occupied: SlotMask::first(self.capacity).difference(free),
            current: self.current(),
        }
    }

    /// Tag of the client bound to `slot`, if any.
    pub fn tag(&self, slot: SlotId) -> Option<Tag> {
        let binding = self.binding(slot)?;
        binding.client.map(|_| binding.tag)
    }

    fn binding(&self, slot: SlotId) -> Option<Binding<'a>> {
        self.slots
            .get(slot.index())
            .map(|s| s.binding.lock(|cell| cell.get()))
    }

    fn bind(&self, slot: SlotId, binding: Binding<'a>) {
        if let Some(s) = self.slots.get(slot.index()) {
            s.binding.lock(|cell| cell.set(binding));
        }
    }

    fn find(&self, client: &dyn BusClient<'a>) -> Option<SlotId> {
        self.occupied().iter().find(|&slot| {
            self.binding(slot)
                .and_then(|b| b.client)
                .is_some_and(|bound| core::ptr::addr_eq(bound, client))
        })
    }

    fn set_current(&self, slot: Option<SlotId>) {
        let raw = slot.map_or(IDLE, |s| s.index() as u8);
        self.current.store(raw, Ordering::SeqCst);
    }

    /// Runs one client step. A slot with no client bound reports done.
    fn advance(&self, slot: SlotId) -> Step {
        match self.binding(slot).and_then(|b| b.client) {
            Some(client) => client.advance(),
            None => {
                #[cfg(feature = "defmt")]
                defmt::warn!("advance on unbound slot {}", slot);
                Step::Done
            }
        }
    }

    /// Returns detached slots to the free pool. Worker only, bus idle.
    fn reclaim(&self) {
        while self.current().is_none() {
            let Some(slot) = self.detaching.load().highest() else {
                break;
            };
            self.detaching.fetch_clear(slot.mask());
            self.pending.fetch_clear(slot.mask());
            // Unbind before the bit is published as free.
            self.bind(slot, Binding::EMPTY);
            self.free.fetch_set(slot.mask());

            #[cfg(feature = "defmt")]
            defmt::debug!("slot {} reclaimed", slot);
        }
    }
}

impl<'a, M: RawMutex + Sync + 'a> Arbiter<'a, M> {
    /// Binds `client` to the highest free slot and installs its callbacks.
    pub fn attach(
        &'a self,
        client: &'a dyn BusClient<'a>,
        tag: Tag,
    ) -> Result<SlotId, ArbiterError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ArbiterError::Closed);
        }

        let slot = self.attach_lock.lock(|_| {
            if let Some(slot) = self.find(client) {
                return Err(ArbiterError::AlreadyAttached(slot));
            }

            let slot =
                self.free.claim_highest().ok_or(ArbiterError::PoolExhausted)?;

            // Lost a race with `try_release`.
            if self.closed.load(Ordering::SeqCst) {
                self.free.fetch_set(slot.mask());
                return Err(ArbiterError::Closed);
            }

            self.bind(slot, Binding { client: Some(client), tag });
            Ok(slot)
        })?;

        client.install_notifier(Some(Notifier::new(self, slot)));
        client.install_completion(Some(Delivery::new(self, slot)));
        client.install_error(Some(Delivery::new(self, slot)));

        #[cfg(feature = "defmt")]
        defmt::debug!("attached {} at slot {}", tag, slot);

        Ok(slot)
    }

    /// Stops `client`'s notifications and schedules its slot for reclaim.
    ///
    /// Does not wait: if the client owns the bus, the slot stays occupied
    /// until its current operation reports done. With its notifier gone, a
    /// detached owner is advanced only by passes other events queue; this call
    /// queues one.
    pub fn detach(
        &'a self,
        client: &dyn BusClient<'a>,
    ) -> Result<SlotId, ArbiterError> {
        let slot = self.find(client).ok_or(ArbiterError::NotAttached)?;

        client.install_notifier(None);
        client.install_completion(None);
        client.install_error(None);

        self.detaching.fetch_set(slot.mask());
        self.schedule();

        #[cfg(feature = "defmt")]
        defmt::debug!("detaching slot {}", slot);

        Ok(slot)
    }

    /// Detaches every attached client. Returns how many were detached.
    pub fn detach_all(&'a self) -> usize {
        let mut count = 0;
        let settled = self.occupied().difference(self.detaching.load());
        for slot in settled {
            if let Some(client) = self.binding(slot).and_then(|b| b.client) {
                if self.detach(client).is_ok() {
                    count += 1;
                }
            }
        }
        count
    }

    /// Closes the arbiter if nothing is attached and the bus is idle.
    ///
    /// After success `attach` fails with [`ArbiterError::Closed`]. Calling it
    /// again is a no-op.
    pub fn try_release(&self) -> Result<(), ArbiterError> {
        // The bus owner is always occupied, so this also covers `busy`.
        let in_use = self.attached_count();
        if in_use > 0 {
            return Err(ArbiterError::InUse(in_use));
        }

        let was_closed = self.closed.swap(true, Ordering::SeqCst);

        // An attach that claimed its slot before the flag went up.
        let in_use = self.attached_count();
        if in_use > 0 {
            if !was_closed {
                self.closed.store(false, Ordering::SeqCst);
            }
            return Err(ArbiterError::InUse(in_use));
        }
        Ok(())
    }

    /// Signals that `slot`'s client wants the bus. Safe from interrupt
    /// context.
    ///
    /// Repeated requests before the slot is serviced collapse into one.
    pub fn request_service(&'a self, slot: SlotId) {
        if slot.index() >= self.capacity || self.free.load().contains(slot) {
            #[cfg(feature = "defmt")]
            defmt::warn!("service request from unattached slot {}", slot);
            return;
        }

        let before = self.pending.fetch_set(slot.mask());
        match self.current() {
            // The owner needs another turn to continue its operation.
            Some(owner) if owner == slot => self.schedule(),
            // Picked up once the owner lets go.
            Some(_) => {}
            // First request since the worker drained; otherwise a pass is
            // already on its way.
            None if before.is_empty() => self.schedule(),
            None => {}
        }
    }

    /// One dispatch pass. Worker only.
    ///
    /// Continues the bus owner if there is one, then services pending slots
    /// highest first until one of them keeps the bus, then reclaims detached
    /// slots if the bus ended up idle.
    pub fn dispatch(&'a self) {
        if let Some(owner) = self.current() {
            self.pending.fetch_clear(owner.mask());
            if !self.advance(owner).is_busy() {
                self.set_current(None);
            }
        }

        while self.current().is_none() {
            let Some(slot) = self.pending.claim_highest() else {
                break;
            };
            if self.advance(slot).is_busy() {
                self.set_current(Some(slot));
                // A completion that fired before ownership was published saw
                // an idle bus with other slots pending and scheduled nothing.
                // If it did schedule, the pass is still queued and this is a
                // no-op.
                if self.pending.load().contains(slot) {
                    self.schedule();
                }
            }
        }

        if self.current().is_none() {
            if !self.detaching.load().is_empty() {
                self.reclaim();
            }
            if self.pending.load().is_empty() {
                self.consumer.on_idle();
            }
        }
    }

    /// Queues a pass unless one is already waiting.
    fn schedule(&'a self) {
        if !self.queued.swap(true, Ordering::SeqCst) {
            self.queue.enqueue(self);
        }
    }
}

impl<'a, M: RawMutex + Sync + 'a> Job<'a> for Arbiter<'a, M> {
    fn run(&'a self) {
        // Cleared first: requests from here on need a pass of their own.
        self.queued.store(false, Ordering::SeqCst);
        self.dispatch();
    }
}

impl<'a, M: RawMutex + Sync + 'a> Endpoint<'a> for Arbiter<'a, M> {
    fn request_service(&'a self, slot: SlotId) {
        Arbiter::request_service(self, slot);
    }

    fn deliver_result(&self, slot: SlotId, payload: &[u8]) {
        if let Some(tag) = self.tag(slot) {
            self.consumer.on_result(tag, payload);
        }
    }

    fn deliver_failure(&self, slot: SlotId, fault: Fault) {
        if let Some(tag) = self.tag(slot) {
            self.consumer.on_failure(tag, fault);
        }
    }
}
