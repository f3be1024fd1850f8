use crate::mask::SlotId;

/// Opaque identifier handed back with every delivery so a consumer can tell
/// clients apart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Tag(pub u32);

/// Outcome of one [`BusClient::advance`] step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Step {
    /// The client still owns the bus; a later notification continues it.
    Busy,
    /// The client is finished and the bus is free.
    Done,
}

impl Step {
    #[inline]
    pub fn is_busy(self) -> bool {
        matches!(self, Step::Busy)
    }
}

impl From<bool> for Step {
    fn from(busy: bool) -> Self {
        if busy {
            Step::Busy
        } else {
            Step::Done
        }
    }
}

/// Failure reported by a client. The arbiter forwards it untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Fault {
    /// The transaction did not complete in time.
    Timeout,
    /// The device did not acknowledge.
    Nack,
    /// Data failed a checksum or sanity check.
    Corrupt,
    /// Device-specific error code.
    Device(u16),
}

/// A device state machine that takes turns on the shared bus.
///
/// The arbiter calls the `install_*` setters once when the client is attached
/// and again with `None` when it is detached. Clients are driven from
/// interrupt context and the worker at once, so they must be `Sync`.
pub trait BusClient<'a>: Sync {
    /// Stores the handle used to ask for a turn on the bus.
    fn install_notifier(&self, notifier: Option<Notifier<'a>>);

    /// Stores the handle used to deliver finished results.
    fn install_completion(&self, delivery: Option<Delivery<'a>>);

    /// Stores the handle used to report failures. Clients without a failure
    /// path can ignore it.
    fn install_error(&self, delivery: Option<Delivery<'a>>) {
        let _ = delivery;
    }

    /// Performs or continues one non-blocking bus step.
    fn advance(&self) -> Step;
}

/// Receives results and failures from attached clients.
///
/// All methods run on the worker.
pub trait Consumer: Sync {
    fn on_result(&self, tag: Tag, payload: &[u8]);

    fn on_failure(&self, tag: Tag, fault: Fault);

    /// The worker finished a pass with the bus idle and nothing pending.
    fn on_idle(&self) {}
}

/// Engine side of the per-slot handles, erased over the mutex type.
pub(crate) trait Endpoint<'a>: Sync {
    fn request_service(&'a self, slot: SlotId);

    fn deliver_result(&self, slot: SlotId, payload: &[u8]);

    fn deliver_failure(&self, slot: SlotId, fault: Fault);
}

/// "This client has work to do" handle, bound to one slot.
///
/// Safe to call from interrupt context.
#[derive(Clone, Copy)]
pub struct Notifier<'a> {
    endpoint: &'a dyn Endpoint<'a>,
    slot: SlotId,
}

impl<'a> Notifier<'a> {
    pub(crate) fn new(endpoint: &'a dyn Endpoint<'a>, slot: SlotId) -> Self {
        Self { endpoint, slot }
    }

    pub fn slot(&self) -> SlotId {
        self.slot
    }

    /// Marks the slot pending and schedules a dispatch pass if needed.
    #[inline]
    pub fn request_service(&self) {
        self.endpoint.request_service(self.slot)
    }
}

impl core::fmt::Debug for Notifier<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Notifier").field("slot", &self.slot).finish()
    }
}

/// Result/failure handle, bound to one slot. Call it from the worker, i.e.
/// from inside [`BusClient::advance`].
#[derive(Clone, Copy)]
pub struct Delivery<'a> {
    endpoint: &'a dyn Endpoint<'a>,
    slot: SlotId,
}

impl<'a> Delivery<'a> {
    pub(crate) fn new(endpoint: &'a dyn Endpoint<'a>, slot: SlotId) -> Self {
        Self { endpoint, slot }
    }

    pub fn slot(&self) -> SlotId {
        self.slot
    }

    pub fn complete(&self, payload: &[u8]) {
        self.endpoint.deliver_result(self.slot, payload)
    }

    pub fn fail(&self, fault: Fault) {
        self.endpoint.deliver_failure(self.slot, fault)
    }
}

impl core::fmt::Debug for Delivery<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Delivery").field("slot", &self.slot).finish()
    }
}
