#![no_std]
//! Shared-bus arbitration between asynchronous client state machines.
//!
//! Clients (sensors, memory devices, ...) each hold one slot in an
//! [`Arbiter`]. When a client has work for the bus it calls its
//! [`Notifier`], usually from an interrupt or transfer-complete callback.
//! The arbiter records the request in an atomic bitmask and, when needed,
//! queues a dispatch pass on a single cooperative worker. The worker advances
//! exactly one client at a time while that client owns the bus, choosing the
//! highest pending slot first.
//!
//! Detaching a client never blocks: its slot is returned to the free pool by
//! the worker once the client no longer owns the bus.

mod arbiter;
mod client;
mod config;
mod error;
mod mask;
mod queue;

pub use arbiter::{Arbiter, ArbiterStatus};
pub use client::{BusClient, Consumer, Delivery, Fault, Notifier, Step, Tag};
pub use config::ArbiterConfig;
pub use error::ArbiterError;
pub use mask::{SlotId, SlotIter, SlotMask, MAX_SLOTS};
pub use queue::{ChannelQueue, Job, WorkQueue};
