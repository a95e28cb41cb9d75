//! # RoboLink Core
//!
//! Core types, errors, and events for RoboLink.
//! Provides the transport-agnostic data model shared by the communication
//! and settings crates: port descriptors, payloads, connection state,
//! and the application event bus.

pub mod error;
pub mod event_bus;
pub mod port;
pub mod types;

pub use error::{ConnectionError, Error, Result, StateError};

pub use port::{ConnectionState, DeviceRoster, Payload, PortDescriptor, PortKind};

// Re-export event bus for convenience
pub use event_bus::{
    event_bus, AppEvent, EventBus, EventBusConfig, EventCategory, EventFilter, SubscriptionId,
};

pub use types::{
    thread_safe, thread_safe_rw, CloseCallback, DoneCallback, LineCallback, OpenCallback,
    PortListCallback, RawCallback, SuccessCallback, ThreadSafe, ThreadSafeRw,
};
