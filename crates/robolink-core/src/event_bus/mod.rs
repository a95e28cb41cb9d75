//! Application event bus
//!
//! The coordinator and the transports publish [`AppEvent`]s here; observers
//! (the CLI, a UI, plugins) subscribe without the publishers knowing them.
//! Subscribers either register a synchronous handler with a filter or take
//! a broadcast receiver and poll it from async code.
//!
//! ```rust,ignore
//! use robolink_core::event_bus::{event_bus, EventFilter};
//!
//! let id = event_bus().subscribe(EventFilter::Port("/dev/ttyUSB0".into()), |event| {
//!     println!("{}", event.description());
//! });
//! event_bus().unsubscribe(id);
//! ```

mod bus;
mod events;

pub use bus::*;
pub use events::*;
