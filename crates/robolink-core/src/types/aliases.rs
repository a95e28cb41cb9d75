//! Type aliases for commonly used complex types.
//!
//! Shared-state wrappers and the callback shapes that make up the
//! transport contract. Callbacks are thread-safe because transports
//! complete their work on tokio tasks.

use crate::error::Result;
use crate::port::PortDescriptor;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

// =============================================================================
// THREAD-SAFE SHARED TYPES (Arc<Mutex<T>> / Arc<RwLock<T>>)
// =============================================================================

/// A thread-safe, mutex-protected wrapper for cross-thread sharing.
///
/// Uses `parking_lot::Mutex` for better performance than `std::sync::Mutex`.
pub type ThreadSafe<T> = Arc<Mutex<T>>;

/// A thread-safe reader-writer lock wrapper for read-heavy workloads.
///
/// Used for the network roster, which is rewritten once per probe sweep
/// and read on every enumeration.
pub type ThreadSafeRw<T> = Arc<RwLock<T>>;

// =============================================================================
// CALLBACK TYPES
// =============================================================================

/// Receives each newline-delimited message from the connected device.
///
/// Shared because a transport may hand it to a reader task while the
/// coordinator keeps a copy.
pub type LineCallback = Arc<dyn Fn(String) + Send + Sync>;

/// Receives raw byte chunks as they arrive from a serial device.
pub type RawCallback = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Fired once when a connection session ends.
pub type CloseCallback = Box<dyn FnOnce() + Send>;

/// Fired once with the connected path when a connect succeeds.
pub type SuccessCallback = Box<dyn FnOnce(String) + Send>;

/// Completion of a transport open: the resolved path, or why it failed.
pub type OpenCallback = Box<dyn FnOnce(Result<String>) + Send>;

/// Completion notification with no payload.
pub type DoneCallback = Box<dyn FnOnce() + Send>;

/// Receives the merged result of a port enumeration.
pub type PortListCallback = Box<dyn FnOnce(Vec<PortDescriptor>) + Send>;

// =============================================================================
// CONSTRUCTOR HELPERS
// =============================================================================

/// Create a new `ThreadSafe<T>` from a value.
pub fn thread_safe<T>(value: T) -> ThreadSafe<T> {
    Arc::new(Mutex::new(value))
}

/// Create a new `ThreadSafeRw<T>` from a value.
pub fn thread_safe_rw<T>(value: T) -> ThreadSafeRw<T> {
    Arc::new(RwLock::new(value))
}
