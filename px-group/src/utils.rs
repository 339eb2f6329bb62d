//! Something useful for development.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use px_data::LogicalTime;

/// Locks `m`, ignoring poisoning: every critical section leaves the data consistent.
#[inline]
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Milliseconds since `start`.
#[inline]
pub(crate) fn elapsed_ms(start: &Instant) -> LogicalTime {
    start.elapsed().as_millis() as LogicalTime
}
