//! Synchronization primitives
//!
//! Semaphores, mutexes, event flag groups, and message queues.

#[cfg(feature = "sem")]
pub mod sem;

#[cfg(feature = "mutex")]
pub mod mutex;

#[cfg(feature = "flag")]
pub mod flag;

#[cfg(feature = "q")]
pub mod q;
