//! kestrel — a fixed-priority preemptive real-time kernel in Rust
//!
//! A real-time operating system kernel providing:
//! - Priority-based preemptive scheduling with round-robin time slicing
//! - Synchronization primitives (semaphores, mutexes, event flags, queues)
//! - Per-task signal semaphores and private mailboxes
//! - Tick-based time management with timeouts on every blocking call
//! - Context switching for ARM Cortex-M

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

// ============ Critical Section ============

#[cfg(target_arch = "arm")]
mod cs_impl {
    use cortex_m::interrupt;
    use cortex_m::register::primask;
    use critical_section::{set_impl, Impl, RawRestoreState};

    struct SingleCoreCriticalSection;
    set_impl!(SingleCoreCriticalSection);

    unsafe impl Impl for SingleCoreCriticalSection {
        unsafe fn acquire() -> RawRestoreState {
            let was_active = primask::read().is_active();
            interrupt::disable();
            was_active
        }

        unsafe fn release(was_active: RawRestoreState) {
            if was_active {
                unsafe { interrupt::enable() }
            }
        }
    }
}

// ============ Modules ============

pub mod log;
mod lang_items;

pub mod core;
pub mod port;
pub mod sync;

// ============ Re-exports ============

pub use crate::core::config;
pub use crate::core::config::*;
pub use crate::core::critical;
pub use crate::core::error;
pub use crate::core::error::{OsError, OsResult};
pub use crate::core::hooks;
pub use crate::core::hooks::OsHooks;
pub use crate::core::kernel;
pub use crate::core::kernel::{os_init, os_start};
pub use crate::core::msg;
pub use crate::core::pend;
pub use crate::core::prio;
pub use crate::core::sched;
pub use crate::core::task;
pub use crate::core::task::{os_task_create, OsTcb};
pub use crate::core::time;
pub use crate::core::types;
pub use crate::core::types::*;

#[cfg(feature = "sem")]
pub use sync::sem;
#[cfg(feature = "mutex")]
pub use sync::mutex;
#[cfg(feature = "flag")]
pub use sync::flag;
#[cfg(feature = "q")]
pub use sync::q;
