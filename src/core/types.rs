//! Core type definitions
//!
//! These types provide strong typing for kernel primitives.

use core::ptr::NonNull;

#[cfg(feature = "flag")]
use crate::sync::flag::OsFlagGrp;
#[cfg(feature = "mutex")]
use crate::sync::mutex::OsMutex;
#[cfg(feature = "q")]
use crate::sync::q::OsQ;
#[cfg(feature = "sem")]
use crate::sync::sem::OsSem;

/// Task priority (0 = highest priority)
pub type OsPrio = u8;

/// Tick counter type
pub type OsTick = u32;

/// Semaphore counter type
pub type OsSemCtr = u32;

/// Nesting counter
pub type OsNestingCtr = u8;

/// Option flags for API calls
pub type OsOpt = u16;

/// Message size type
pub type OsMsgSize = usize;

/// Object quantity type
pub type OsObjQty = u16;

/// Stack element type
pub type OsStkElement = u32;

/// Event flags type
pub type OsFlags = u32;

/// Timestamp type (port timestamp counter units)
pub type OsTs = u32;

/// Task software register type
pub type OsReg = u32;

/// Task software register identifier
pub type OsRegId = u8;

/// Task state
///
/// The delayed and suspended dimensions are orthogonal; a pend can also
/// carry a timeout dimension. `Deleted` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OsTaskState {
    /// Task is ready to run
    Ready = 0,
    /// Task is delayed
    Delayed = 1,
    /// Task is pending on a kernel object
    Pend = 2,
    /// Task is pending with timeout
    PendTimeout = 3,
    /// Task is suspended
    Suspended = 4,
    /// Task is delayed and suspended
    DelayedSuspended = 5,
    /// Task is pending and suspended
    PendSuspended = 6,
    /// Task is pending with timeout and suspended
    PendTimeoutSuspended = 7,
    /// Task has been deleted
    Deleted = 8,
}

impl OsTaskState {
    /// Add the suspended dimension
    #[inline]
    pub fn suspended(self) -> OsTaskState {
        match self {
            OsTaskState::Ready => OsTaskState::Suspended,
            OsTaskState::Delayed => OsTaskState::DelayedSuspended,
            OsTaskState::Pend => OsTaskState::PendSuspended,
            OsTaskState::PendTimeout => OsTaskState::PendTimeoutSuspended,
            other => other,
        }
    }

    /// Drop the suspended dimension
    #[inline]
    pub fn resumed(self) -> OsTaskState {
        match self {
            OsTaskState::Suspended => OsTaskState::Ready,
            OsTaskState::DelayedSuspended => OsTaskState::Delayed,
            OsTaskState::PendSuspended => OsTaskState::Pend,
            OsTaskState::PendTimeoutSuspended => OsTaskState::PendTimeout,
            other => other,
        }
    }

    /// Task is blocked on an object or a task-private rendezvous
    #[inline]
    pub fn is_pending(self) -> bool {
        matches!(
            self,
            OsTaskState::Pend
                | OsTaskState::PendTimeout
                | OsTaskState::PendSuspended
                | OsTaskState::PendTimeoutSuspended
        )
    }

    /// Task carries the suspended dimension
    #[inline]
    pub fn is_suspended(self) -> bool {
        matches!(
            self,
            OsTaskState::Suspended
                | OsTaskState::DelayedSuspended
                | OsTaskState::PendSuspended
                | OsTaskState::PendTimeoutSuspended
        )
    }

    /// Task is on the tick list for a pure delay
    #[inline]
    pub fn is_delayed(self) -> bool {
        matches!(self, OsTaskState::Delayed | OsTaskState::DelayedSuspended)
    }

    /// Task is on the tick list for any reason (delay or pend timeout)
    #[inline]
    pub fn is_on_tick_list(self) -> bool {
        matches!(
            self,
            OsTaskState::Delayed
                | OsTaskState::DelayedSuspended
                | OsTaskState::PendTimeout
                | OsTaskState::PendTimeoutSuspended
        )
    }
}

/// What the task is pending on
///
/// Pend-list-carrying variants hold the object so the kernel can find the
/// pend list (and, for mutexes, the owner) from the TCB alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsPendOn {
    Nothing,
    #[cfg(feature = "sem")]
    Sem(NonNull<OsSem>),
    #[cfg(feature = "mutex")]
    Mutex(NonNull<OsMutex>),
    #[cfg(feature = "flag")]
    Flag(NonNull<OsFlagGrp>),
    #[cfg(feature = "q")]
    Queue(NonNull<OsQ>),
    TaskSem,
    #[cfg(feature = "task-q")]
    TaskQueue,
}

impl OsPendOn {
    #[inline]
    pub fn is_nothing(&self) -> bool {
        matches!(self, OsPendOn::Nothing)
    }
}

/// Pend outcome, set by the waker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OsPendStatus {
    /// Pend succeeded
    Ok = 0,
    /// Pend was aborted
    Abort = 1,
    /// Object was deleted while pending
    Del = 2,
    /// Timeout occurred
    Timeout = 3,
}

/// Kernel object type marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum OsObjType {
    None = 0,
    Flag = 0x464C4147,  // 'FLAG'
    Mutex = 0x4D555458, // 'MUTX'
    Queue = 0x51554555, // 'QUEU'
    Sem = 0x53454D41,   // 'SEMA'
    Task = 0x5441534B,  // 'TASK'
}

// ============ Option flags ============

/// API option flags
pub mod opt {
    use super::OsOpt;

    pub const NONE: OsOpt = 0x0000;

    // Delete options
    pub const DEL_NO_PEND: OsOpt = 0x0000;
    pub const DEL_ALWAYS: OsOpt = 0x0001;

    // Pend options
    pub const PEND_BLOCKING: OsOpt = 0x0000;
    pub const PEND_NON_BLOCKING: OsOpt = 0x8000;

    // Pend abort options
    pub const PEND_ABORT_1: OsOpt = 0x0000;
    pub const PEND_ABORT_ALL: OsOpt = 0x0100;

    // Post options
    pub const POST_FIFO: OsOpt = 0x0000;
    pub const POST_LIFO: OsOpt = 0x0010;
    pub const POST_ALL: OsOpt = 0x0200;
    pub const POST_NO_SCHED: OsOpt = 0x8000;

    // Task options
    pub const TASK_NONE: OsOpt = 0x0000;
    pub const TASK_STK_CHK: OsOpt = 0x0001;
    pub const TASK_STK_CLR: OsOpt = 0x0002;
    pub const TASK_SAVE_FP: OsOpt = 0x0004;

    // Flag pend options
    pub const FLAG_CLR_ALL: OsOpt = 0x0001;
    pub const FLAG_CLR_ANY: OsOpt = 0x0002;
    pub const FLAG_SET_ALL: OsOpt = 0x0004;
    pub const FLAG_SET_ANY: OsOpt = 0x0008;
    pub const FLAG_CONSUME: OsOpt = 0x0100;

    // Flag post options
    pub const FLAG_POST_SET: OsOpt = 0x0000;
    pub const FLAG_POST_CLR: OsOpt = 0x0001;

    // Time delay options
    pub const TIME_DLY: OsOpt = 0x0000;
    pub const TIME_MATCH: OsOpt = 0x0001;
    pub const TIME_TIMEOUT: OsOpt = 0x0002;
    pub const TIME_PERIODIC: OsOpt = 0x0004;
    pub const TIME_HMSM_STRICT: OsOpt = 0x0000;
    pub const TIME_HMSM_NON_STRICT: OsOpt = 0x0008;
}
