//! Task Control Block (TCB) definition
//!
//! The TCB contains all the information needed to manage a task. It is
//! allocated by the task's creator and lives as long as the task exists.

use core::ptr::NonNull;

use crate::config::CFG_TASK_REG_TBL_SIZE;
use crate::msg::OsMsgQ;
#[cfg(feature = "mutex")]
use crate::sync::mutex::OsMutex;
use crate::task::OsTaskFn;
use crate::types::{
    OsFlags, OsMsgSize, OsNestingCtr, OsOpt, OsPendOn, OsPendStatus, OsPrio, OsReg, OsSemCtr,
    OsStkElement, OsTaskState, OsTick, OsTs,
};

/// Task Control Block
#[repr(C)]
pub struct OsTcb {
    // ============ Stack pointer ============
    /// Current stack pointer, written by the port on switch-out
    pub stk_ptr: *mut OsStkElement,

    // ============ Stack information ============
    /// Base of stack (lowest address)
    pub stk_base: *mut OsStkElement,
    /// Stack limit watermark pointer
    pub stk_limit: *mut OsStkElement,
    /// Stack size in words
    pub stk_size: usize,

    // ============ Task identification ============
    /// Task name
    pub name: &'static str,

    // ============ Ready list links ============
    /// Next TCB in ready list
    pub next_ptr: Option<NonNull<OsTcb>>,
    /// Previous TCB in ready list
    pub prev_ptr: Option<NonNull<OsTcb>>,

    // ============ Pend list links ============
    /// Next TCB in pend list
    pub pend_next_ptr: Option<NonNull<OsTcb>>,
    /// Previous TCB in pend list
    pub pend_prev_ptr: Option<NonNull<OsTcb>>,
    /// What the task is pending on, carrying the object where one exists
    pub pend_on: OsPendOn,
    /// Result of the pend operation, set by the waker
    pub pend_status: OsPendStatus,

    // ============ Tick list links ============
    /// Next TCB in tick list
    pub tick_next_ptr: Option<NonNull<OsTcb>>,
    /// Previous TCB in tick list
    pub tick_prev_ptr: Option<NonNull<OsTcb>>,
    /// Absolute tick at which the delay/timeout expires
    pub tick_deadline: OsTick,
    /// Relative ticks requested by the last delay/timeout
    pub tick_remain: OsTick,
    /// Accumulator for drift-free periodic delays
    pub tick_ctr_prev: OsTick,

    // ============ Priority ============
    /// Current scheduling priority
    pub prio: OsPrio,
    /// Priority when not inheriting through a mutex
    pub base_prio: OsPrio,

    // ============ State ============
    /// Current task state
    pub task_state: OsTaskState,
    /// Task options
    pub opt: OsOpt,

    // ============ Suspend ============
    /// Suspend nesting counter
    pub suspend_ctr: OsNestingCtr,

    // ============ Time slicing ============
    /// Time quanta for this task (0 = use the round-robin default)
    pub time_quanta: OsTick,
    /// Remaining time quanta
    pub time_quanta_ctr: OsTick,

    // ============ Task semaphore ============
    /// Task-private signal counter
    pub sem_ctr: OsSemCtr,

    // ============ Event flags ============
    /// Flags being waited for
    pub flags_pend: OsFlags,
    /// Flags that made the task ready
    pub flags_rdy: OsFlags,
    /// Flag wait options
    pub flags_opt: OsOpt,

    // ============ Message staging ============
    /// Message pointer deposited by the poster
    pub msg_ptr: *const (),
    /// Message size deposited by the poster
    pub msg_size: OsMsgSize,
    /// Timestamp of the post that readied this task
    pub ts: OsTs,

    // ============ Task mailbox ============
    /// Task-private message queue
    pub msg_q: OsMsgQ,

    // ============ Mutex priority inheritance ============
    /// Head of the list of mutexes currently owned by this task
    #[cfg(feature = "mutex")]
    pub mutex_grp_head: Option<NonNull<OsMutex>>,

    // ============ Task registers ============
    /// Software registers
    pub reg_tbl: [OsReg; CFG_TASK_REG_TBL_SIZE],

    // ============ Task entry point ============
    /// Task entry function
    pub task_entry: Option<OsTaskFn>,
    /// Task argument
    pub task_entry_arg: *mut (),

    // ============ Extension pointer ============
    /// User-defined extension data
    pub ext_ptr: *mut (),
}

impl OsTcb {
    /// Create a new, uninitialized TCB
    pub const fn new() -> Self {
        OsTcb {
            stk_ptr: core::ptr::null_mut(),
            stk_base: core::ptr::null_mut(),
            stk_limit: core::ptr::null_mut(),
            stk_size: 0,

            name: "",

            next_ptr: None,
            prev_ptr: None,

            pend_next_ptr: None,
            pend_prev_ptr: None,
            pend_on: OsPendOn::Nothing,
            pend_status: OsPendStatus::Ok,

            tick_next_ptr: None,
            tick_prev_ptr: None,
            tick_deadline: 0,
            tick_remain: 0,
            tick_ctr_prev: 0,

            prio: 0,
            base_prio: 0,

            task_state: OsTaskState::Ready,
            opt: 0,

            suspend_ctr: 0,

            time_quanta: 0,
            time_quanta_ctr: 0,

            sem_ctr: 0,

            flags_pend: 0,
            flags_rdy: 0,
            flags_opt: 0,

            msg_ptr: core::ptr::null(),
            msg_size: 0,
            ts: 0,

            msg_q: OsMsgQ::new(0),

            #[cfg(feature = "mutex")]
            mutex_grp_head: None,

            reg_tbl: [0; CFG_TASK_REG_TBL_SIZE],

            task_entry: None,
            task_entry_arg: core::ptr::null_mut(),

            ext_ptr: core::ptr::null_mut(),
        }
    }

    /// Initialize TCB to default values
    pub fn init(&mut self) {
        *self = Self::new();
    }

    /// Check if task is ready to run
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.task_state == OsTaskState::Ready
    }

    /// Check if task is blocked on an object or task-private rendezvous
    #[inline]
    pub fn is_pending(&self) -> bool {
        self.task_state.is_pending()
    }

    /// Check if task carries the suspended dimension
    #[inline]
    pub fn is_suspended(&self) -> bool {
        self.task_state.is_suspended()
    }

    /// Check if task is delayed
    #[inline]
    pub fn is_delayed(&self) -> bool {
        self.task_state.is_delayed()
    }
}

impl Default for OsTcb {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl Send for OsTcb {}
unsafe impl Sync for OsTcb {}
