//! Pend lists and the pend/post engine
//!
//! Every waitable object owns a [`PendList`]: a doubly linked list of TCBs
//! ordered by priority (ties in FIFO order). The engine in this module is
//! shared by all object kinds: blocking a task on an object, waking it on a
//! post, and cancelling the wait from the outside (abort, object deletion).
//!
//! A waiter that also carries the suspended dimension receives the post or
//! abort outcome but transitions to `Suspended`, not `Ready`.

use core::ptr::NonNull;

use crate::kernel;
use crate::sched;
use crate::task::OsTcb;
use crate::types::{OsMsgSize, OsObjQty, OsPendOn, OsPendStatus, OsTaskState, OsTick, OsTs};

/// Pend list for tasks waiting on a kernel object
#[derive(Debug)]
pub struct PendList {
    head: Option<NonNull<OsTcb>>,
    tail: Option<NonNull<OsTcb>>,
    entries: OsObjQty,
}

impl PendList {
    /// Create a new empty pend list
    pub const fn new() -> Self {
        PendList {
            head: None,
            tail: None,
            entries: 0,
        }
    }

    /// Initialize the pend list
    pub fn init(&mut self) {
        self.head = None;
        self.tail = None;
        self.entries = 0;
    }

    /// Check if list is empty
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Get head of list (the highest-priority, longest-waiting task)
    #[inline(always)]
    pub fn head(&self) -> Option<NonNull<OsTcb>> {
        self.head
    }

    /// Number of waiting tasks
    #[inline(always)]
    pub fn nbr_entries(&self) -> OsObjQty {
        self.entries
    }

    /// Insert a TCB in priority order; ties keep FIFO order.
    ///
    /// # Safety
    /// Caller must hold a critical section; `tcb` must not be in any
    /// pend list.
    pub fn insert_prio(&mut self, tcb: NonNull<OsTcb>) {
        let prio = unsafe { tcb.as_ref().prio };

        let mut current = self.head;
        let mut prev: Option<NonNull<OsTcb>> = None;

        while let Some(cur_ptr) = current {
            let cur_ref = unsafe { cur_ptr.as_ref() };
            if prio < cur_ref.prio {
                break;
            }
            prev = current;
            current = cur_ref.pend_next_ptr;
        }

        let tcb_mut = unsafe { &mut *tcb.as_ptr() };
        tcb_mut.pend_prev_ptr = prev;
        tcb_mut.pend_next_ptr = current;

        match prev {
            Some(p) => {
                unsafe { (*p.as_ptr()).pend_next_ptr = Some(tcb) };
            }
            None => {
                self.head = Some(tcb);
            }
        }

        match current {
            Some(c) => {
                unsafe { (*c.as_ptr()).pend_prev_ptr = Some(tcb) };
            }
            None => {
                self.tail = Some(tcb);
            }
        }

        self.entries += 1;
    }

    /// Remove a specific TCB from the list.
    ///
    /// # Safety
    /// Caller must hold a critical section; `tcb` must be in this list.
    pub fn remove(&mut self, tcb: NonNull<OsTcb>) {
        let tcb_ref = unsafe { &mut *tcb.as_ptr() };

        match tcb_ref.pend_prev_ptr {
            Some(prev) => {
                unsafe { (*prev.as_ptr()).pend_next_ptr = tcb_ref.pend_next_ptr };
            }
            None => {
                self.head = tcb_ref.pend_next_ptr;
            }
        }

        match tcb_ref.pend_next_ptr {
            Some(next) => {
                unsafe { (*next.as_ptr()).pend_prev_ptr = tcb_ref.pend_prev_ptr };
            }
            None => {
                self.tail = tcb_ref.pend_prev_ptr;
            }
        }

        tcb_ref.pend_prev_ptr = None;
        tcb_ref.pend_next_ptr = None;

        self.entries = self.entries.saturating_sub(1);
    }
}

impl Default for PendList {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl Send for PendList {}
unsafe impl Sync for PendList {}

// ============ Engine ============

/// Resolve the pend list a task is waiting on, if the object kind has one.
///
/// # Safety
/// Caller must hold a critical section. The object pointer stored in
/// `pend_on` must still be valid (guaranteed while the task is linked).
pub(crate) unsafe fn pend_list_of(tcb: &OsTcb) -> Option<&'static mut PendList> {
    match tcb.pend_on {
        #[cfg(feature = "sem")]
        OsPendOn::Sem(obj) => Some(unsafe { &mut (*obj.as_ptr()).pend_list }),
        #[cfg(feature = "mutex")]
        OsPendOn::Mutex(obj) => Some(unsafe { &mut (*obj.as_ptr()).pend_list }),
        #[cfg(feature = "flag")]
        OsPendOn::Flag(obj) => Some(unsafe { &mut (*obj.as_ptr()).pend_list }),
        #[cfg(feature = "q")]
        OsPendOn::Queue(obj) => Some(unsafe { &mut (*obj.as_ptr()).pend_list }),
        _ => None,
    }
}

/// Block the current task on an object (or on a task-private rendezvous
/// when `pend_on` carries no object).
///
/// Adds the task to the tick list when `timeout` is non-zero, removes it
/// from the ready list, and inserts it into the object's pend list in
/// priority order.
///
/// # Safety
/// Caller must hold a critical section; `tcb` must be the running task.
pub(crate) unsafe fn pend_block(tcb: NonNull<OsTcb>, pend_on: OsPendOn, timeout: OsTick) {
    let tcb_ref = unsafe { &mut *tcb.as_ptr() };

    tcb_ref.pend_on = pend_on;
    tcb_ref.pend_status = OsPendStatus::Ok;

    if timeout > 0 {
        let now = kernel::KERNEL.tick_get();
        tcb_ref.tick_remain = timeout;
        unsafe {
            kernel::tick_list().insert(tcb, now.wrapping_add(timeout), now);
        }
        tcb_ref.task_state = OsTaskState::PendTimeout;
    } else {
        tcb_ref.task_state = OsTaskState::Pend;
    }

    unsafe {
        sched::os_rdy_list_remove(tcb);
        if let Some(pend_list) = pend_list_of(tcb_ref) {
            pend_list.insert_prio(tcb);
        }
    }
}

/// Wake a pending task because a post made its resource available.
///
/// Stages the message in the waiter's TCB, detaches it from the pend and
/// tick lists, and readies it — or leaves it suspended when the waiter
/// carries the suspended dimension.
///
/// # Safety
/// Caller must hold a critical section; `tcb` must be pending.
pub(crate) unsafe fn post_wake(tcb: NonNull<OsTcb>, msg_ptr: *const (), msg_size: OsMsgSize, ts: OsTs) {
    unsafe { wake_common(tcb, msg_ptr, msg_size, ts, OsPendStatus::Ok) }
}

/// Cancel a task's pend from the outside.
///
/// `status` tells the waiter how it was readied: `Abort` for an explicit
/// pend abort, `Del` when the object it waited on was deleted. The staged
/// message is cleared.
///
/// # Safety
/// Caller must hold a critical section.
pub(crate) unsafe fn pend_abort_tcb(tcb: NonNull<OsTcb>, ts: OsTs, status: OsPendStatus) {
    unsafe { wake_common(tcb, core::ptr::null(), 0, ts, status) }
}

unsafe fn wake_common(
    tcb: NonNull<OsTcb>,
    msg_ptr: *const (),
    msg_size: OsMsgSize,
    ts: OsTs,
    status: OsPendStatus,
) {
    let tcb_ref = unsafe { &mut *tcb.as_ptr() };

    match tcb_ref.task_state {
        OsTaskState::Pend | OsTaskState::PendTimeout => {
            tcb_ref.msg_ptr = msg_ptr;
            tcb_ref.msg_size = msg_size;
            tcb_ref.ts = ts;
            unsafe {
                if let Some(pend_list) = pend_list_of(tcb_ref) {
                    pend_list.remove(tcb);
                }
                if tcb_ref.task_state == OsTaskState::PendTimeout {
                    kernel::tick_list().remove(tcb);
                }
                sched::os_rdy_list_insert(tcb);
            }
            tcb_ref.task_state = OsTaskState::Ready;
            tcb_ref.pend_status = status;
            tcb_ref.pend_on = OsPendOn::Nothing;
        }

        OsTaskState::PendSuspended | OsTaskState::PendTimeoutSuspended => {
            tcb_ref.msg_ptr = msg_ptr;
            tcb_ref.msg_size = msg_size;
            tcb_ref.ts = ts;
            unsafe {
                if let Some(pend_list) = pend_list_of(tcb_ref) {
                    pend_list.remove(tcb);
                }
                if tcb_ref.task_state == OsTaskState::PendTimeoutSuspended {
                    kernel::tick_list().remove(tcb);
                }
            }
            tcb_ref.task_state = OsTaskState::Suspended;
            tcb_ref.pend_status = status;
            tcb_ref.pend_on = OsPendOn::Nothing;
        }

        // Not pending: nothing to cancel or deliver.
        _ => {}
    }
}

/// Re-insert a task into the pend list it occupies after its priority
/// changed, so the list stays priority-ordered.
///
/// # Safety
/// Caller must hold a critical section.
pub(crate) unsafe fn pend_list_change_prio(tcb: NonNull<OsTcb>) {
    unsafe {
        if let Some(pend_list) = pend_list_of(tcb.as_ref()) {
            pend_list.remove(tcb);
            pend_list.insert_prio(tcb);
        }
    }
}
