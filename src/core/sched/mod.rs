//! Scheduler module
//!
//! Priority-based preemptive scheduler with round-robin for same priority.

mod rdy_list;

pub use rdy_list::ReadyList;

use core::ptr::NonNull;

use crate::config::{CFG_PRIO_IDLE, CFG_STK_REDZONE_EN};
use crate::critical::{critical_section, CriticalSection};
use crate::error::{OsError, OsResult};
use crate::hooks;
use crate::kernel;
use crate::task::OsTcb;
use crate::types::OsTick;

/// Main scheduling point
///
/// Determines the highest priority ready task and triggers a task-level
/// context switch if it differs from the running task. No-op while in an
/// ISR or while the scheduler is locked; the ISR-exit path performs the
/// deferred switch instead.
pub fn os_sched() {
    if !kernel::KERNEL.is_running() {
        return;
    }

    if kernel::KERNEL.int_nesting() > 0 {
        return;
    }

    if kernel::KERNEL.sched_lock_nesting() > 0 {
        return;
    }

    let _cs = CriticalSection::enter();

    let high_prio = unsafe { kernel::prio_table().get_highest() };

    unsafe {
        if let Some(high_rdy) = kernel::rdy_list(high_prio).head() {
            if Some(high_rdy) != kernel::tcb_cur_ptr() {
                if CFG_STK_REDZONE_EN {
                    if let Some(cur) = kernel::tcb_cur_ptr() {
                        if !crate::task::stack::redzone_chk(cur.as_ref()) {
                            hooks::redzone_hit_hook(Some(cur.as_ref()));
                        }
                    }
                }
                kernel::set_prio_high_rdy(high_prio);
                kernel::set_tcb_high_rdy_ptr(Some(high_rdy));
                crate::port::os_ctx_sw();
            }
        }
    }
}

/// Round-robin bookkeeping, run once per kernel tick
///
/// Decrements the running task's quanta counter and, when it reaches zero
/// with more than one task at the priority, rotates the bucket and reloads
/// the new head's counter. Never runs while the scheduler is locked, and
/// never fires on a post.
pub(crate) fn os_sched_round_robin() {
    if !kernel::KERNEL.round_robin_en() {
        return;
    }

    if !kernel::KERNEL.is_running() {
        return;
    }

    critical_section(|_cs| {
        let prio_cur = unsafe { kernel::prio_cur() };
        let rdy_list = unsafe { kernel::rdy_list(prio_cur) };

        let head = match rdy_list.head() {
            Some(head) => head,
            None => return,
        };

        let tcb = unsafe { &mut *head.as_ptr() };
        if tcb.prio == CFG_PRIO_IDLE {
            return;
        }

        if tcb.time_quanta_ctr > 0 {
            tcb.time_quanta_ctr -= 1;
        }

        if tcb.time_quanta_ctr > 0 {
            return;
        }

        if rdy_list.head() == rdy_list.tail() {
            // Alone at this priority, nothing to rotate
            tcb.time_quanta_ctr = effective_quanta(tcb.time_quanta);
            return;
        }

        if kernel::KERNEL.sched_lock_nesting() > 0 {
            return;
        }

        rdy_list.move_head_to_tail();

        if let Some(new_head) = rdy_list.head() {
            let new_tcb = unsafe { &mut *new_head.as_ptr() };
            new_tcb.time_quanta_ctr = effective_quanta(new_tcb.time_quanta);
        }
    });
}

/// Configure round-robin scheduling
///
/// `dflt_quanta == 0` restores the compile-time default.
pub fn os_sched_round_robin_cfg(en: bool, dflt_quanta: OsTick) {
    critical_section(|_cs| {
        kernel::KERNEL.set_round_robin(en, dflt_quanta);
    });
}

/// Give up the remainder of the current time quanta
///
/// Moves the caller behind the other ready tasks at its priority.
pub fn os_sched_round_robin_yield() -> OsResult<()> {
    if kernel::KERNEL.int_nesting() > 0 {
        return Err(OsError::YieldIsr);
    }

    if !kernel::KERNEL.round_robin_en() {
        return Err(OsError::SchedRoundRobinDisabled);
    }

    if kernel::KERNEL.sched_lock_nesting() > 0 {
        return Err(OsError::SchedLocked);
    }

    {
        let _cs = CriticalSection::enter();

        let prio_cur = unsafe { kernel::prio_cur() };
        let rdy_list = unsafe { kernel::rdy_list(prio_cur) };

        if rdy_list.head() == rdy_list.tail() {
            return Err(OsError::SchedRoundRobin1);
        }

        rdy_list.move_head_to_tail();

        if let Some(new_head) = rdy_list.head() {
            let new_tcb = unsafe { &mut *new_head.as_ptr() };
            new_tcb.time_quanta_ctr = effective_quanta(new_tcb.time_quanta);
        }
    }

    os_sched();
    Ok(())
}

#[inline]
fn effective_quanta(own: OsTick) -> OsTick {
    if own == 0 {
        kernel::KERNEL.round_robin_dflt_quanta()
    } else {
        own
    }
}

/// Make a task ready
///
/// A task readied at the running task's priority goes to the tail of the
/// bucket (FIFO behind the running task); at any other priority it goes to
/// the head.
pub(crate) unsafe fn os_rdy_list_insert(tcb: NonNull<OsTcb>) {
    let prio = unsafe { tcb.as_ref().prio };

    unsafe {
        kernel::prio_table().insert(prio);
        if prio == kernel::prio_cur() {
            kernel::rdy_list(prio).insert_tail(tcb);
        } else {
            kernel::rdy_list(prio).insert_head(tcb);
        }
    }
}

/// Make a task ready at the tail of its bucket
pub(crate) unsafe fn os_rdy_list_insert_tail(tcb: NonNull<OsTcb>) {
    let prio = unsafe { tcb.as_ref().prio };

    unsafe {
        kernel::prio_table().insert(prio);
        kernel::rdy_list(prio).insert_tail(tcb);
    }
}

/// Make a task ready at the head of its bucket
pub(crate) unsafe fn os_rdy_list_insert_head(tcb: NonNull<OsTcb>) {
    let prio = unsafe { tcb.as_ref().prio };

    unsafe {
        kernel::prio_table().insert(prio);
        kernel::rdy_list(prio).insert_head(tcb);
    }
}

/// Remove a task from the ready list
pub(crate) unsafe fn os_rdy_list_remove(tcb: NonNull<OsTcb>) {
    let prio = unsafe { tcb.as_ref().prio };

    unsafe {
        let rdy_list = kernel::rdy_list(prio);
        rdy_list.remove(tcb);

        if rdy_list.is_empty() {
            kernel::prio_table().remove(prio);
        }
    }
}
