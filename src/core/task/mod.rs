//! Task management module
//!
//! Task creation, deletion, priority changes, suspend/resume, stack
//! checking, software registers, and the task-private signal semaphore
//! and mailbox.

pub(crate) mod stack;
mod tcb;

pub use tcb::OsTcb;

use core::ptr::NonNull;
use core::sync::atomic::{AtomicU8, Ordering};

use crate::config::{
    CFG_PRIO_IDLE, CFG_PRIO_MAX, CFG_STK_REDZONE_EN, CFG_STK_SIZE_MIN, CFG_TASK_REG_TBL_SIZE,
    CFG_TICK_EN,
};
use crate::critical::CriticalSection;
use crate::error::{OsError, OsResult};
use crate::hooks;
use crate::kernel;
use crate::pend;
use crate::sched;
use crate::types::{
    opt, OsMsgSize, OsObjQty, OsOpt, OsPendOn, OsPendStatus, OsPrio, OsReg, OsRegId, OsSemCtr,
    OsStkElement, OsTaskState, OsTick,
};

/// Task entry point function type
pub type OsTaskFn = fn(*mut ()) -> !;

#[inline]
fn called_from_isr() -> bool {
    kernel::KERNEL.int_nesting() > 0
}

// ============ Creation ============

/// Create a new task from raw parts
///
/// # Arguments
/// * `tcb` - Pointer to the Task Control Block
/// * `name` - Task name for debugging
/// * `task_fn` - Task entry point function
/// * `arg` - Argument to pass to task function
/// * `prio` - Task priority (the idle priority is reserved)
/// * `stk_base` - Pointer to base of stack array
/// * `stk_limit` - Watermark position in words from the base
/// * `stk_size` - Stack size in words
/// * `q_size` - Capacity of the task's private mailbox
/// * `time_quanta` - Round-robin quanta (0 = use the default)
/// * `task_opt` - Task options
#[allow(clippy::too_many_arguments)]
unsafe fn os_task_create_raw(
    tcb: *mut OsTcb,
    name: &'static str,
    task_fn: OsTaskFn,
    arg: *mut (),
    prio: OsPrio,
    stk_base: *mut OsStkElement,
    stk_limit: usize,
    stk_size: usize,
    q_size: OsObjQty,
    time_quanta: OsTick,
    task_opt: OsOpt,
) -> OsResult<()> {
    if kernel::KERNEL.safety_critical_started() {
        return Err(OsError::IllegalCreateRunTime);
    }

    if called_from_isr() {
        return Err(OsError::TaskCreateIsr);
    }

    if tcb.is_null() {
        return Err(OsError::TcbInvalid);
    }

    if stk_base.is_null() {
        return Err(OsError::StkInvalid);
    }

    if stk_size < CFG_STK_SIZE_MIN {
        return Err(OsError::StkSizeInvalid);
    }

    if stk_limit >= stk_size {
        return Err(OsError::StkLimitInvalid);
    }

    if prio as usize >= CFG_PRIO_MAX {
        return Err(OsError::PrioInvalid);
    }

    if prio == CFG_PRIO_IDLE {
        // Reserved for the idle task
        return Err(OsError::PrioInvalid);
    }

    let _cs = CriticalSection::enter();

    unsafe {
        os_task_init_common(
            tcb, name, task_fn, arg, prio, stk_base, stk_limit, stk_size, q_size, time_quanta,
            task_opt,
        );
    }

    hooks::task_create_hook(unsafe { &*tcb });
    kernel::KERNEL.task_qty_inc();

    drop(_cs);

    if kernel::KERNEL.is_running() {
        sched::os_sched();
    }

    Ok(())
}

/// Shared TCB/stack setup for application and internal task creation.
///
/// # Safety
/// Caller must hold a critical section and have validated every argument.
unsafe fn os_task_init_common(
    tcb: *mut OsTcb,
    name: &'static str,
    task_fn: OsTaskFn,
    arg: *mut (),
    prio: OsPrio,
    stk_base: *mut OsStkElement,
    stk_limit: usize,
    stk_size: usize,
    q_size: OsObjQty,
    time_quanta: OsTick,
    task_opt: OsOpt,
) {
    let tcb_ref = unsafe { &mut *tcb };
    tcb_ref.init();

    tcb_ref.name = name;
    tcb_ref.prio = prio;
    tcb_ref.base_prio = prio;
    tcb_ref.time_quanta = time_quanta;
    tcb_ref.time_quanta_ctr = if time_quanta == 0 {
        kernel::KERNEL.round_robin_dflt_quanta()
    } else {
        time_quanta
    };
    tcb_ref.opt = task_opt;
    tcb_ref.task_state = OsTaskState::Ready;

    if task_opt & opt::TASK_STK_CLR != 0 {
        for i in 0..stk_size {
            unsafe {
                stk_base.add(i).write_volatile(0);
            }
        }
    }

    if CFG_STK_REDZONE_EN {
        unsafe {
            stack::redzone_init(stk_base);
        }
    }

    let stk_ptr = unsafe { crate::port::os_task_stk_init(task_fn, arg, stk_base, stk_size, task_opt) };
    tcb_ref.stk_ptr = stk_ptr;
    tcb_ref.stk_base = stk_base;
    tcb_ref.stk_size = stk_size;
    tcb_ref.stk_limit = unsafe { stk_base.add(stk_limit) };

    tcb_ref.msg_q.init(q_size);

    tcb_ref.task_entry = Some(task_fn);
    tcb_ref.task_entry_arg = arg;

    let tcb_nonnull = unsafe { NonNull::new_unchecked(tcb) };
    unsafe {
        sched::os_rdy_list_insert_tail(tcb_nonnull);
    }
}

/// Create a new task using static references
///
/// This is the recommended way to create tasks.
///
/// # Example
/// ```ignore
/// static mut TASK_TCB: OsTcb = OsTcb::new();
/// static mut TASK_STK: [OsStkElement; 256] = [0; 256];
///
/// fn my_task(_: *mut ()) -> ! {
///     loop { /* ... */ }
/// }
///
/// // In main:
/// os_task_create(
///     unsafe { &mut TASK_TCB },
///     unsafe { &mut TASK_STK },
///     "MyTask",
///     my_task,
///     5,
/// ).expect("Task creation failed");
/// ```
pub fn os_task_create(
    tcb: &'static mut OsTcb,
    stack: &'static mut [OsStkElement],
    name: &'static str,
    task_fn: OsTaskFn,
    prio: OsPrio,
) -> OsResult<()> {
    let stk_size = stack.len();
    unsafe {
        os_task_create_raw(
            tcb as *mut OsTcb,
            name,
            task_fn,
            core::ptr::null_mut(),
            prio,
            stack.as_mut_ptr(),
            stk_size / 10,
            stk_size,
            0,
            0,
            opt::TASK_STK_CHK | opt::TASK_STK_CLR,
        )
    }
}

/// Create a new task with full control over the extended parameters
#[allow(clippy::too_many_arguments)]
pub fn os_task_create_ext(
    tcb: &'static mut OsTcb,
    stack: &'static mut [OsStkElement],
    name: &'static str,
    task_fn: OsTaskFn,
    arg: *mut (),
    prio: OsPrio,
    stk_limit: usize,
    q_size: OsObjQty,
    time_quanta: OsTick,
    task_opt: OsOpt,
) -> OsResult<()> {
    let stk_size = stack.len();
    unsafe {
        os_task_create_raw(
            tcb as *mut OsTcb,
            name,
            task_fn,
            arg,
            prio,
            stack.as_mut_ptr(),
            stk_limit,
            stk_size,
            q_size,
            time_quanta,
            task_opt,
        )
    }
}

/// Internal task creation for kernel use (bypasses the idle-priority and
/// safety-critical checks)
#[doc(hidden)]
#[allow(clippy::too_many_arguments)]
pub unsafe fn os_task_create_internal(
    tcb: *mut OsTcb,
    name: &'static str,
    task_fn: OsTaskFn,
    arg: *mut (),
    prio: OsPrio,
    stk_base: *mut OsStkElement,
    stk_size: usize,
    q_size: OsObjQty,
    time_quanta: OsTick,
    task_opt: OsOpt,
) -> OsResult<()> {
    if tcb.is_null() || stk_base.is_null() {
        return Err(OsError::TcbInvalid);
    }

    unsafe {
        os_task_init_common(
            tcb,
            name,
            task_fn,
            arg,
            prio,
            stk_base,
            stk_size / 10,
            stk_size,
            q_size,
            time_quanta,
            task_opt,
        );
    }

    kernel::KERNEL.task_qty_inc();

    Ok(())
}

// ============ Deletion ============

/// Delete a task
///
/// Detaches the task from every kernel structure it occupies, releases
/// the mutexes it owns (each is handed to its highest-priority waiter),
/// flushes its mailbox, and marks the TCB terminally deleted. `None`
/// deletes the calling task.
pub fn os_task_del(tcb: Option<NonNull<OsTcb>>) -> OsResult<()> {
    if kernel::KERNEL.safety_critical_started() {
        return Err(OsError::IllegalDelRunTime);
    }

    if !kernel::KERNEL.is_running() {
        return Err(OsError::OsNotRunning);
    }

    if called_from_isr() {
        return Err(OsError::TaskDelIsr);
    }

    let is_current;
    {
        let _cs = CriticalSection::enter();

        let tcb_ptr = match tcb {
            Some(ptr) => ptr,
            None => unsafe { kernel::tcb_cur_ptr() }.ok_or(OsError::TcbInvalid)?,
        };

        let tcb_ref = unsafe { &mut *tcb_ptr.as_ptr() };

        if tcb_ref.prio == CFG_PRIO_IDLE {
            return Err(OsError::TaskDelIdle);
        }

        match tcb_ref.task_state {
            OsTaskState::Ready => unsafe {
                sched::os_rdy_list_remove(tcb_ptr);
            },
            OsTaskState::Suspended => {}
            OsTaskState::Delayed | OsTaskState::DelayedSuspended => unsafe {
                kernel::tick_list().remove(tcb_ptr);
            },
            OsTaskState::Pend
            | OsTaskState::PendSuspended
            | OsTaskState::PendTimeout
            | OsTaskState::PendTimeoutSuspended => unsafe {
                if tcb_ref.task_state == OsTaskState::PendTimeout
                    || tcb_ref.task_state == OsTaskState::PendTimeoutSuspended
                {
                    kernel::tick_list().remove(tcb_ptr);
                }
                #[cfg(feature = "mutex")]
                disinherit_on_waiter_exit(tcb_ref);
                if let Some(pend_list) = pend::pend_list_of(tcb_ref) {
                    pend_list.remove(tcb_ptr);
                }
            },
            OsTaskState::Deleted => {
                return Err(OsError::TcbInvalid);
            }
        }

        #[cfg(feature = "mutex")]
        unsafe {
            if tcb_ref.mutex_grp_head.is_some() {
                crate::sync::mutex::grp_post_all(tcb_ptr);
            }
        }

        #[cfg(feature = "task-q")]
        unsafe {
            tcb_ref.msg_q.flush(crate::msg::pool());
        }

        tcb_ref.task_state = OsTaskState::Deleted;
        tcb_ref.pend_on = OsPendOn::Nothing;
        kernel::KERNEL.task_qty_dec();

        hooks::task_delete_hook(tcb_ref);

        is_current = unsafe { kernel::tcb_cur_ptr() } == Some(tcb_ptr);
    }

    if is_current {
        sched::os_sched();
    }

    Ok(())
}

/// While a mutex waiter leaves the pend list for good, give back any
/// priority its owner inherited from it.
#[cfg(feature = "mutex")]
unsafe fn disinherit_on_waiter_exit(tcb_ref: &mut OsTcb) {
    if let OsPendOn::Mutex(m) = tcb_ref.pend_on {
        let owner = unsafe { (*m.as_ptr()).owner };
        if let Some(owner) = owner {
            let owner_ref = unsafe { &*owner.as_ptr() };
            if owner_ref.prio != owner_ref.base_prio && owner_ref.prio == tcb_ref.prio {
                let highest =
                    unsafe { crate::sync::mutex::grp_prio_find_highest_except(owner_ref, tcb_ref) };
                let new_prio = if highest > owner_ref.base_prio {
                    owner_ref.base_prio
                } else {
                    highest
                };
                if new_prio != owner_ref.prio {
                    unsafe {
                        task_change_prio_inner(owner, new_prio);
                    }
                }
            }
        }
    }
}

// ============ Priority change ============

/// Change a task's priority
///
/// `None` changes the calling task. The change propagates through mutex
/// ownership chains so priority inheritance stays consistent.
pub fn os_task_change_prio(tcb: Option<NonNull<OsTcb>>, new_prio: OsPrio) -> OsResult<()> {
    if called_from_isr() {
        return Err(OsError::TaskChangePrioIsr);
    }

    if new_prio as usize >= CFG_PRIO_MAX || new_prio == CFG_PRIO_IDLE {
        return Err(OsError::PrioInvalid);
    }

    {
        let _cs = CriticalSection::enter();

        let tcb_ptr = match tcb {
            Some(ptr) => ptr,
            None => unsafe { kernel::tcb_cur_ptr() }.ok_or(OsError::TcbInvalid)?,
        };

        let tcb_ref = unsafe { &mut *tcb_ptr.as_ptr() };
        if tcb_ref.task_state == OsTaskState::Deleted {
            return Err(OsError::TcbInvalid);
        }

        tcb_ref.base_prio = new_prio;

        #[cfg(feature = "mutex")]
        {
            // Keep an inherited boost; only the base changed.
            if tcb_ref.prio != tcb_ref.base_prio && new_prio > tcb_ref.prio {
                drop(_cs);
                if kernel::KERNEL.is_running() {
                    sched::os_sched();
                }
                return Ok(());
            }
        }

        unsafe {
            task_change_prio_inner(tcb_ptr, new_prio);
        }
    }

    if kernel::KERNEL.is_running() {
        sched::os_sched();
    }

    Ok(())
}

/// Apply a new effective priority to a task, propagating through mutex
/// ownership chains.
///
/// When the task is blocked on a mutex, its repositioning may require the
/// mutex owner's priority to change as well (a raise to inherit, or a drop
/// when the waiter no longer justifies the boost); the loop follows the
/// chain until a task not blocked on a mutex is reached.
///
/// # Safety
/// Caller must hold a critical section.
pub(crate) unsafe fn task_change_prio_inner(tcb: NonNull<OsTcb>, new_prio: OsPrio) {
    let mut tcb = tcb;
    let mut prio_new = new_prio;

    loop {
        let tcb_ref = unsafe { &mut *tcb.as_ptr() };
        let prio_cur = tcb_ref.prio;
        let mut owner: Option<NonNull<OsTcb>> = None;

        match tcb_ref.task_state {
            OsTaskState::Ready => unsafe {
                sched::os_rdy_list_remove(tcb);
                tcb_ref.prio = prio_new;
                if Some(tcb) == kernel::tcb_cur_ptr() {
                    sched::os_rdy_list_insert_head(tcb);
                } else {
                    sched::os_rdy_list_insert_tail(tcb);
                }
            },

            OsTaskState::Delayed | OsTaskState::Suspended | OsTaskState::DelayedSuspended => {
                tcb_ref.prio = prio_new;
            }

            OsTaskState::Pend
            | OsTaskState::PendTimeout
            | OsTaskState::PendSuspended
            | OsTaskState::PendTimeoutSuspended => {
                tcb_ref.prio = prio_new;
                unsafe {
                    pend::pend_list_change_prio(tcb);
                }

                #[cfg(feature = "mutex")]
                if let OsPendOn::Mutex(m) = tcb_ref.pend_on {
                    let owner_ptr = unsafe { (*m.as_ptr()).owner };
                    if let Some(owner_ptr) = owner_ptr {
                        let owner_ref = unsafe { &*owner_ptr.as_ptr() };
                        if prio_cur > prio_new {
                            // Waiter's priority rose; propagate the boost
                            // if the owner is now lower priority.
                            if owner_ref.prio > prio_new {
                                owner = Some(owner_ptr);
                            }
                        } else if owner_ref.prio == prio_cur {
                            // Waiter dropped; the owner may no longer
                            // deserve the priority it inherited from us.
                            let highest =
                                unsafe { crate::sync::mutex::grp_prio_find_highest(owner_ref) };
                            let recomputed = if highest > owner_ref.base_prio {
                                owner_ref.base_prio
                            } else {
                                highest
                            };
                            if recomputed != owner_ref.prio {
                                prio_new = recomputed;
                                owner = Some(owner_ptr);
                            }
                        }
                    }
                }
            }

            OsTaskState::Deleted => return,
        }

        match owner {
            Some(next) => tcb = next,
            None => return,
        }
    }
}

// ============ Suspend / Resume ============

/// Suspend a task
///
/// Suspension nests: a task suspended N times needs N resumes. `None`
/// suspends the calling task.
pub fn os_task_suspend(tcb: Option<NonNull<OsTcb>>) -> OsResult<()> {
    if !kernel::KERNEL.is_running() {
        return Err(OsError::OsNotRunning);
    }

    if called_from_isr() {
        return Err(OsError::TaskSuspendIsr);
    }

    let is_current;
    {
        let _cs = CriticalSection::enter();

        let tcb_ptr = match tcb {
            Some(ptr) => ptr,
            None => unsafe { kernel::tcb_cur_ptr() }.ok_or(OsError::TcbInvalid)?,
        };

        let tcb_ref = unsafe { &mut *tcb_ptr.as_ptr() };

        if tcb_ref.prio == CFG_PRIO_IDLE {
            return Err(OsError::TaskSuspendIdle);
        }

        if tcb_ref.task_state == OsTaskState::Deleted {
            return Err(OsError::TcbInvalid);
        }

        is_current = unsafe { kernel::tcb_cur_ptr() } == Some(tcb_ptr);

        if is_current && kernel::KERNEL.sched_lock_nesting() > 0 {
            return Err(OsError::SchedLocked);
        }

        if tcb_ref.suspend_ctr == crate::types::OsNestingCtr::MAX {
            return Err(OsError::TaskSuspendCtrOvf);
        }
        tcb_ref.suspend_ctr += 1;

        if tcb_ref.task_state == OsTaskState::Ready {
            unsafe {
                sched::os_rdy_list_remove(tcb_ptr);
            }
        }
        tcb_ref.task_state = tcb_ref.task_state.suspended();
    }

    if is_current {
        sched::os_sched();
    }

    Ok(())
}

/// Resume a suspended task
///
/// The task becomes eligible again only when its suspend nesting counter
/// reaches zero.
pub fn os_task_resume(tcb: NonNull<OsTcb>) -> OsResult<()> {
    if !kernel::KERNEL.is_running() {
        return Err(OsError::OsNotRunning);
    }

    if called_from_isr() {
        return Err(OsError::TaskResumeIsr);
    }

    {
        let _cs = CriticalSection::enter();

        let tcb_ref = unsafe { &mut *tcb.as_ptr() };

        if tcb_ref.suspend_ctr == 0 || !tcb_ref.is_suspended() {
            return Err(OsError::TaskNotSuspended);
        }

        tcb_ref.suspend_ctr -= 1;
        if tcb_ref.suspend_ctr > 0 {
            return Ok(());
        }

        tcb_ref.task_state = tcb_ref.task_state.resumed();
        if tcb_ref.task_state == OsTaskState::Ready {
            unsafe {
                sched::os_rdy_list_insert(tcb);
            }
        }
    }

    sched::os_sched();

    Ok(())
}

// ============ Time quanta ============

/// Change a task's round-robin time quanta (0 restores the default)
pub fn os_task_time_quanta_set(tcb: Option<NonNull<OsTcb>>, quanta: OsTick) -> OsResult<()> {
    if called_from_isr() {
        return Err(OsError::AcceptIsr);
    }

    let _cs = CriticalSection::enter();

    let tcb_ptr = match tcb {
        Some(ptr) => ptr,
        None => unsafe { kernel::tcb_cur_ptr() }.ok_or(OsError::TcbInvalid)?,
    };

    let tcb_ref = unsafe { &mut *tcb_ptr.as_ptr() };
    tcb_ref.time_quanta = quanta;
    tcb_ref.time_quanta_ctr = if quanta == 0 {
        kernel::KERNEL.round_robin_dflt_quanta()
    } else {
        quanta
    };

    Ok(())
}

// ============ Stack checking ============

/// Measure a task's stack usage, returning `(free, used)` words
///
/// The task must have been created with `TASK_STK_CHK | TASK_STK_CLR`.
pub fn os_task_stk_chk(tcb: Option<NonNull<OsTcb>>) -> OsResult<(usize, usize)> {
    let _cs = CriticalSection::enter();

    let tcb_ptr = match tcb {
        Some(ptr) => ptr,
        None => unsafe { kernel::tcb_cur_ptr() }.ok_or(OsError::TcbInvalid)?,
    };

    let tcb_ref = unsafe { tcb_ptr.as_ref() };

    if tcb_ref.opt & opt::TASK_STK_CHK == 0 || tcb_ref.opt & opt::TASK_STK_CLR == 0 {
        return Err(OsError::TaskOpt);
    }

    Ok(unsafe { stack::stk_chk(tcb_ref) })
}

// ============ Task registers ============

static NEXT_REG_ID: AtomicU8 = AtomicU8::new(0);

/// Allocate the next free software register identifier
pub fn os_task_reg_alloc_id() -> OsResult<OsRegId> {
    let id = NEXT_REG_ID.fetch_add(1, Ordering::Relaxed);
    if (id as usize) >= CFG_TASK_REG_TBL_SIZE {
        NEXT_REG_ID.store(CFG_TASK_REG_TBL_SIZE as u8, Ordering::Relaxed);
        return Err(OsError::RegIdInvalid);
    }
    Ok(id)
}

/// Read a task software register. `None` reads the calling task.
pub fn os_task_reg_get(tcb: Option<NonNull<OsTcb>>, id: OsRegId) -> OsResult<OsReg> {
    if (id as usize) >= CFG_TASK_REG_TBL_SIZE {
        return Err(OsError::RegIdInvalid);
    }

    let _cs = CriticalSection::enter();

    let tcb_ptr = match tcb {
        Some(ptr) => ptr,
        None => unsafe { kernel::tcb_cur_ptr() }.ok_or(OsError::TcbInvalid)?,
    };

    Ok(unsafe { tcb_ptr.as_ref().reg_tbl[id as usize] })
}

/// Write a task software register. `None` writes the calling task.
pub fn os_task_reg_set(tcb: Option<NonNull<OsTcb>>, id: OsRegId, value: OsReg) -> OsResult<()> {
    if (id as usize) >= CFG_TASK_REG_TBL_SIZE {
        return Err(OsError::RegIdInvalid);
    }

    let _cs = CriticalSection::enter();

    let tcb_ptr = match tcb {
        Some(ptr) => ptr,
        None => unsafe { kernel::tcb_cur_ptr() }.ok_or(OsError::TcbInvalid)?,
    };

    unsafe {
        (*tcb_ptr.as_ptr()).reg_tbl[id as usize] = value;
    }
    Ok(())
}

// ============ Task semaphore ============

/// Wait on the calling task's signal semaphore
///
/// # Arguments
/// * `timeout` - Maximum ticks to wait (0 = forever)
/// * `pend_opt` - `PEND_BLOCKING` or `PEND_NON_BLOCKING`
pub fn os_task_sem_pend(timeout: OsTick, pend_opt: OsOpt) -> OsResult<OsSemCtr> {
    if called_from_isr() {
        return Err(OsError::PendIsr);
    }

    if !kernel::KERNEL.is_running() {
        return Err(OsError::OsNotRunning);
    }

    if timeout > 0 && !CFG_TICK_EN {
        return Err(OsError::TickDisabled);
    }

    let cur_tcb_ptr;
    {
        let _cs = CriticalSection::enter();

        cur_tcb_ptr = unsafe { kernel::tcb_cur_ptr() }.ok_or(OsError::TcbInvalid)?;
        let cur_tcb = unsafe { &mut *cur_tcb_ptr.as_ptr() };

        if cur_tcb.sem_ctr > 0 {
            cur_tcb.sem_ctr -= 1;
            return Ok(cur_tcb.sem_ctr);
        }

        if pend_opt & opt::PEND_NON_BLOCKING != 0 {
            return Err(OsError::PendWouldBlock);
        }

        if kernel::KERNEL.sched_lock_nesting() > 0 {
            return Err(OsError::SchedLocked);
        }

        unsafe {
            pend::pend_block(cur_tcb_ptr, OsPendOn::TaskSem, timeout);
        }
    }

    sched::os_sched();

    let _cs = CriticalSection::enter();
    let cur_tcb = unsafe { cur_tcb_ptr.as_ref() };
    match cur_tcb.pend_status {
        OsPendStatus::Ok => Ok(cur_tcb.sem_ctr),
        OsPendStatus::Timeout => Err(OsError::Timeout),
        OsPendStatus::Abort => Err(OsError::PendAbort),
        OsPendStatus::Del => Err(OsError::ObjDel),
    }
}

/// Signal a task's semaphore. `None` signals the calling task. Safe to
/// call from an ISR.
pub fn os_task_sem_post(tcb: Option<NonNull<OsTcb>>, post_opt: OsOpt) -> OsResult<OsSemCtr> {
    if !kernel::KERNEL.is_running() {
        return Err(OsError::OsNotRunning);
    }

    let ctr;
    {
        let _cs = CriticalSection::enter();

        let tcb_ptr = match tcb {
            Some(ptr) => ptr,
            None => unsafe { kernel::tcb_cur_ptr() }.ok_or(OsError::TcbInvalid)?,
        };

        let tcb_ref = unsafe { &mut *tcb_ptr.as_ptr() };

        if tcb_ref.is_pending() && tcb_ref.pend_on == OsPendOn::TaskSem {
            let ts = crate::port::os_ts_get();
            unsafe {
                pend::post_wake(tcb_ptr, core::ptr::null(), 0, ts);
            }
        } else {
            if tcb_ref.sem_ctr == OsSemCtr::MAX {
                return Err(OsError::SemOvf);
            }
            tcb_ref.sem_ctr += 1;
        }
        ctr = tcb_ref.sem_ctr;
    }

    if post_opt & opt::POST_NO_SCHED == 0 {
        sched::os_sched();
    }

    Ok(ctr)
}

/// Set a task's signal semaphore counter. `None` targets the calling task.
pub fn os_task_sem_set(tcb: Option<NonNull<OsTcb>>, ctr: OsSemCtr) -> OsResult<()> {
    if called_from_isr() {
        return Err(OsError::AcceptIsr);
    }

    let _cs = CriticalSection::enter();

    let tcb_ptr = match tcb {
        Some(ptr) => ptr,
        None => unsafe { kernel::tcb_cur_ptr() }.ok_or(OsError::TcbInvalid)?,
    };

    let tcb_ref = unsafe { &mut *tcb_ptr.as_ptr() };

    if tcb_ref.is_pending() && tcb_ref.pend_on == OsPendOn::TaskSem {
        return Err(OsError::TaskWaiting);
    }

    tcb_ref.sem_ctr = ctr;
    Ok(())
}

/// Abort another task's wait on its signal semaphore
pub fn os_task_sem_pend_abort(tcb: NonNull<OsTcb>, post_opt: OsOpt) -> OsResult<()> {
    if called_from_isr() {
        return Err(OsError::PendAbortIsr);
    }

    if !kernel::KERNEL.is_running() {
        return Err(OsError::OsNotRunning);
    }

    {
        let _cs = CriticalSection::enter();

        if Some(tcb) == unsafe { kernel::tcb_cur_ptr() } {
            return Err(OsError::PendAbortSelf);
        }

        let tcb_ref = unsafe { tcb.as_ref() };
        if !(tcb_ref.is_pending() && tcb_ref.pend_on == OsPendOn::TaskSem) {
            return Err(OsError::PendAbortNone);
        }

        let ts = crate::port::os_ts_get();
        unsafe {
            pend::pend_abort_tcb(tcb, ts, OsPendStatus::Abort);
        }
    }

    if post_opt & opt::POST_NO_SCHED == 0 {
        sched::os_sched();
    }

    Ok(())
}

// ============ Task message queue ============

/// Wait for a message in the calling task's mailbox
#[cfg(feature = "task-q")]
pub fn os_task_q_pend(timeout: OsTick, pend_opt: OsOpt) -> OsResult<(*const (), OsMsgSize)> {
    if called_from_isr() {
        return Err(OsError::PendIsr);
    }

    if !kernel::KERNEL.is_running() {
        return Err(OsError::OsNotRunning);
    }

    if timeout > 0 && !CFG_TICK_EN {
        return Err(OsError::TickDisabled);
    }

    let cur_tcb_ptr;
    {
        let _cs = CriticalSection::enter();

        cur_tcb_ptr = unsafe { kernel::tcb_cur_ptr() }.ok_or(OsError::TcbInvalid)?;
        let cur_tcb = unsafe { &mut *cur_tcb_ptr.as_ptr() };

        if let Some((msg_ptr, msg_size, _ts)) = cur_tcb.msg_q.get(unsafe { crate::msg::pool() }) {
            return Ok((msg_ptr, msg_size));
        }

        if pend_opt & opt::PEND_NON_BLOCKING != 0 {
            return Err(OsError::PendWouldBlock);
        }

        if kernel::KERNEL.sched_lock_nesting() > 0 {
            return Err(OsError::SchedLocked);
        }

        unsafe {
            pend::pend_block(cur_tcb_ptr, OsPendOn::TaskQueue, timeout);
        }
    }

    sched::os_sched();

    let _cs = CriticalSection::enter();
    let cur_tcb = unsafe { cur_tcb_ptr.as_ref() };
    match cur_tcb.pend_status {
        OsPendStatus::Ok => Ok((cur_tcb.msg_ptr, cur_tcb.msg_size)),
        OsPendStatus::Timeout => Err(OsError::Timeout),
        OsPendStatus::Abort => Err(OsError::PendAbort),
        OsPendStatus::Del => Err(OsError::ObjDel),
    }
}

/// Post a message to a task's mailbox. `None` targets the calling task.
/// Safe to call from an ISR.
#[cfg(feature = "task-q")]
pub fn os_task_q_post(
    tcb: Option<NonNull<OsTcb>>,
    msg_ptr: *const (),
    msg_size: OsMsgSize,
    post_opt: OsOpt,
) -> OsResult<()> {
    if !kernel::KERNEL.is_running() {
        return Err(OsError::OsNotRunning);
    }

    {
        let _cs = CriticalSection::enter();

        let tcb_ptr = match tcb {
            Some(ptr) => ptr,
            None => unsafe { kernel::tcb_cur_ptr() }.ok_or(OsError::TcbInvalid)?,
        };

        let tcb_ref = unsafe { &mut *tcb_ptr.as_ptr() };
        let ts = crate::port::os_ts_get();

        if tcb_ref.is_pending() && tcb_ref.pend_on == OsPendOn::TaskQueue {
            unsafe {
                pend::post_wake(tcb_ptr, msg_ptr, msg_size, ts);
            }
        } else {
            let lifo = post_opt & opt::POST_LIFO != 0;
            tcb_ref
                .msg_q
                .put(unsafe { crate::msg::pool() }, msg_ptr, msg_size, lifo, ts)?;
        }
    }

    if post_opt & opt::POST_NO_SCHED == 0 {
        sched::os_sched();
    }

    Ok(())
}

/// Drop every queued message in a task's mailbox, returning the number
/// dropped. `None` targets the calling task.
#[cfg(feature = "task-q")]
pub fn os_task_q_flush(tcb: Option<NonNull<OsTcb>>) -> OsResult<OsObjQty> {
    if called_from_isr() {
        return Err(OsError::FlushIsr);
    }

    let _cs = CriticalSection::enter();

    let tcb_ptr = match tcb {
        Some(ptr) => ptr,
        None => unsafe { kernel::tcb_cur_ptr() }.ok_or(OsError::TcbInvalid)?,
    };

    let tcb_ref = unsafe { &mut *tcb_ptr.as_ptr() };
    Ok(tcb_ref.msg_q.flush(unsafe { crate::msg::pool() }))
}

/// Abort another task's wait on its mailbox
#[cfg(feature = "task-q")]
pub fn os_task_q_pend_abort(tcb: NonNull<OsTcb>, post_opt: OsOpt) -> OsResult<()> {
    if called_from_isr() {
        return Err(OsError::PendAbortIsr);
    }

    if !kernel::KERNEL.is_running() {
        return Err(OsError::OsNotRunning);
    }

    {
        let _cs = CriticalSection::enter();

        if Some(tcb) == unsafe { kernel::tcb_cur_ptr() } {
            return Err(OsError::PendAbortSelf);
        }

        let tcb_ref = unsafe { tcb.as_ref() };
        if !(tcb_ref.is_pending() && tcb_ref.pend_on == OsPendOn::TaskQueue) {
            return Err(OsError::PendAbortNone);
        }

        let ts = crate::port::os_ts_get();
        unsafe {
            pend::pend_abort_tcb(tcb, ts, OsPendStatus::Abort);
        }
    }

    if post_opt & opt::POST_NO_SCHED == 0 {
        sched::os_sched();
    }

    Ok(())
}
