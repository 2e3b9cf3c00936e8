//! Time management module
//!
//! Tick handling, task delays (relative, absolute, drift-free periodic),
//! and the tick-update path shared by the periodic and dynamic tick modes.

mod tick_list;

pub use tick_list::TickList;

use core::ptr::NonNull;

use crate::config::{CFG_DYN_TICK_EN, CFG_TICK_EN, CFG_TICK_RATE_HZ};
use crate::critical::{critical_section, CriticalSection};
use crate::error::{OsError, OsResult};
use crate::hooks;
use crate::kernel;
use crate::pend;
use crate::sched;
use crate::task::OsTcb;
use crate::types::{opt, OsOpt, OsPendOn, OsPendStatus, OsTaskState, OsTick};

/// Delay the calling task
///
/// # Arguments
/// * `dly` - Delay in ticks; its meaning depends on `time_opt`
/// * `time_opt` - One of:
///   - `TIME_DLY` / `TIME_TIMEOUT`: relative to the current tick
///   - `TIME_MATCH`: absolute tick the counter must reach
///   - `TIME_PERIODIC`: next multiple of `dly` past the task's periodic
///     accumulator, preserving a drift-free cadence
///
/// # Returns
/// * `Err(OsError::TimeZeroDly)` - the effective delay is zero
/// * `Err(OsError::SchedLocked)` - cannot delay with the scheduler locked
/// * `Err(OsError::TimeDlyIsr)` - cannot delay from an ISR
pub fn os_time_dly(dly: OsTick, time_opt: OsOpt) -> OsResult<()> {
    if !CFG_TICK_EN {
        return Err(OsError::TickDisabled);
    }

    if kernel::KERNEL.int_nesting() > 0 {
        return Err(OsError::TimeDlyIsr);
    }

    if !kernel::KERNEL.is_running() {
        return Err(OsError::OsNotRunning);
    }

    if kernel::KERNEL.sched_lock_nesting() > 0 {
        return Err(OsError::SchedLocked);
    }

    match time_opt {
        opt::TIME_DLY | opt::TIME_TIMEOUT | opt::TIME_PERIODIC | opt::TIME_MATCH => {}
        _ => return Err(OsError::OptInvalid),
    }

    {
        let _cs = CriticalSection::enter();

        let cur_tcb_ptr = unsafe { kernel::tcb_cur_ptr() }.ok_or(OsError::TcbInvalid)?;
        let cur_tcb = unsafe { &mut *cur_tcb_ptr.as_ptr() };

        let now = kernel::KERNEL.tick_get();

        let deadline = match time_opt {
            opt::TIME_MATCH => {
                if dly == now {
                    return Err(OsError::TimeZeroDly);
                }
                dly
            }
            opt::TIME_PERIODIC => {
                // Schedule off the accumulator, not off `now`, so jitter
                // in the caller does not accumulate into drift.
                let deadline = if now.wrapping_sub(cur_tcb.tick_ctr_prev) > dly {
                    // Missed at least one period, resynchronize
                    now.wrapping_add(dly)
                } else {
                    cur_tcb.tick_ctr_prev.wrapping_add(dly)
                };
                if deadline == now {
                    return Err(OsError::TimeZeroDly);
                }
                cur_tcb.tick_ctr_prev = deadline;
                deadline
            }
            _ => {
                if dly == 0 {
                    return Err(OsError::TimeZeroDly);
                }
                now.wrapping_add(dly)
            }
        };

        cur_tcb.tick_remain = deadline.wrapping_sub(now);
        cur_tcb.task_state = OsTaskState::Delayed;

        unsafe {
            kernel::tick_list().insert(cur_tcb_ptr, deadline, now);
            sched::os_rdy_list_remove(cur_tcb_ptr);
        }
    }

    sched::os_sched();

    Ok(())
}

/// Delay the calling task for hours, minutes, seconds and milliseconds
///
/// The delay is rounded to the nearest tick. With `TIME_HMSM_STRICT`
/// (the default) the ranges are hours 0..=99, minutes 0..=59, seconds
/// 0..=59, milliseconds 0..=999; `TIME_HMSM_NON_STRICT` accepts hours
/// 0..=999, minutes 0..=9999, seconds 0..=65535 and any millisecond value.
pub fn os_time_dly_hmsm(
    hours: u16,
    minutes: u16,
    seconds: u16,
    milliseconds: u32,
    time_opt: OsOpt,
) -> OsResult<()> {
    let ticks = hmsm_to_ticks(hours, minutes, seconds, milliseconds, time_opt)?;
    os_time_dly(ticks, opt::TIME_DLY)
}

/// Convert an HMSM quadruple to ticks, rounding to the nearest tick.
pub(crate) fn hmsm_to_ticks(
    hours: u16,
    minutes: u16,
    seconds: u16,
    milliseconds: u32,
    time_opt: OsOpt,
) -> OsResult<OsTick> {
    match time_opt {
        opt::TIME_HMSM_STRICT => {
            if hours > 99 {
                return Err(OsError::TimeInvalidHours);
            }
            if minutes > 59 {
                return Err(OsError::TimeInvalidMinutes);
            }
            if seconds > 59 {
                return Err(OsError::TimeInvalidSeconds);
            }
            if milliseconds > 999 {
                return Err(OsError::TimeInvalidMilliseconds);
            }
        }
        opt::TIME_HMSM_NON_STRICT => {
            if hours > 999 {
                return Err(OsError::TimeInvalidHours);
            }
            if minutes > 9999 {
                return Err(OsError::TimeInvalidMinutes);
            }
        }
        _ => return Err(OsError::OptInvalid),
    }

    let rate = CFG_TICK_RATE_HZ as u64;
    let seconds_total =
        (hours as u64) * 3600 + (minutes as u64) * 60 + (seconds as u64);
    let ticks = seconds_total * rate + ((milliseconds as u64) * rate + 500) / 1000;

    Ok(ticks as OsTick)
}

/// Resume a delayed task before its delay expires
///
/// Only plain delays can be resumed this way; a task pending with a
/// timeout keeps its timeout.
pub fn os_time_dly_resume(tcb: NonNull<OsTcb>) -> OsResult<()> {
    if !kernel::KERNEL.is_running() {
        return Err(OsError::OsNotRunning);
    }

    if kernel::KERNEL.int_nesting() > 0 {
        return Err(OsError::TimeDlyIsr);
    }

    {
        let _cs = CriticalSection::enter();

        if Some(tcb) == unsafe { kernel::tcb_cur_ptr() } {
            return Err(OsError::TaskNotDly);
        }

        let tcb_ref = unsafe { &mut *tcb.as_ptr() };

        match tcb_ref.task_state {
            OsTaskState::Delayed => unsafe {
                tcb_ref.tick_remain = 0;
                kernel::tick_list().remove(tcb);
                tcb_ref.task_state = OsTaskState::Ready;
                sched::os_rdy_list_insert(tcb);
            },
            OsTaskState::DelayedSuspended => unsafe {
                tcb_ref.tick_remain = 0;
                kernel::tick_list().remove(tcb);
                tcb_ref.task_state = OsTaskState::Suspended;
            },
            _ => {
                return Err(OsError::TaskNotDly);
            }
        }
    }

    sched::os_sched();

    Ok(())
}

/// Get the current tick count
#[inline]
pub fn os_time_get() -> OsTick {
    kernel::KERNEL.tick_get()
}

/// Set the tick counter
///
/// Deadlines already on the tick list are relative to the old counter
/// value and keep their original wake ticks.
pub fn os_time_set(ticks: OsTick) {
    critical_section(|_cs| {
        kernel::KERNEL.tick_set(ticks);
    });
}

/// Process one kernel tick
///
/// Called from the periodic tick ISR, inside an
/// `os_int_enter()`/`os_int_exit()` pair.
pub fn os_time_tick() {
    tick_update(1);
}

/// Process `ticks` elapsed ticks at once
///
/// Called from the dynamic-tick ISR, inside an
/// `os_int_enter()`/`os_int_exit()` pair, with the number of ticks since
/// the previous update.
pub fn os_time_dyn_tick(ticks: OsTick) {
    if !CFG_DYN_TICK_EN {
        return;
    }
    if ticks == 0 {
        return;
    }
    tick_update(ticks);
}

/// Absolute deadline of the next time-waiting task, for programming a
/// one-shot tick source in dynamic-tick mode.
pub fn os_tick_next_deadline() -> Option<OsTick> {
    critical_section(|_cs| unsafe { kernel::tick_list().next_deadline() })
}

/// Advance the tick counter and wake every task whose deadline passed,
/// then run round-robin bookkeeping for the running task.
fn tick_update(n: OsTick) {
    if !kernel::KERNEL.is_running() {
        return;
    }

    hooks::tick_hook();

    critical_section(|_cs| {
        let now = kernel::KERNEL.tick_add(n);

        loop {
            let expired = unsafe { kernel::tick_list().pop_expired(now) };
            let tcb_ptr = match expired {
                Some(ptr) => ptr,
                None => break,
            };

            let tcb_ref = unsafe { &mut *tcb_ptr.as_ptr() };
            tcb_ref.tick_remain = 0;

            match tcb_ref.task_state {
                OsTaskState::Delayed => unsafe {
                    tcb_ref.task_state = OsTaskState::Ready;
                    sched::os_rdy_list_insert(tcb_ptr);
                },
                OsTaskState::DelayedSuspended => {
                    tcb_ref.task_state = OsTaskState::Suspended;
                }
                OsTaskState::PendTimeout => unsafe {
                    if let Some(pend_list) = pend::pend_list_of(tcb_ref) {
                        pend_list.remove(tcb_ptr);
                    }
                    tcb_ref.msg_ptr = core::ptr::null();
                    tcb_ref.msg_size = 0;
                    tcb_ref.pend_status = OsPendStatus::Timeout;
                    tcb_ref.pend_on = OsPendOn::Nothing;
                    tcb_ref.task_state = OsTaskState::Ready;
                    sched::os_rdy_list_insert(tcb_ptr);
                },
                OsTaskState::PendTimeoutSuspended => unsafe {
                    if let Some(pend_list) = pend::pend_list_of(tcb_ref) {
                        pend_list.remove(tcb_ptr);
                    }
                    tcb_ref.msg_ptr = core::ptr::null();
                    tcb_ref.msg_size = 0;
                    tcb_ref.pend_status = OsPendStatus::Timeout;
                    tcb_ref.pend_on = OsPendOn::Nothing;
                    tcb_ref.task_state = OsTaskState::Suspended;
                },
                _ => {
                    debug_assert!(false, "non-waiting task on tick list");
                }
            }
        }
    });

    sched::os_sched_round_robin();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hmsm_strict_ranges() {
        assert_eq!(
            hmsm_to_ticks(100, 0, 0, 0, opt::TIME_HMSM_STRICT),
            Err(OsError::TimeInvalidHours)
        );
        assert_eq!(
            hmsm_to_ticks(0, 60, 0, 0, opt::TIME_HMSM_STRICT),
            Err(OsError::TimeInvalidMinutes)
        );
        assert_eq!(
            hmsm_to_ticks(0, 0, 60, 0, opt::TIME_HMSM_STRICT),
            Err(OsError::TimeInvalidSeconds)
        );
        assert_eq!(
            hmsm_to_ticks(0, 0, 0, 1000, opt::TIME_HMSM_STRICT),
            Err(OsError::TimeInvalidMilliseconds)
        );
    }

    #[test]
    fn hmsm_conversion() {
        // 1000 Hz tick rate: one tick per millisecond
        assert_eq!(hmsm_to_ticks(0, 0, 1, 0, opt::TIME_HMSM_STRICT), Ok(1000));
        assert_eq!(hmsm_to_ticks(0, 1, 0, 0, opt::TIME_HMSM_STRICT), Ok(60_000));
        assert_eq!(
            hmsm_to_ticks(1, 0, 0, 0, opt::TIME_HMSM_STRICT),
            Ok(3_600_000)
        );
        assert_eq!(hmsm_to_ticks(0, 0, 0, 123, opt::TIME_HMSM_STRICT), Ok(123));
    }

    #[test]
    fn hmsm_non_strict() {
        assert_eq!(
            hmsm_to_ticks(0, 90, 0, 0, opt::TIME_HMSM_NON_STRICT),
            Ok(90 * 60 * 1000)
        );
        assert_eq!(
            hmsm_to_ticks(1000, 0, 0, 0, opt::TIME_HMSM_NON_STRICT),
            Err(OsError::TimeInvalidHours)
        );
    }

    #[test]
    fn hmsm_rejects_unknown_opt() {
        assert_eq!(
            hmsm_to_ticks(0, 0, 1, 0, opt::TIME_PERIODIC),
            Err(OsError::OptInvalid)
        );
    }
}
