//! Task stack checking
//!
//! Stacks grow downward: the base pointer is the lowest address and the
//! initial stack frame sits at the top. Free space is measured by scanning
//! for the zero fill written at creation time. The optional redzone poisons
//! the deepest words so overflow is caught at context-switch time.

use crate::config::{CFG_STK_REDZONE_DEPTH, CFG_STK_REDZONE_EN};
use crate::task::OsTcb;
use crate::types::OsStkElement;

/// Poison value written into redzone words
pub(crate) const REDZONE_PATTERN: OsStkElement = 0xABCD_5678;

/// Poison the redzone at the growth end of a stack.
///
/// # Safety
/// `stk_base` must point to at least `CFG_STK_REDZONE_DEPTH` writable
/// stack words.
pub(crate) unsafe fn redzone_init(stk_base: *mut OsStkElement) {
    for i in 0..CFG_STK_REDZONE_DEPTH {
        unsafe {
            stk_base.add(i).write_volatile(REDZONE_PATTERN);
        }
    }
}

/// Verify a task's redzone is intact. Always true when the redzone is
/// configured out or the task has no stack (the pre-start pseudo TCB).
pub(crate) fn redzone_chk(tcb: &OsTcb) -> bool {
    if !CFG_STK_REDZONE_EN {
        return true;
    }
    if tcb.stk_base.is_null() {
        return true;
    }
    for i in 0..CFG_STK_REDZONE_DEPTH.min(tcb.stk_size) {
        let word = unsafe { tcb.stk_base.add(i).read_volatile() };
        if word != REDZONE_PATTERN {
            return false;
        }
    }
    true
}

/// Measure a task's stack usage.
///
/// Returns `(free, used)` in stack words by counting the zero fill still
/// present at the growth end. Only meaningful for tasks created with
/// `TASK_STK_CLR`.
///
/// # Safety
/// The task's stack must be valid and not concurrently reused.
pub(crate) unsafe fn stk_chk(tcb: &OsTcb) -> (usize, usize) {
    let skip = if CFG_STK_REDZONE_EN {
        CFG_STK_REDZONE_DEPTH.min(tcb.stk_size)
    } else {
        0
    };

    let mut free = 0usize;
    for i in skip..tcb.stk_size {
        let word = unsafe { tcb.stk_base.add(i).read_volatile() };
        if word != 0 {
            break;
        }
        free += 1;
    }

    (free, tcb.stk_size - skip - free)
}
