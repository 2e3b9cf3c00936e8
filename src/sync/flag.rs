//! Event flag groups
//!
//! Tasks wait for combinations of bits to be set (or cleared) in a shared
//! flag word, in ALL or ANY mode, optionally consuming the matched bits.
//! A post walks the waiters in priority order and applies consumption in
//! that same order, so an earlier consumer can deprive a later waiter.

use core::ptr::NonNull;

use crate::config::{CFG_OBJ_TYPE_CHK_EN, CFG_TICK_EN};
use crate::critical::CriticalSection;
use crate::error::{OsError, OsResult};
use crate::kernel;
use crate::pend;
use crate::pend::PendList;
use crate::sched;
use crate::types::{
    opt, OsFlags, OsObjQty, OsObjType, OsOpt, OsPendOn, OsPendStatus, OsTick, OsTs,
};

const FLAG_WAIT_MASK: OsOpt =
    opt::FLAG_SET_ALL | opt::FLAG_SET_ANY | opt::FLAG_CLR_ALL | opt::FLAG_CLR_ANY;

/// Evaluate a waiter's condition against the current flag word.
///
/// Returns the bits that satisfied the wait, or `None` when the condition
/// does not hold yet.
pub(crate) fn flags_match(flags: OsFlags, wanted: OsFlags, flag_opt: OsOpt) -> Option<OsFlags> {
    match flag_opt & FLAG_WAIT_MASK {
        opt::FLAG_SET_ALL => {
            if flags & wanted == wanted {
                Some(wanted)
            } else {
                None
            }
        }
        opt::FLAG_SET_ANY => {
            let rdy = flags & wanted;
            if rdy != 0 {
                Some(rdy)
            } else {
                None
            }
        }
        opt::FLAG_CLR_ALL => {
            if !flags & wanted == wanted {
                Some(wanted)
            } else {
                None
            }
        }
        opt::FLAG_CLR_ANY => {
            let rdy = !flags & wanted;
            if rdy != 0 {
                Some(rdy)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Remove consumed bits from the flag word: matched SET bits are cleared,
/// matched CLR bits are set back.
pub(crate) fn flags_consume(flags: OsFlags, rdy: OsFlags, flag_opt: OsOpt) -> OsFlags {
    if flag_opt & (opt::FLAG_SET_ALL | opt::FLAG_SET_ANY) != 0 {
        flags & !rdy
    } else {
        flags | rdy
    }
}

/// Event flag group
pub struct OsFlagGrp {
    /// Object type marker
    obj_type: OsObjType,
    /// List of tasks waiting on this group
    pub(crate) pend_list: PendList,
    /// Current flag word
    flags: OsFlags,
    /// Timestamp of the last post
    ts: OsTs,
    /// Name for debugging
    #[cfg(feature = "defmt")]
    name: &'static str,
}

impl OsFlagGrp {
    /// Create a new flag group with an initial flag word
    pub const fn new(flags: OsFlags) -> Self {
        OsFlagGrp {
            obj_type: OsObjType::Flag,
            pend_list: PendList::new(),
            flags,
            ts: 0,
            #[cfg(feature = "defmt")]
            name: "",
        }
    }

    /// Initialize/create the flag group
    pub fn create(&mut self, flags: OsFlags, _name: &'static str) -> OsResult<()> {
        if kernel::KERNEL.safety_critical_started() {
            return Err(OsError::IllegalCreateRunTime);
        }

        if kernel::KERNEL.int_nesting() > 0 {
            return Err(OsError::CreateIsr);
        }

        let _cs = CriticalSection::enter();
        self.obj_type = OsObjType::Flag;
        self.pend_list.init();
        self.flags = flags;
        self.ts = 0;
        #[cfg(feature = "defmt")]
        {
            self.name = _name;
        }
        Ok(())
    }

    fn chk_obj_type(&self) -> OsResult<()> {
        if CFG_OBJ_TYPE_CHK_EN && self.obj_type != OsObjType::Flag {
            return Err(OsError::ObjType);
        }
        Ok(())
    }

    /// Wait for a flag combination
    ///
    /// # Arguments
    /// * `wanted` - The bits of interest
    /// * `timeout` - Maximum ticks to wait (0 = forever)
    /// * `flag_opt` - One of `FLAG_SET_ALL`, `FLAG_SET_ANY`, `FLAG_CLR_ALL`,
    ///   `FLAG_CLR_ANY`, optionally `| FLAG_CONSUME` and/or
    ///   `| PEND_NON_BLOCKING`
    ///
    /// # Returns
    /// The bits that satisfied the wait.
    pub fn pend(&mut self, wanted: OsFlags, timeout: OsTick, flag_opt: OsOpt) -> OsResult<OsFlags> {
        if kernel::KERNEL.int_nesting() > 0 {
            return Err(OsError::PendIsr);
        }

        if !kernel::KERNEL.is_running() {
            return Err(OsError::OsNotRunning);
        }

        self.chk_obj_type()?;

        match flag_opt & FLAG_WAIT_MASK {
            opt::FLAG_SET_ALL | opt::FLAG_SET_ANY | opt::FLAG_CLR_ALL | opt::FLAG_CLR_ANY => {}
            _ => return Err(OsError::FlagPendOpt),
        }

        if timeout > 0 && !CFG_TICK_EN {
            return Err(OsError::TickDisabled);
        }

        let cur_tcb_ptr;
        {
            let _cs = CriticalSection::enter();

            cur_tcb_ptr = unsafe { kernel::tcb_cur_ptr() }.ok_or(OsError::TcbInvalid)?;
            let cur_tcb = unsafe { &mut *cur_tcb_ptr.as_ptr() };

            if let Some(rdy) = flags_match(self.flags, wanted, flag_opt) {
                if flag_opt & opt::FLAG_CONSUME != 0 {
                    self.flags = flags_consume(self.flags, rdy, flag_opt);
                }
                cur_tcb.flags_rdy = rdy;
                return Ok(rdy);
            }

            if flag_opt & opt::PEND_NON_BLOCKING != 0 {
                return Err(OsError::PendWouldBlock);
            }

            if kernel::KERNEL.sched_lock_nesting() > 0 {
                return Err(OsError::SchedLocked);
            }

            cur_tcb.flags_pend = wanted;
            cur_tcb.flags_opt = flag_opt;
            cur_tcb.flags_rdy = 0;

            let grp = NonNull::from(&mut *self);
            unsafe {
                pend::pend_block(cur_tcb_ptr, OsPendOn::Flag(grp), timeout);
            }
        }

        sched::os_sched();

        let _cs = CriticalSection::enter();
        let cur_tcb = unsafe { cur_tcb_ptr.as_ref() };
        match cur_tcb.pend_status {
            OsPendStatus::Ok => Ok(cur_tcb.flags_rdy),
            OsPendStatus::Timeout => Err(OsError::Timeout),
            OsPendStatus::Abort => Err(OsError::PendAbort),
            OsPendStatus::Del => Err(OsError::ObjDel),
        }
    }

    /// Set or clear flags, waking every waiter whose condition now holds
    ///
    /// # Arguments
    /// * `mask` - The bits to apply
    /// * `post_opt` - `FLAG_POST_SET` or `FLAG_POST_CLR`, optionally
    ///   `| POST_NO_SCHED`
    ///
    /// # Returns
    /// The flag word after the update and any consumption.
    pub fn post(&mut self, mask: OsFlags, post_opt: OsOpt) -> OsResult<OsFlags> {
        if !kernel::KERNEL.is_running() {
            return Err(OsError::OsNotRunning);
        }

        self.chk_obj_type()?;

        let mut woke = false;
        {
            let _cs = CriticalSection::enter();

            if post_opt & opt::FLAG_POST_CLR != 0 {
                self.flags &= !mask;
            } else {
                self.flags |= mask;
            }

            let ts = crate::port::os_ts_get();
            self.ts = ts;

            // Waiters are evaluated in pend-list (priority) order; a
            // consuming waiter can deprive a later one.
            let mut cursor = self.pend_list.head();
            while let Some(waiter) = cursor {
                let waiter_ref = unsafe { &mut *waiter.as_ptr() };
                cursor = waiter_ref.pend_next_ptr;

                if let Some(rdy) = flags_match(self.flags, waiter_ref.flags_pend, waiter_ref.flags_opt)
                {
                    waiter_ref.flags_rdy = rdy;
                    if waiter_ref.flags_opt & opt::FLAG_CONSUME != 0 {
                        self.flags = flags_consume(self.flags, rdy, waiter_ref.flags_opt);
                    }
                    unsafe {
                        pend::post_wake(waiter, core::ptr::null(), 0, ts);
                    }
                    woke = true;
                }
            }
        }

        if woke && post_opt & opt::POST_NO_SCHED == 0 {
            sched::os_sched();
        }

        Ok(self.flags)
    }

    /// Abort the wait of the highest-priority waiter (or all waiters with
    /// `PEND_ABORT_ALL`), returning the number of tasks aborted.
    pub fn pend_abort(&mut self, abort_opt: OsOpt) -> OsResult<OsObjQty> {
        if kernel::KERNEL.int_nesting() > 0 {
            return Err(OsError::PendAbortIsr);
        }

        if !kernel::KERNEL.is_running() {
            return Err(OsError::OsNotRunning);
        }

        self.chk_obj_type()?;

        let mut qty: OsObjQty = 0;
        {
            let _cs = CriticalSection::enter();

            if self.pend_list.is_empty() {
                return Err(OsError::PendAbortNone);
            }

            let ts = crate::port::os_ts_get();
            while let Some(waiter) = self.pend_list.head() {
                unsafe {
                    pend::pend_abort_tcb(waiter, ts, OsPendStatus::Abort);
                }
                qty += 1;
                if abort_opt & opt::PEND_ABORT_ALL == 0 {
                    break;
                }
            }
        }

        if abort_opt & opt::POST_NO_SCHED == 0 {
            sched::os_sched();
        }

        Ok(qty)
    }

    /// Delete the flag group
    ///
    /// `DEL_NO_PEND` refuses when tasks are waiting; `DEL_ALWAYS` wakes
    /// every waiter with `ObjDel`. Returns the number of waiters woken.
    pub fn del(&mut self, del_opt: OsOpt) -> OsResult<OsObjQty> {
        if kernel::KERNEL.safety_critical_started() {
            return Err(OsError::IllegalDelRunTime);
        }

        if kernel::KERNEL.int_nesting() > 0 {
            return Err(OsError::DelIsr);
        }

        if !kernel::KERNEL.is_running() {
            return Err(OsError::OsNotRunning);
        }

        self.chk_obj_type()?;

        let mut qty: OsObjQty = 0;
        {
            let _cs = CriticalSection::enter();

            match del_opt {
                opt::DEL_NO_PEND => {
                    if !self.pend_list.is_empty() {
                        return Err(OsError::TaskWaiting);
                    }
                }
                opt::DEL_ALWAYS => {
                    let ts = crate::port::os_ts_get();
                    while let Some(waiter) = self.pend_list.head() {
                        unsafe {
                            pend::pend_abort_tcb(waiter, ts, OsPendStatus::Del);
                        }
                        qty += 1;
                    }
                }
                _ => return Err(OsError::OptInvalid),
            }

            self.obj_type = OsObjType::None;
            self.flags = 0;
        }

        sched::os_sched();

        Ok(qty)
    }

    /// Current flag word
    #[inline(always)]
    pub fn flags(&self) -> OsFlags {
        self.flags
    }

    /// Timestamp of the last post
    #[inline(always)]
    pub fn ts(&self) -> OsTs {
        self.ts
    }
}

impl Default for OsFlagGrp {
    fn default() -> Self {
        Self::new(0)
    }
}

unsafe impl Send for OsFlagGrp {}
unsafe impl Sync for OsFlagGrp {}

// ============ Safe Wrapper ============

use core::cell::UnsafeCell;

/// Shareable flag group handle for `static` placement
pub struct FlagGroup {
    inner: UnsafeCell<OsFlagGrp>,
}

unsafe impl Sync for FlagGroup {}
unsafe impl Send for FlagGroup {}

impl FlagGroup {
    pub const fn new(flags: OsFlags) -> Self {
        FlagGroup {
            inner: UnsafeCell::new(OsFlagGrp::new(flags)),
        }
    }

    pub fn create(&self, flags: OsFlags, name: &'static str) -> OsResult<()> {
        unsafe { (*self.inner.get()).create(flags, name) }
    }

    pub fn wait(&self, wanted: OsFlags, timeout: OsTick, flag_opt: OsOpt) -> OsResult<OsFlags> {
        unsafe { (*self.inner.get()).pend(wanted, timeout, flag_opt) }
    }

    pub fn post(&self, mask: OsFlags, post_opt: OsOpt) -> OsResult<OsFlags> {
        unsafe { (*self.inner.get()).post(mask, post_opt) }
    }

    pub fn pend_abort(&self, abort_opt: OsOpt) -> OsResult<OsObjQty> {
        unsafe { (*self.inner.get()).pend_abort(abort_opt) }
    }

    pub fn delete(&self, del_opt: OsOpt) -> OsResult<OsObjQty> {
        unsafe { (*self.inner.get()).del(del_opt) }
    }

    #[inline]
    pub fn flags(&self) -> OsFlags {
        unsafe { (*self.inner.get()).flags() }
    }
}

impl Default for FlagGroup {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_all_requires_every_bit() {
        assert_eq!(flags_match(0b0110, 0b0110, opt::FLAG_SET_ALL), Some(0b0110));
        assert_eq!(flags_match(0b0100, 0b0110, opt::FLAG_SET_ALL), None);
    }

    #[test]
    fn set_any_returns_matched_subset() {
        assert_eq!(flags_match(0b0100, 0b0110, opt::FLAG_SET_ANY), Some(0b0100));
        assert_eq!(flags_match(0b1000, 0b0110, opt::FLAG_SET_ANY), None);
    }

    #[test]
    fn clr_modes_wait_for_zero_bits() {
        assert_eq!(flags_match(0b0000, 0b0011, opt::FLAG_CLR_ALL), Some(0b0011));
        assert_eq!(flags_match(0b0001, 0b0011, opt::FLAG_CLR_ALL), None);
        assert_eq!(flags_match(0b0001, 0b0011, opt::FLAG_CLR_ANY), Some(0b0010));
    }

    #[test]
    fn consume_clears_or_restores() {
        // SET wait: consumed bits are cleared
        assert_eq!(
            flags_consume(0b0111, 0b0110, opt::FLAG_SET_ALL | opt::FLAG_CONSUME),
            0b0001
        );
        // CLR wait: consumed bits are set back
        assert_eq!(
            flags_consume(0b0000, 0b0011, opt::FLAG_CLR_ALL | opt::FLAG_CONSUME),
            0b0011
        );
    }
}
