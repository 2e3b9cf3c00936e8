//! Semaphore implementation
//!
//! Counting semaphores for task synchronization and resource counting.

use core::ptr::NonNull;

use crate::config::{CFG_OBJ_TYPE_CHK_EN, CFG_TICK_EN};
use crate::critical::CriticalSection;
use crate::error::{OsError, OsResult};
use crate::kernel;
use crate::pend;
use crate::pend::PendList;
use crate::sched;
use crate::types::{opt, OsObjQty, OsObjType, OsOpt, OsPendOn, OsPendStatus, OsSemCtr, OsTick, OsTs};

/// Counting semaphore
pub struct OsSem {
    /// Object type marker
    obj_type: OsObjType,
    /// List of tasks waiting on this semaphore
    pub(crate) pend_list: PendList,
    /// Current count
    ctr: OsSemCtr,
    /// Timestamp of the last post
    ts: OsTs,
    /// Name for debugging
    #[cfg(feature = "defmt")]
    name: &'static str,
}

impl OsSem {
    /// Create a new semaphore with an initial count
    pub const fn new(ctr: OsSemCtr) -> Self {
        OsSem {
            obj_type: OsObjType::Sem,
            pend_list: PendList::new(),
            ctr,
            ts: 0,
            #[cfg(feature = "defmt")]
            name: "",
        }
    }

    /// Initialize/create the semaphore
    pub fn create(&mut self, ctr: OsSemCtr, _name: &'static str) -> OsResult<()> {
        if kernel::KERNEL.safety_critical_started() {
            return Err(OsError::IllegalCreateRunTime);
        }

        if kernel::KERNEL.int_nesting() > 0 {
            return Err(OsError::CreateIsr);
        }

        let _cs = CriticalSection::enter();
        self.obj_type = OsObjType::Sem;
        self.pend_list.init();
        self.ctr = ctr;
        self.ts = 0;
        #[cfg(feature = "defmt")]
        {
            self.name = _name;
        }
        Ok(())
    }

    fn chk_obj_type(&self) -> OsResult<()> {
        if CFG_OBJ_TYPE_CHK_EN && self.obj_type != OsObjType::Sem {
            return Err(OsError::ObjType);
        }
        Ok(())
    }

    /// Wait on (pend) the semaphore
    ///
    /// # Arguments
    /// * `timeout` - Maximum ticks to wait (0 = forever)
    /// * `pend_opt` - `PEND_BLOCKING` or `PEND_NON_BLOCKING`
    ///
    /// # Returns
    /// * `Ok(count)` - Semaphore acquired, returns remaining count
    /// * `Err(OsError::Timeout)` - Timeout expired
    /// * `Err(OsError::PendWouldBlock)` - Non-blocking and not available
    pub fn pend(&mut self, timeout: OsTick, pend_opt: OsOpt) -> OsResult<OsSemCtr> {
        if kernel::KERNEL.int_nesting() > 0 {
            return Err(OsError::PendIsr);
        }

        if !kernel::KERNEL.is_running() {
            return Err(OsError::OsNotRunning);
        }

        self.chk_obj_type()?;

        if timeout > 0 && !CFG_TICK_EN {
            return Err(OsError::TickDisabled);
        }

        let cur_tcb_ptr;
        {
            let _cs = CriticalSection::enter();

            if self.ctr > 0 {
                self.ctr -= 1;
                return Ok(self.ctr);
            }

            if pend_opt & opt::PEND_NON_BLOCKING != 0 {
                return Err(OsError::PendWouldBlock);
            }

            if kernel::KERNEL.sched_lock_nesting() > 0 {
                return Err(OsError::SchedLocked);
            }

            cur_tcb_ptr = unsafe { kernel::tcb_cur_ptr() }.ok_or(OsError::TcbInvalid)?;
            let sem = NonNull::from(&mut *self);
            unsafe {
                pend::pend_block(cur_tcb_ptr, OsPendOn::Sem(sem), timeout);
            }
        }

        sched::os_sched();

        let _cs = CriticalSection::enter();
        let cur_tcb = unsafe { cur_tcb_ptr.as_ref() };
        match cur_tcb.pend_status {
            OsPendStatus::Ok => Ok(self.ctr),
            OsPendStatus::Timeout => Err(OsError::Timeout),
            OsPendStatus::Abort => Err(OsError::PendAbort),
            OsPendStatus::Del => Err(OsError::ObjDel),
        }
    }

    /// Signal (post) the semaphore. Safe to call from an ISR.
    ///
    /// # Returns
    /// * `Ok(count)` - Count after the post
    /// * `Err(OsError::SemOvf)` - Counter overflow
    pub fn post(&mut self, post_opt: OsOpt) -> OsResult<OsSemCtr> {
        if !kernel::KERNEL.is_running() {
            return Err(OsError::OsNotRunning);
        }

        self.chk_obj_type()?;

        let woke;
        {
            let _cs = CriticalSection::enter();

            let ts = crate::port::os_ts_get();
            self.ts = ts;

            match self.pend_list.head() {
                Some(waiter) => {
                    unsafe {
                        pend::post_wake(waiter, core::ptr::null(), 0, ts);
                    }
                    woke = true;
                }
                None => {
                    if self.ctr == OsSemCtr::MAX {
                        return Err(OsError::SemOvf);
                    }
                    self.ctr += 1;
                    woke = false;
                }
            }
        }

        if woke && post_opt & opt::POST_NO_SCHED == 0 {
            sched::os_sched();
        }

        Ok(self.ctr)
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

    /// Reset the counter. Fails when tasks are waiting.
    pub fn set(&mut self, ctr: OsSemCtr) -> OsResult<()> {
        if kernel::KERNEL.int_nesting() > 0 {
            return Err(OsError::AcceptIsr);
        }

        self.chk_obj_type()?;

        let _cs = CriticalSection::enter();

        if !self.pend_list.is_empty() {
            return Err(OsError::TaskWaiting);
        }

        self.ctr = ctr;
        Ok(())
    }

    /// Delete the semaphore
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
            self.ctr = 0;
        }

        sched::os_sched();

        Ok(qty)
    }

    /// Get current semaphore count
    #[inline(always)]
    pub fn count(&self) -> OsSemCtr {
        self.ctr
    }

    /// Timestamp of the last post
    #[inline(always)]
    pub fn ts(&self) -> OsTs {
        self.ts
    }
}

impl Default for OsSem {
    fn default() -> Self {
        Self::new(0)
    }
}

unsafe impl Send for OsSem {}
unsafe impl Sync for OsSem {}

// ============ Safe Wrapper ============

use core::cell::UnsafeCell;

/// Shareable semaphore handle for `static` placement
pub struct Semaphore {
    inner: UnsafeCell<OsSem>,
}

unsafe impl Sync for Semaphore {}
unsafe impl Send for Semaphore {}

impl Semaphore {
    pub const fn new(ctr: OsSemCtr) -> Self {
        Semaphore {
            inner: UnsafeCell::new(OsSem::new(ctr)),
        }
    }

    pub fn create(&self, ctr: OsSemCtr, name: &'static str) -> OsResult<()> {
        unsafe { (*self.inner.get()).create(ctr, name) }
    }

    pub fn wait(&self, timeout: OsTick, pend_opt: OsOpt) -> OsResult<OsSemCtr> {
        unsafe { (*self.inner.get()).pend(timeout, pend_opt) }
    }

    pub fn signal(&self, post_opt: OsOpt) -> OsResult<OsSemCtr> {
        unsafe { (*self.inner.get()).post(post_opt) }
    }

    pub fn pend_abort(&self, abort_opt: OsOpt) -> OsResult<OsObjQty> {
        unsafe { (*self.inner.get()).pend_abort(abort_opt) }
    }

    pub fn set(&self, ctr: OsSemCtr) -> OsResult<()> {
        unsafe { (*self.inner.get()).set(ctr) }
    }

    pub fn delete(&self, del_opt: OsOpt) -> OsResult<OsObjQty> {
        unsafe { (*self.inner.get()).del(del_opt) }
    }

    #[inline]
    pub fn count(&self) -> OsSemCtr {
        unsafe { (*self.inner.get()).count() }
    }
}

impl Default for Semaphore {
    fn default() -> Self {
        Self::new(0)
    }
}
