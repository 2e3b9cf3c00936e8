//! Message queue implementation
//!
//! Bounded queues of `(pointer, size, timestamp)` messages. Posting to a
//! queue with waiters hands the message straight to the highest-priority
//! waiter (or every waiter with `POST_ALL`); otherwise the message is
//! buffered FIFO or LIFO, bounded by the queue capacity.

use core::ptr::NonNull;

use crate::config::{CFG_OBJ_TYPE_CHK_EN, CFG_TICK_EN};
use crate::critical::CriticalSection;
use crate::error::{OsError, OsResult};
use crate::kernel;
use crate::msg::OsMsgQ;
use crate::pend;
use crate::pend::PendList;
use crate::sched;
use crate::types::{
    opt, OsMsgSize, OsObjQty, OsObjType, OsOpt, OsPendOn, OsPendStatus, OsTick, OsTs,
};

/// Message queue
pub struct OsQ {
    /// Object type marker
    obj_type: OsObjType,
    /// List of tasks waiting on this queue
    pub(crate) pend_list: PendList,
    /// Buffered messages
    msg_q: OsMsgQ,
    /// Timestamp of the last post
    ts: OsTs,
    /// Name for debugging
    #[cfg(feature = "defmt")]
    name: &'static str,
}

impl OsQ {
    /// Create a new queue with the given capacity
    pub const fn new(max: OsObjQty) -> Self {
        OsQ {
            obj_type: OsObjType::Queue,
            pend_list: PendList::new(),
            msg_q: OsMsgQ::new(max),
            ts: 0,
            #[cfg(feature = "defmt")]
            name: "",
        }
    }

    /// Initialize/create the queue
    pub fn create(&mut self, max: OsObjQty, _name: &'static str) -> OsResult<()> {
        if kernel::KERNEL.safety_critical_started() {
            return Err(OsError::IllegalCreateRunTime);
        }

        if kernel::KERNEL.int_nesting() > 0 {
            return Err(OsError::CreateIsr);
        }

        if max == 0 {
            return Err(OsError::QSizeInvalid);
        }

        let _cs = CriticalSection::enter();
        self.obj_type = OsObjType::Queue;
        self.pend_list.init();
        self.msg_q.init(max);
        self.ts = 0;
        #[cfg(feature = "defmt")]
        {
            self.name = _name;
        }
        Ok(())
    }

    fn chk_obj_type(&self) -> OsResult<()> {
        if CFG_OBJ_TYPE_CHK_EN && self.obj_type != OsObjType::Queue {
            return Err(OsError::ObjType);
        }
        Ok(())
    }

    /// Wait for a message
    ///
    /// # Arguments
    /// * `timeout` - Maximum ticks to wait (0 = forever)
    /// * `pend_opt` - `PEND_BLOCKING` or `PEND_NON_BLOCKING`
    ///
    /// # Returns
    /// The message pointer and size.
    pub fn pend(&mut self, timeout: OsTick, pend_opt: OsOpt) -> OsResult<(*const (), OsMsgSize)> {
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

            if let Some((msg_ptr, msg_size, _ts)) = self.msg_q.get(unsafe { crate::msg::pool() }) {
                return Ok((msg_ptr, msg_size));
            }

            if pend_opt & opt::PEND_NON_BLOCKING != 0 {
                return Err(OsError::PendWouldBlock);
            }

            if kernel::KERNEL.sched_lock_nesting() > 0 {
                return Err(OsError::SchedLocked);
            }

            cur_tcb_ptr = unsafe { kernel::tcb_cur_ptr() }.ok_or(OsError::TcbInvalid)?;
            let q = NonNull::from(&mut *self);
            unsafe {
                pend::pend_block(cur_tcb_ptr, OsPendOn::Queue(q), timeout);
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

    /// Post a message. Safe to call from an ISR.
    ///
    /// # Arguments
    /// * `msg_ptr`, `msg_size` - The message
    /// * `post_opt` - `POST_FIFO` or `POST_LIFO`, optionally `| POST_ALL`
    ///   (deliver to every waiter) and/or `| POST_NO_SCHED`
    ///
    /// # Returns
    /// * `Err(OsError::QMax)` - queue full (no waiter to deliver to)
    pub fn post(&mut self, msg_ptr: *const (), msg_size: OsMsgSize, post_opt: OsOpt) -> OsResult<()> {
        if !kernel::KERNEL.is_running() {
            return Err(OsError::OsNotRunning);
        }

        self.chk_obj_type()?;

        let woke;
        {
            let _cs = CriticalSection::enter();

            let ts = crate::port::os_ts_get();
            self.ts = ts;

            if self.pend_list.is_empty() {
                let lifo = post_opt & opt::POST_LIFO != 0;
                self.msg_q
                    .put(unsafe { crate::msg::pool() }, msg_ptr, msg_size, lifo, ts)?;
                woke = false;
            } else {
                let mut cursor = self.pend_list.head();
                while let Some(waiter) = cursor {
                    cursor = unsafe { waiter.as_ref().pend_next_ptr };
                    unsafe {
                        pend::post_wake(waiter, msg_ptr, msg_size, ts);
                    }
                    if post_opt & opt::POST_ALL == 0 {
                        break;
                    }
                }
                woke = true;
            }
        }

        if woke && post_opt & opt::POST_NO_SCHED == 0 {
            sched::os_sched();
        }

        Ok(())
    }

    /// Drop every buffered message, returning the number dropped
    ///
    /// Waiters are unaffected (a queue with waiters has no buffered
    /// messages).
    pub fn flush(&mut self) -> OsResult<OsObjQty> {
        if kernel::KERNEL.int_nesting() > 0 {
            return Err(OsError::FlushIsr);
        }

        self.chk_obj_type()?;

        let _cs = CriticalSection::enter();
        Ok(self.msg_q.flush(unsafe { crate::msg::pool() }))
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

    /// Delete the queue
    ///
    /// `DEL_NO_PEND` refuses when tasks are waiting; `DEL_ALWAYS` wakes
    /// every waiter with `ObjDel`. Buffered messages are flushed back to
    /// the pool. Returns the number of waiters woken.
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

            self.msg_q.flush(unsafe { crate::msg::pool() });
            self.obj_type = OsObjType::None;
        }

        sched::os_sched();

        Ok(qty)
    }

    /// Number of buffered messages
    #[inline(always)]
    pub fn nbr_entries(&self) -> OsObjQty {
        self.msg_q.nbr_entries()
    }

    /// Timestamp of the last post
    #[inline(always)]
    pub fn ts(&self) -> OsTs {
        self.ts
    }
}

unsafe impl Send for OsQ {}
unsafe impl Sync for OsQ {}

// ============ Safe Wrapper ============

use core::cell::UnsafeCell;

/// Shareable queue handle for `static` placement
pub struct Queue {
    inner: UnsafeCell<OsQ>,
}

unsafe impl Sync for Queue {}
unsafe impl Send for Queue {}

impl Queue {
    pub const fn new(max: OsObjQty) -> Self {
        Queue {
            inner: UnsafeCell::new(OsQ::new(max)),
        }
    }

    pub fn create(&self, max: OsObjQty, name: &'static str) -> OsResult<()> {
        unsafe { (*self.inner.get()).create(max, name) }
    }

    pub fn receive(&self, timeout: OsTick, pend_opt: OsOpt) -> OsResult<(*const (), OsMsgSize)> {
        unsafe { (*self.inner.get()).pend(timeout, pend_opt) }
    }

    pub fn send(&self, msg_ptr: *const (), msg_size: OsMsgSize, post_opt: OsOpt) -> OsResult<()> {
        unsafe { (*self.inner.get()).post(msg_ptr, msg_size, post_opt) }
    }

    pub fn flush(&self) -> OsResult<OsObjQty> {
        unsafe { (*self.inner.get()).flush() }
    }

    pub fn pend_abort(&self, abort_opt: OsOpt) -> OsResult<OsObjQty> {
        unsafe { (*self.inner.get()).pend_abort(abort_opt) }
    }

    pub fn delete(&self, del_opt: OsOpt) -> OsResult<OsObjQty> {
        unsafe { (*self.inner.get()).del(del_opt) }
    }

    #[inline]
    pub fn nbr_entries(&self) -> OsObjQty {
        unsafe { (*self.inner.get()).nbr_entries() }
    }
}
