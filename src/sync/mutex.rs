//! Mutex implementation with transitive priority inheritance
//!
//! A mutex is owned by at most one task; re-acquisition by the owner
//! nests. A higher-priority waiter raises the owner's effective priority,
//! and the raise propagates through chains of blocked owners. On release
//! the owner's priority is recomputed from every mutex it still owns, and
//! ownership is handed to the highest-priority waiter atomically.

use core::ptr::NonNull;

use crate::config::{CFG_OBJ_TYPE_CHK_EN, CFG_TICK_EN};
use crate::critical::CriticalSection;
use crate::error::{OsError, OsResult};
use crate::kernel;
use crate::pend;
use crate::pend::PendList;
use crate::sched;
use crate::task::{task_change_prio_inner, OsTcb};
use crate::types::{
    opt, OsNestingCtr, OsObjQty, OsObjType, OsOpt, OsPendOn, OsPendStatus, OsPrio, OsTick, OsTs,
};

/// Mutex with priority inheritance
pub struct OsMutex {
    /// Object type marker
    obj_type: OsObjType,
    /// List of tasks waiting on this mutex
    pub(crate) pend_list: PendList,
    /// Task that owns the mutex
    pub(crate) owner: Option<NonNull<OsTcb>>,
    /// Nesting counter
    nesting_ctr: OsNestingCtr,
    /// Next mutex owned by the same task
    grp_next: Option<NonNull<OsMutex>>,
    /// Previous mutex owned by the same task
    grp_prev: Option<NonNull<OsMutex>>,
    /// Timestamp of the last release
    ts: OsTs,
    /// Name for debugging
    #[cfg(feature = "defmt")]
    name: &'static str,
}

impl OsMutex {
    /// Create a new mutex
    pub const fn new() -> Self {
        OsMutex {
            obj_type: OsObjType::Mutex,
            pend_list: PendList::new(),
            owner: None,
            nesting_ctr: 0,
            grp_next: None,
            grp_prev: None,
            ts: 0,
            #[cfg(feature = "defmt")]
            name: "",
        }
    }

    /// Initialize the mutex
    pub fn create(&mut self, _name: &'static str) -> OsResult<()> {
        if kernel::KERNEL.safety_critical_started() {
            return Err(OsError::IllegalCreateRunTime);
        }

        if kernel::KERNEL.int_nesting() > 0 {
            return Err(OsError::CreateIsr);
        }

        let _cs = CriticalSection::enter();
        self.obj_type = OsObjType::Mutex;
        self.pend_list.init();
        self.owner = None;
        self.nesting_ctr = 0;
        self.grp_next = None;
        self.grp_prev = None;
        self.ts = 0;
        #[cfg(feature = "defmt")]
        {
            self.name = _name;
        }
        Ok(())
    }

    fn chk_obj_type(&self) -> OsResult<()> {
        if CFG_OBJ_TYPE_CHK_EN && self.obj_type != OsObjType::Mutex {
            return Err(OsError::ObjType);
        }
        Ok(())
    }

    /// Acquire the mutex
    ///
    /// If the mutex is owned by a lower-priority task, the owner (and any
    /// chain of owners it is itself blocked behind) inherits the caller's
    /// priority until release.
    ///
    /// # Arguments
    /// * `timeout` - Maximum ticks to wait (0 = forever)
    /// * `pend_opt` - `PEND_BLOCKING` or `PEND_NON_BLOCKING`
    pub fn pend(&mut self, timeout: OsTick, pend_opt: OsOpt) -> OsResult<()> {
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

            cur_tcb_ptr = unsafe { kernel::tcb_cur_ptr() }.ok_or(OsError::TcbInvalid)?;
            let mutex = NonNull::from(&mut *self);

            match self.owner {
                None => {
                    self.owner = Some(cur_tcb_ptr);
                    self.nesting_ctr = 1;
                    unsafe {
                        grp_add(cur_tcb_ptr, mutex);
                    }
                    return Ok(());
                }
                Some(owner_ptr) if owner_ptr == cur_tcb_ptr => {
                    if self.nesting_ctr == OsNestingCtr::MAX {
                        return Err(OsError::MutexOvf);
                    }
                    self.nesting_ctr += 1;
                    return Ok(());
                }
                Some(owner_ptr) => {
                    if pend_opt & opt::PEND_NON_BLOCKING != 0 {
                        return Err(OsError::PendWouldBlock);
                    }

                    if kernel::KERNEL.sched_lock_nesting() > 0 {
                        return Err(OsError::SchedLocked);
                    }

                    // Priority inheritance, transitive through blocked owners
                    let cur_prio = unsafe { cur_tcb_ptr.as_ref().prio };
                    let owner_prio = unsafe { owner_ptr.as_ref().prio };
                    if cur_prio < owner_prio {
                        unsafe {
                            task_change_prio_inner(owner_ptr, cur_prio);
                        }
                    }

                    unsafe {
                        pend::pend_block(cur_tcb_ptr, OsPendOn::Mutex(mutex), timeout);
                    }
                }
            }
        }

        sched::os_sched();

        let _cs = CriticalSection::enter();
        let cur_tcb = unsafe { cur_tcb_ptr.as_ref() };
        match cur_tcb.pend_status {
            OsPendStatus::Ok => Ok(()),
            OsPendStatus::Timeout => Err(OsError::Timeout),
            OsPendStatus::Abort => Err(OsError::PendAbort),
            OsPendStatus::Del => Err(OsError::ObjDel),
        }
    }

    /// Release the mutex
    ///
    /// An inherited priority boost is rolled back to the highest waiter
    /// across the mutexes the caller still owns (or its base priority).
    /// The highest-priority waiter, if any, becomes the new owner.
    pub fn post(&mut self, post_opt: OsOpt) -> OsResult<()> {
        if kernel::KERNEL.int_nesting() > 0 {
            return Err(OsError::AcceptIsr);
        }

        if !kernel::KERNEL.is_running() {
            return Err(OsError::OsNotRunning);
        }

        self.chk_obj_type()?;

        {
            let _cs = CriticalSection::enter();

            let cur_tcb_ptr = unsafe { kernel::tcb_cur_ptr() }.ok_or(OsError::TcbInvalid)?;

            if self.owner != Some(cur_tcb_ptr) {
                return Err(OsError::MutexNotOwner);
            }

            if self.nesting_ctr == 0 {
                return Err(OsError::MutexNesting);
            }

            self.nesting_ctr -= 1;
            if self.nesting_ctr > 0 {
                // Caller still owns the mutex
                return Ok(());
            }

            let mutex = NonNull::from(&mut *self);
            unsafe {
                grp_remove(cur_tcb_ptr, mutex);
                disinherit(cur_tcb_ptr);
            }

            let ts = crate::port::os_ts_get();
            self.ts = ts;

            match self.pend_list.head() {
                Some(waiter) => unsafe {
                    self.owner = Some(waiter);
                    self.nesting_ctr = 1;
                    grp_add(waiter, mutex);
                    pend::post_wake(waiter, core::ptr::null(), 0, ts);
                },
                None => {
                    self.owner = None;
                }
            }
        }

        if post_opt & opt::POST_NO_SCHED == 0 {
            sched::os_sched();
        }

        Ok(())
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

    /// Delete the mutex
    ///
    /// `DEL_NO_PEND` refuses when tasks are waiting; `DEL_ALWAYS` wakes
    /// every waiter with `ObjDel`. An owner keeps running; its inherited
    /// priority, if any, is rolled back. Returns the number of waiters
    /// woken.
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

            if del_opt == opt::DEL_NO_PEND && !self.pend_list.is_empty() {
                return Err(OsError::TaskWaiting);
            }
            if del_opt != opt::DEL_NO_PEND && del_opt != opt::DEL_ALWAYS {
                return Err(OsError::OptInvalid);
            }

            let mutex = NonNull::from(&mut *self);
            if let Some(owner_ptr) = self.owner {
                unsafe {
                    grp_remove(owner_ptr, mutex);
                    disinherit(owner_ptr);
                }
            }

            let ts = crate::port::os_ts_get();
            while let Some(waiter) = self.pend_list.head() {
                unsafe {
                    pend::pend_abort_tcb(waiter, ts, OsPendStatus::Del);
                }
                qty += 1;
            }

            self.obj_type = OsObjType::None;
            self.owner = None;
            self.nesting_ctr = 0;
        }

        sched::os_sched();

        Ok(qty)
    }

    /// Check if mutex is owned
    #[inline]
    pub fn is_owned(&self) -> bool {
        self.owner.is_some()
    }

    /// Get owner's current priority
    pub fn owner_prio(&self) -> Option<OsPrio> {
        self.owner.map(|ptr| unsafe { ptr.as_ref().prio })
    }

    /// Timestamp of the last release
    #[inline(always)]
    pub fn ts(&self) -> OsTs {
        self.ts
    }
}

impl Default for OsMutex {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl Send for OsMutex {}
unsafe impl Sync for OsMutex {}

// ============ Mutex group (mutexes owned by one task) ============

/// Link a mutex into its new owner's group list.
///
/// # Safety
/// Caller must hold a critical section; the mutex must not be in any
/// group list.
pub(crate) unsafe fn grp_add(owner: NonNull<OsTcb>, mutex: NonNull<OsMutex>) {
    let owner_ref = unsafe { &mut *owner.as_ptr() };
    let mutex_ref = unsafe { &mut *mutex.as_ptr() };

    mutex_ref.grp_prev = None;
    mutex_ref.grp_next = owner_ref.mutex_grp_head;

    if let Some(old_head) = owner_ref.mutex_grp_head {
        unsafe {
            (*old_head.as_ptr()).grp_prev = Some(mutex);
        }
    }

    owner_ref.mutex_grp_head = Some(mutex);
}

/// Unlink a mutex from its owner's group list.
///
/// # Safety
/// Caller must hold a critical section; the mutex must be in `owner`'s
/// group list.
pub(crate) unsafe fn grp_remove(owner: NonNull<OsTcb>, mutex: NonNull<OsMutex>) {
    let owner_ref = unsafe { &mut *owner.as_ptr() };
    let mutex_ref = unsafe { &mut *mutex.as_ptr() };

    match mutex_ref.grp_prev {
        Some(prev) => unsafe {
            (*prev.as_ptr()).grp_next = mutex_ref.grp_next;
        },
        None => {
            owner_ref.mutex_grp_head = mutex_ref.grp_next;
        }
    }

    if let Some(next) = mutex_ref.grp_next {
        unsafe {
            (*next.as_ptr()).grp_prev = mutex_ref.grp_prev;
        }
    }

    mutex_ref.grp_next = None;
    mutex_ref.grp_prev = None;
}

/// Highest (numerically lowest) priority among all tasks waiting on any
/// mutex owned by `owner`; `OsPrio::MAX` when nobody waits.
///
/// # Safety
/// Caller must hold a critical section.
pub(crate) unsafe fn grp_prio_find_highest(owner: &OsTcb) -> OsPrio {
    let mut highest = OsPrio::MAX;
    let mut cursor = owner.mutex_grp_head;

    while let Some(mutex) = cursor {
        let mutex_ref = unsafe { mutex.as_ref() };
        if let Some(head) = mutex_ref.pend_list.head() {
            let prio = unsafe { head.as_ref().prio };
            if prio < highest {
                highest = prio;
            }
        }
        cursor = mutex_ref.grp_next;
    }

    highest
}

/// As [`grp_prio_find_highest`] but ignoring one waiter that is about to
/// leave its pend list.
///
/// # Safety
/// Caller must hold a critical section.
pub(crate) unsafe fn grp_prio_find_highest_except(owner: &OsTcb, excl: &OsTcb) -> OsPrio {
    let excl_ptr = excl as *const OsTcb;
    let mut highest = OsPrio::MAX;
    let mut cursor = owner.mutex_grp_head;

    while let Some(mutex) = cursor {
        let mutex_ref = unsafe { mutex.as_ref() };
        let mut waiter = mutex_ref.pend_list.head();
        while let Some(w) = waiter {
            if w.as_ptr() as *const OsTcb != excl_ptr {
                let prio = unsafe { w.as_ref().prio };
                if prio < highest {
                    highest = prio;
                }
                break;
            }
            waiter = unsafe { w.as_ref().pend_next_ptr };
        }
        cursor = mutex_ref.grp_next;
    }

    highest
}

/// Roll an owner's priority back to its base or to the highest remaining
/// waiter across its mutex group, whichever is higher priority.
///
/// # Safety
/// Caller must hold a critical section.
unsafe fn disinherit(owner: NonNull<OsTcb>) {
    let owner_ref = unsafe { owner.as_ref() };
    if owner_ref.prio == owner_ref.base_prio {
        return;
    }

    let highest = unsafe { grp_prio_find_highest(owner_ref) };
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

/// Release every mutex a dying task owns; each is handed to its
/// highest-priority waiter or freed.
///
/// # Safety
/// Caller must hold a critical section; `owner` is being deleted and is
/// no longer schedulable.
pub(crate) unsafe fn grp_post_all(owner: NonNull<OsTcb>) {
    loop {
        let head = unsafe { (*owner.as_ptr()).mutex_grp_head };
        let mutex = match head {
            Some(mutex) => mutex,
            None => return,
        };

        unsafe {
            grp_remove(owner, mutex);
        }

        let mutex_ref = unsafe { &mut *mutex.as_ptr() };
        match mutex_ref.pend_list.head() {
            Some(waiter) => unsafe {
                mutex_ref.owner = Some(waiter);
                mutex_ref.nesting_ctr = 1;
                grp_add(waiter, mutex);
                let ts = crate::port::os_ts_get();
                mutex_ref.ts = ts;
                pend::post_wake(waiter, core::ptr::null(), 0, ts);
            },
            None => {
                mutex_ref.owner = None;
                mutex_ref.nesting_ctr = 0;
            }
        }
    }
}

// ============ Safe Wrapper ============

use core::cell::UnsafeCell;

/// Shareable mutex handle for `static` placement
pub struct Mutex {
    inner: UnsafeCell<OsMutex>,
}

unsafe impl Sync for Mutex {}
unsafe impl Send for Mutex {}

impl Mutex {
    pub const fn new() -> Self {
        Mutex {
            inner: UnsafeCell::new(OsMutex::new()),
        }
    }

    pub fn create(&self, name: &'static str) -> OsResult<()> {
        unsafe { (*self.inner.get()).create(name) }
    }

    pub fn lock(&self, timeout: OsTick, pend_opt: OsOpt) -> OsResult<()> {
        unsafe { (*self.inner.get()).pend(timeout, pend_opt) }
    }

    pub fn unlock(&self, post_opt: OsOpt) -> OsResult<()> {
        unsafe { (*self.inner.get()).post(post_opt) }
    }

    pub fn pend_abort(&self, abort_opt: OsOpt) -> OsResult<OsObjQty> {
        unsafe { (*self.inner.get()).pend_abort(abort_opt) }
    }

    pub fn delete(&self, del_opt: OsOpt) -> OsResult<OsObjQty> {
        unsafe { (*self.inner.get()).del(del_opt) }
    }

    #[inline]
    pub fn is_owned(&self) -> bool {
        unsafe { (*self.inner.get()).is_owned() }
    }
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OsTaskState;

    fn tcb_with_prio(prio: OsPrio) -> OsTcb {
        let mut tcb = OsTcb::new();
        tcb.prio = prio;
        tcb.base_prio = prio;
        tcb
    }

    #[test]
    fn group_tracks_owned_mutexes() {
        let mut owner = tcb_with_prio(12);
        let powner = NonNull::from(&mut owner);
        let mut m1 = OsMutex::new();
        let mut m2 = OsMutex::new();
        let (pm1, pm2) = (NonNull::from(&mut m1), NonNull::from(&mut m2));

        unsafe {
            grp_add(powner, pm1);
            grp_add(powner, pm2);
        }
        // Newest acquisition sits at the head
        assert_eq!(owner.mutex_grp_head, Some(pm2));

        unsafe {
            grp_remove(powner, pm2);
        }
        assert_eq!(owner.mutex_grp_head, Some(pm1));

        unsafe {
            grp_remove(powner, pm1);
        }
        assert!(owner.mutex_grp_head.is_none());
    }

    #[test]
    fn group_highest_scans_every_owned_pend_list() {
        let mut owner = tcb_with_prio(8);
        let powner = NonNull::from(&mut owner);
        let mut m1 = OsMutex::new();
        let mut m2 = OsMutex::new();
        let mut w_low = tcb_with_prio(20);
        let mut w_high = tcb_with_prio(15);

        unsafe {
            grp_add(powner, NonNull::from(&mut m1));
            grp_add(powner, NonNull::from(&mut m2));
        }

        // No waiters anywhere: nothing to inherit from
        assert_eq!(unsafe { grp_prio_find_highest(&owner) }, OsPrio::MAX);

        m1.pend_list.insert_prio(NonNull::from(&mut w_low));
        m2.pend_list.insert_prio(NonNull::from(&mut w_high));

        assert_eq!(unsafe { grp_prio_find_highest(&owner) }, 15);
        // The waiter about to leave must not count toward the boost
        assert_eq!(
            unsafe { grp_prio_find_highest_except(&owner, &w_high) },
            20
        );
    }

    #[test]
    fn disinherit_rolls_back_to_highest_remaining_waiter() {
        // Suspended owner: the rollback is a pure priority update, no
        // ready-list motion.
        let mut owner = tcb_with_prio(30);
        owner.prio = 10; // inherited boost
        owner.task_state = OsTaskState::Suspended;
        let powner = NonNull::from(&mut owner);

        let mut m = OsMutex::new();
        let mut waiter = tcb_with_prio(20);
        m.pend_list.insert_prio(NonNull::from(&mut waiter));
        unsafe {
            grp_add(powner, NonNull::from(&mut m));
        }

        // A waiter at 20 still justifies a partial boost
        unsafe {
            disinherit(powner);
        }
        assert_eq!(owner.prio, 20);
        assert_eq!(owner.base_prio, 30);

        // With the group empty the base priority comes back
        unsafe {
            grp_remove(powner, NonNull::from(&mut m));
            disinherit(powner);
        }
        assert_eq!(owner.prio, 30);
    }

    #[test]
    fn raise_propagates_through_a_blocked_owner_chain() {
        // l owns m1; q is blocked on m1 and itself owns m2. Raising q
        // (as a pend on m2 by a higher-priority task would) must reach l.
        let mut l = tcb_with_prio(30);
        l.task_state = OsTaskState::Delayed;
        let pl = NonNull::from(&mut l);

        let mut m1 = OsMutex::new();
        let pm1 = NonNull::from(&mut m1);

        let mut q = tcb_with_prio(20);
        q.task_state = OsTaskState::Pend;
        q.pend_on = OsPendOn::Mutex(pm1);
        let pq = NonNull::from(&mut q);

        unsafe {
            grp_add(pl, pm1);
        }
        m1.owner = Some(pl);
        m1.nesting_ctr = 1;
        m1.pend_list.insert_prio(pq);

        unsafe {
            task_change_prio_inner(pq, 10);
        }

        assert_eq!(q.prio, 10);
        assert_eq!(l.prio, 10);
        assert_eq!(l.base_prio, 30);
        assert_eq!(m1.pend_list.head(), Some(pq));
    }

    #[test]
    fn nesting_overflow_is_reported() {
        // Fake a running kernel around a local current task; the
        // re-acquisition path never blocks or reschedules.
        let mut cur = tcb_with_prio(5);
        let mut m = OsMutex::new();

        unsafe {
            crate::kernel::CPU_STATE.tcb_cur = &mut cur as *mut OsTcb;
        }
        crate::kernel::KERNEL.set_running(true);

        assert_eq!(m.pend(0, opt::PEND_BLOCKING), Ok(()));
        assert!(m.is_owned());
        assert_eq!(m.owner_prio(), Some(5));

        for _ in 1..OsNestingCtr::MAX {
            assert_eq!(m.pend(0, opt::PEND_BLOCKING), Ok(()));
        }
        assert_eq!(m.pend(0, opt::PEND_BLOCKING), Err(OsError::MutexOvf));

        // Matching releases unwind the nesting; the last one frees it
        for _ in 1..OsNestingCtr::MAX {
            assert_eq!(m.post(opt::POST_NO_SCHED), Ok(()));
        }
        assert_eq!(m.post(opt::POST_NO_SCHED), Ok(()));
        assert!(!m.is_owned());
        assert!(cur.mutex_grp_head.is_none());

        // One release too many is a protocol violation
        assert_eq!(m.post(opt::POST_NO_SCHED), Err(OsError::MutexNotOwner));

        crate::kernel::KERNEL.set_running(false);
        unsafe {
            crate::kernel::CPU_STATE.tcb_cur = core::ptr::null_mut();
        }
    }
}
