//! Unit tests for core kernel modules
//!
//! These tests run on the host (not embedded target) to verify the core
//! data structures and algorithms. They only build local instances; the
//! global kernel singletons are never mutated, so the suite is safe under
//! the parallel test harness.

#[cfg(test)]
mod prio_tests {
    use kestrel::config::{CFG_PRIO_IDLE, CFG_PRIO_MAX};
    use kestrel::prio::PrioTable;

    #[test]
    fn idle_priority_when_no_bucket_is_ready() {
        // An empty bitmap must resolve to the idle priority, which is how
        // the scheduler falls back to the idle task.
        let table = PrioTable::new();
        assert!(table.is_empty());
        assert_eq!(table.get_highest(), CFG_PRIO_IDLE);
    }

    #[test]
    fn preemption_order_under_churn() {
        // Simulate tasks blocking and unblocking around a mid-priority
        // runner: the highest set bit must track every transition.
        let mut table = PrioTable::new();

        table.insert(CFG_PRIO_IDLE);
        assert_eq!(table.get_highest(), CFG_PRIO_IDLE);

        table.insert(24); // app task becomes ready
        assert_eq!(table.get_highest(), 24);

        table.insert(7); // higher-priority task preempts
        assert_eq!(table.get_highest(), 7);

        table.remove(7); // it blocks again
        assert_eq!(table.get_highest(), 24);

        table.insert(7); // and wakes once more
        table.insert(3);
        assert_eq!(table.get_highest(), 3);

        table.remove(3);
        table.remove(7);
        table.remove(24);
        assert_eq!(table.get_highest(), CFG_PRIO_IDLE);
    }

    #[test]
    fn each_priority_round_trips_independently() {
        // Priorities spanning word boundaries must not disturb each other.
        let samples: &[u8] = &[0, 1, 30, 31, 32, 33, 62, CFG_PRIO_IDLE];

        for &p in samples {
            let mut table = PrioTable::new();
            table.insert(p);
            assert!(table.is_set(p));
            assert_eq!(table.get_highest(), p);

            for &q in samples {
                if q != p {
                    assert!(!table.is_set(q), "bit {} leaked into {}", p, q);
                }
            }

            table.remove(p);
            assert!(table.is_empty());
        }
    }

    #[test]
    fn duplicate_insert_collapses_to_one_bit() {
        // The bitmap tracks bucket non-emptiness, not a count; a second
        // insert at the same priority is absorbed and a single remove
        // clears it. Callers must only remove once the bucket drains.
        let mut table = PrioTable::new();

        table.insert(12);
        table.insert(12);
        assert_eq!(table.get_highest(), 12);

        table.remove(12);
        assert!(!table.is_set(12));
        assert!(table.is_empty());
    }

    #[test]
    fn init_clears_a_populated_table() {
        let mut table = PrioTable::new();
        for p in (0..CFG_PRIO_MAX as u8).step_by(5) {
            table.insert(p);
        }
        assert_eq!(table.get_highest(), 0);

        table.init();
        assert!(table.is_empty());
        assert_eq!(table.get_highest(), CFG_PRIO_IDLE);
    }
}

#[cfg(test)]
mod rdy_list_tests {
    use core::ptr::NonNull;
    use kestrel::sched::ReadyList;
    use kestrel::OsTcb;

    #[test]
    fn test_fifo_order() {
        let mut list = ReadyList::new();
        let mut a = OsTcb::new();
        let mut b = OsTcb::new();
        let mut c = OsTcb::new();
        let (pa, pb, pc) = (
            NonNull::from(&mut a),
            NonNull::from(&mut b),
            NonNull::from(&mut c),
        );

        list.insert_tail(pa);
        list.insert_tail(pb);
        list.insert_tail(pc);

        assert_eq!(list.head(), Some(pa));
        assert_eq!(list.tail(), Some(pc));
        assert_eq!(list.nbr_entries(), 3);
    }

    #[test]
    fn test_insert_head() {
        let mut list = ReadyList::new();
        let mut a = OsTcb::new();
        let mut b = OsTcb::new();
        let (pa, pb) = (NonNull::from(&mut a), NonNull::from(&mut b));

        list.insert_tail(pa);
        list.insert_head(pb);

        assert_eq!(list.head(), Some(pb));
        assert_eq!(list.tail(), Some(pa));
    }

    #[test]
    fn test_remove_middle() {
        let mut list = ReadyList::new();
        let mut a = OsTcb::new();
        let mut b = OsTcb::new();
        let mut c = OsTcb::new();
        let (pa, pb, pc) = (
            NonNull::from(&mut a),
            NonNull::from(&mut b),
            NonNull::from(&mut c),
        );

        list.insert_tail(pa);
        list.insert_tail(pb);
        list.insert_tail(pc);

        list.remove(pb);
        assert_eq!(list.head(), Some(pa));
        assert_eq!(list.tail(), Some(pc));
        assert_eq!(list.nbr_entries(), 2);

        list.remove(pa);
        list.remove(pc);
        assert!(list.is_empty());
    }

    #[test]
    fn test_rotation() {
        let mut list = ReadyList::new();
        let mut a = OsTcb::new();
        let mut b = OsTcb::new();
        let mut c = OsTcb::new();
        let (pa, pb, pc) = (
            NonNull::from(&mut a),
            NonNull::from(&mut b),
            NonNull::from(&mut c),
        );

        list.insert_tail(pa);
        list.insert_tail(pb);
        list.insert_tail(pc);

        // A -> B -> C rotates to B -> C -> A
        list.move_head_to_tail();
        assert_eq!(list.head(), Some(pb));
        assert_eq!(list.tail(), Some(pa));

        list.move_head_to_tail();
        assert_eq!(list.head(), Some(pc));

        list.move_head_to_tail();
        assert_eq!(list.head(), Some(pa));
    }

    #[test]
    fn test_rotation_single_entry() {
        let mut list = ReadyList::new();
        let mut a = OsTcb::new();
        let pa = NonNull::from(&mut a);

        list.insert_tail(pa);
        list.move_head_to_tail();
        assert_eq!(list.head(), Some(pa));
        assert_eq!(list.nbr_entries(), 1);
    }
}

#[cfg(test)]
mod pend_list_tests {
    use core::ptr::NonNull;
    use kestrel::pend::PendList;
    use kestrel::OsTcb;

    fn tcb_with_prio(prio: u8) -> OsTcb {
        let mut tcb = OsTcb::new();
        tcb.prio = prio;
        tcb
    }

    #[test]
    fn test_priority_order() {
        let mut list = PendList::new();
        let mut lo = tcb_with_prio(30);
        let mut hi = tcb_with_prio(10);
        let mut mid = tcb_with_prio(20);
        let (plo, phi, pmid) = (
            NonNull::from(&mut lo),
            NonNull::from(&mut hi),
            NonNull::from(&mut mid),
        );

        list.insert_prio(plo);
        list.insert_prio(phi);
        list.insert_prio(pmid);

        // Head is the highest priority (lowest number)
        assert_eq!(list.head(), Some(phi));
        assert_eq!(list.nbr_entries(), 3);

        list.remove(phi);
        assert_eq!(list.head(), Some(pmid));

        list.remove(pmid);
        assert_eq!(list.head(), Some(plo));
    }

    #[test]
    fn test_equal_priority_fifo() {
        let mut list = PendList::new();
        let mut first = tcb_with_prio(8);
        let mut second = tcb_with_prio(8);
        let (pfirst, psecond) = (NonNull::from(&mut first), NonNull::from(&mut second));

        list.insert_prio(pfirst);
        list.insert_prio(psecond);

        assert_eq!(list.head(), Some(pfirst));
        list.remove(pfirst);
        assert_eq!(list.head(), Some(psecond));
    }

    #[test]
    fn test_remove_clears_links() {
        let mut list = PendList::new();
        let mut a = tcb_with_prio(5);
        let pa = NonNull::from(&mut a);

        list.insert_prio(pa);
        list.remove(pa);

        assert!(list.is_empty());
        assert_eq!(a.pend_next_ptr, None);
        assert_eq!(a.pend_prev_ptr, None);
    }

    #[test]
    fn test_reinsert_after_prio_change() {
        let mut list = PendList::new();
        let mut a = tcb_with_prio(10);
        let mut b = tcb_with_prio(20);
        let (pa, pb) = (NonNull::from(&mut a), NonNull::from(&mut b));

        list.insert_prio(pa);
        list.insert_prio(pb);
        assert_eq!(list.head(), Some(pa));

        // b's priority rises above a's: remove + re-insert keeps order
        list.remove(pb);
        unsafe { (*pb.as_ptr()).prio = 5 };
        list.insert_prio(pb);

        assert_eq!(list.head(), Some(pb));
    }
}

#[cfg(test)]
mod tick_list_tests {
    use core::ptr::NonNull;
    use kestrel::time::TickList;
    use kestrel::OsTcb;

    #[test]
    fn test_next_deadline_tracks_head() {
        let mut list = TickList::new();
        let mut a = OsTcb::new();
        let mut b = OsTcb::new();
        let (pa, pb) = (NonNull::from(&mut a), NonNull::from(&mut b));

        assert_eq!(list.next_deadline(), None);

        list.insert(pa, 100, 0);
        assert_eq!(list.next_deadline(), Some(100));

        list.insert(pb, 50, 0);
        assert_eq!(list.next_deadline(), Some(50));

        list.remove(pb);
        assert_eq!(list.next_deadline(), Some(100));
    }

    #[test]
    fn test_pop_expired_in_deadline_order() {
        let mut list = TickList::new();
        let mut a = OsTcb::new();
        let mut b = OsTcb::new();
        let mut c = OsTcb::new();
        let (pa, pb, pc) = (
            NonNull::from(&mut a),
            NonNull::from(&mut b),
            NonNull::from(&mut c),
        );

        list.insert(pa, 3, 0);
        list.insert(pb, 1, 0);
        list.insert(pc, 2, 0);

        // One big tick advance wakes everything, oldest deadline first
        assert_eq!(list.pop_expired(5), Some(pb));
        assert_eq!(list.pop_expired(5), Some(pc));
        assert_eq!(list.pop_expired(5), Some(pa));
        assert_eq!(list.pop_expired(5), None);
    }
}

#[cfg(test)]
mod msg_q_tests {
    use kestrel::msg::{OsMsgPool, OsMsgQ};

    #[test]
    fn test_interleaved_put_get() {
        let mut pool = OsMsgPool::new();
        pool.init();
        let mut q = OsMsgQ::new(3);

        q.put(&mut pool, 1 as *const (), 0, false, 0).unwrap();
        q.put(&mut pool, 2 as *const (), 0, false, 0).unwrap();
        assert_eq!(q.get(&mut pool).unwrap().0, 1 as *const ());

        q.put(&mut pool, 3 as *const (), 0, false, 0).unwrap();
        q.put(&mut pool, 4 as *const (), 0, false, 0).unwrap();

        assert_eq!(q.get(&mut pool).unwrap().0, 2 as *const ());
        assert_eq!(q.get(&mut pool).unwrap().0, 3 as *const ());
        assert_eq!(q.get(&mut pool).unwrap().0, 4 as *const ());
        assert!(q.is_empty());
    }

    #[test]
    fn test_flush_returns_nodes_to_pool() {
        let mut pool = OsMsgPool::new();
        pool.init();
        let free_before = pool.nbr_free();

        let mut q = OsMsgQ::new(8);
        for i in 0..5usize {
            q.put(&mut pool, i as *const (), i, false, 0).unwrap();
        }
        assert_eq!(q.flush(&mut pool), 5);
        assert_eq!(pool.nbr_free(), free_before);
    }
}

#[cfg(test)]
mod state_tests {
    use kestrel::types::OsTaskState;

    #[test]
    fn test_suspend_dimension_composition() {
        assert_eq!(OsTaskState::Ready.suspended(), OsTaskState::Suspended);
        assert_eq!(OsTaskState::Delayed.suspended(), OsTaskState::DelayedSuspended);
        assert_eq!(OsTaskState::Pend.suspended(), OsTaskState::PendSuspended);
        assert_eq!(
            OsTaskState::PendTimeout.suspended(),
            OsTaskState::PendTimeoutSuspended
        );

        // Idempotent on already-suspended states
        assert_eq!(OsTaskState::Suspended.suspended(), OsTaskState::Suspended);
    }

    #[test]
    fn test_resume_dimension_composition() {
        assert_eq!(OsTaskState::Suspended.resumed(), OsTaskState::Ready);
        assert_eq!(OsTaskState::DelayedSuspended.resumed(), OsTaskState::Delayed);
        assert_eq!(OsTaskState::PendSuspended.resumed(), OsTaskState::Pend);
        assert_eq!(
            OsTaskState::PendTimeoutSuspended.resumed(),
            OsTaskState::PendTimeout
        );

        // Round trip
        for state in [
            OsTaskState::Ready,
            OsTaskState::Delayed,
            OsTaskState::Pend,
            OsTaskState::PendTimeout,
        ] {
            assert_eq!(state.suspended().resumed(), state);
        }
    }

    #[test]
    fn test_predicates() {
        assert!(OsTaskState::PendTimeoutSuspended.is_pending());
        assert!(OsTaskState::PendTimeoutSuspended.is_suspended());
        assert!(OsTaskState::PendTimeoutSuspended.is_on_tick_list());
        assert!(!OsTaskState::PendTimeoutSuspended.is_delayed());

        assert!(OsTaskState::Delayed.is_on_tick_list());
        assert!(!OsTaskState::Pend.is_on_tick_list());
        assert!(!OsTaskState::Ready.is_suspended());
    }
}

#[cfg(test)]
mod mutex_tests {
    use kestrel::error::OsError;
    use kestrel::sync::mutex::{Mutex, OsMutex};
    use kestrel::types::opt;

    #[test]
    fn requires_running_kernel() {
        let mut m = OsMutex::new();
        assert_eq!(m.pend(0, opt::PEND_BLOCKING), Err(OsError::OsNotRunning));
        assert_eq!(m.post(opt::NONE), Err(OsError::OsNotRunning));
        assert_eq!(m.pend_abort(opt::PEND_ABORT_1), Err(OsError::OsNotRunning));
        assert_eq!(m.del(opt::DEL_ALWAYS), Err(OsError::OsNotRunning));
    }

    #[test]
    fn create_initializes_unowned() {
        let mut m = OsMutex::new();
        m.create("m").unwrap();
        assert!(!m.is_owned());
        assert_eq!(m.owner_prio(), None);
    }

    #[test]
    fn wrapper_guards_match_the_raw_object() {
        let m = Mutex::new();
        m.create("m").unwrap();
        assert_eq!(m.lock(0, opt::PEND_BLOCKING), Err(OsError::OsNotRunning));
        assert_eq!(m.unlock(opt::NONE), Err(OsError::OsNotRunning));
        assert!(!m.is_owned());
    }
}

#[cfg(test)]
mod api_guard_tests {
    use kestrel::error::OsError;
    use kestrel::sync::q::OsQ;
    use kestrel::sync::sem::OsSem;
    use kestrel::types::opt;

    #[test]
    fn test_sem_requires_running_kernel() {
        let mut sem = OsSem::new(1);
        assert_eq!(sem.pend(0, opt::PEND_BLOCKING), Err(OsError::OsNotRunning));
        assert_eq!(sem.post(opt::NONE), Err(OsError::OsNotRunning));
        assert_eq!(sem.count(), 1);
    }

    #[test]
    fn test_q_create_zero_capacity() {
        let mut q = OsQ::new(4);
        assert_eq!(q.create(0, "q"), Err(OsError::QSizeInvalid));
    }

    #[test]
    fn test_reg_id_bounds() {
        use kestrel::config::CFG_TASK_REG_TBL_SIZE;
        let bad_id = CFG_TASK_REG_TBL_SIZE as u8;
        assert_eq!(
            kestrel::task::os_task_reg_get(None, bad_id),
            Err(OsError::RegIdInvalid)
        );
        assert_eq!(
            kestrel::task::os_task_reg_set(None, bad_id, 0),
            Err(OsError::RegIdInvalid)
        );
    }

    #[test]
    fn test_time_dly_requires_running_kernel() {
        assert_eq!(
            kestrel::time::os_time_dly(10, opt::TIME_DLY),
            Err(OsError::OsNotRunning)
        );
    }

    #[test]
    fn test_hmsm_validation_precedes_state_checks() {
        assert_eq!(
            kestrel::time::os_time_dly_hmsm(0, 60, 0, 0, opt::TIME_HMSM_STRICT),
            Err(OsError::TimeInvalidMinutes)
        );
    }
}

#[cfg(test)]
mod error_tests {
    use kestrel::error::OsError;

    #[test]
    fn pend_outcomes_are_distinguishable() {
        // The four ways a blocking call can come back must stay distinct
        // codes: the caller's match on them is the whole outcome protocol.
        let outcomes = [
            OsError::Timeout,
            OsError::PendAbort,
            OsError::ObjDel,
            OsError::PendWouldBlock,
        ];

        for (i, a) in outcomes.iter().enumerate() {
            assert!(a.is_err());
            for b in outcomes.iter().skip(i + 1) {
                assert_ne!(a, b);
                assert_ne!(*a as u16, *b as u16);
            }
        }
    }

    #[test]
    fn only_none_counts_as_success() {
        assert!(OsError::None.is_ok());
        for err in [
            OsError::SemOvf,
            OsError::QMax,
            OsError::MutexOvf,
            OsError::MutexNotOwner,
            OsError::MutexNesting,
            OsError::TaskWaiting,
            OsError::TickDisabled,
            OsError::SchedLocked,
        ] {
            assert!(err.is_err());
            assert!(!err.is_ok());
        }
    }
}

#[cfg(test)]
mod types_tests {
    use kestrel::types::*;

    #[test]
    fn test_pend_status_enum() {
        let status = OsPendStatus::Ok;
        assert_eq!(status, OsPendStatus::Ok);
        assert_ne!(status, OsPendStatus::Timeout);
    }

    #[test]
    fn test_option_flags() {
        use kestrel::types::opt::*;

        assert_eq!(NONE, 0);
        assert_eq!(PEND_NON_BLOCKING, 0x8000);
        assert_eq!(POST_NO_SCHED, 0x8000);

        // Combining flags
        let combined = POST_LIFO | POST_ALL | POST_NO_SCHED;
        assert_eq!(combined & POST_LIFO, POST_LIFO);
        assert_eq!(combined & POST_ALL, POST_ALL);
        assert_eq!(combined & POST_NO_SCHED, POST_NO_SCHED);

        // The time options are distinct values
        assert_ne!(TIME_DLY, TIME_MATCH);
        assert_ne!(TIME_MATCH, TIME_TIMEOUT);
        assert_ne!(TIME_TIMEOUT, TIME_PERIODIC);
    }

    #[test]
    fn test_pend_on_nothing() {
        let pend_on = OsPendOn::Nothing;
        assert!(pend_on.is_nothing());
        assert_eq!(pend_on, OsPendOn::Nothing);
        assert_ne!(pend_on, OsPendOn::TaskSem);
    }
}

#[cfg(test)]
mod config_tests {
    use kestrel::config::*;

    #[test]
    fn idle_priority_is_reserved_lowest_slot() {
        // The idle task must occupy the numerically largest priority and
        // the bitmap's empty-table fallback must land on it.
        assert_eq!(CFG_PRIO_IDLE, (CFG_PRIO_MAX - 1) as u8);
        assert!(
            CFG_PRIO_MAX <= 256,
            "priorities must be addressable by OsPrio (u8)"
        );
    }

    #[test]
    fn nesting_counters_stay_below_their_type_limit() {
        // Both counters are u8 and capped, so the cap itself must leave
        // headroom for the cap comparison.
        assert!(CFG_ISR_NESTING_MAX > 0);
        assert!(CFG_ISR_NESTING_MAX < u8::MAX);
        assert!(CFG_SCHED_LOCK_MAX > 0);
        assert!(CFG_SCHED_LOCK_MAX < u8::MAX);
    }

    #[test]
    fn redzone_fits_inside_the_smallest_stack() {
        // A minimum-size stack must still have usable words above the
        // poisoned redzone and the port's initial frame.
        assert!(CFG_STK_REDZONE_DEPTH < CFG_STK_SIZE_MIN);
        assert!(CFG_IDLE_STK_SIZE >= CFG_STK_SIZE_MIN);
    }

    #[test]
    fn round_robin_default_quanta_is_usable() {
        // A zero default would make every tick rotate the bucket.
        assert!(CFG_TIME_QUANTA_DEFAULT > 0);
    }

    #[test]
    fn dynamic_tick_requires_the_tick_engine() {
        assert!(!CFG_DYN_TICK_EN || CFG_TICK_EN);
    }

    #[test]
    fn message_pool_is_addressable() {
        // Pool and queue bookkeeping use OsObjQty (u16) counters.
        assert!(CFG_MSG_POOL_SIZE > 0);
        assert!(CFG_MSG_POOL_SIZE <= u16::MAX as usize);
    }
}
