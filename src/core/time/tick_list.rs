//! Tick list - delayed and timing-out tasks ordered by deadline
//!
//! A single doubly linked list of TCBs sorted by absolute expiry tick.
//! Comparisons are wrap-aware (deadlines live within half the tick range
//! of the current counter), so the list stays correct across tick counter
//! wrap. The head is always the next task to wake, which also gives the
//! dynamic-tick mode its next one-shot deadline.

use core::ptr::NonNull;

use crate::task::OsTcb;
use crate::types::{OsObjQty, OsTick};

/// Ordered list of time-waiting TCBs
#[derive(Debug)]
pub struct TickList {
    head: Option<NonNull<OsTcb>>,
    tail: Option<NonNull<OsTcb>>,
    entries: OsObjQty,
}

impl TickList {
    pub const fn new() -> Self {
        TickList {
            head: None,
            tail: None,
            entries: 0,
        }
    }

    pub fn init(&mut self) {
        self.head = None;
        self.tail = None;
        self.entries = 0;
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    #[inline]
    pub fn nbr_entries(&self) -> OsObjQty {
        self.entries
    }

    /// Absolute deadline of the next task to wake, if any
    #[inline]
    pub fn next_deadline(&self) -> Option<OsTick> {
        self.head.map(|tcb| unsafe { tcb.as_ref().tick_deadline })
    }

    /// Insert a task sorted by `deadline`; equal deadlines keep FIFO order.
    ///
    /// # Safety
    /// Caller must hold a critical section; `tcb` must not be in the list.
    pub fn insert(&mut self, tcb: NonNull<OsTcb>, deadline: OsTick, now: OsTick) {
        let delta = deadline.wrapping_sub(now);

        let tcb_ref = unsafe { &mut *tcb.as_ptr() };
        tcb_ref.tick_deadline = deadline;

        let mut current = self.head;
        let mut prev: Option<NonNull<OsTcb>> = None;

        while let Some(cur_ptr) = current {
            let cur_ref = unsafe { cur_ptr.as_ref() };
            let cur_delta = cur_ref.tick_deadline.wrapping_sub(now);
            if delta < cur_delta {
                break;
            }
            prev = current;
            current = cur_ref.tick_next_ptr;
        }

        tcb_ref.tick_prev_ptr = prev;
        tcb_ref.tick_next_ptr = current;

        match prev {
            Some(p) => {
                unsafe { (*p.as_ptr()).tick_next_ptr = Some(tcb) };
            }
            None => {
                self.head = Some(tcb);
            }
        }

        match current {
            Some(c) => {
                unsafe { (*c.as_ptr()).tick_prev_ptr = Some(tcb) };
            }
            None => {
                self.tail = Some(tcb);
            }
        }

        self.entries += 1;
    }

    /// Remove a task from the list.
    ///
    /// # Safety
    /// Caller must hold a critical section; `tcb` must be in this list.
    pub fn remove(&mut self, tcb: NonNull<OsTcb>) {
        let tcb_ref = unsafe { &mut *tcb.as_ptr() };

        match tcb_ref.tick_prev_ptr {
            Some(prev) => {
                unsafe { (*prev.as_ptr()).tick_next_ptr = tcb_ref.tick_next_ptr };
            }
            None => {
                self.head = tcb_ref.tick_next_ptr;
            }
        }

        match tcb_ref.tick_next_ptr {
            Some(next) => {
                unsafe { (*next.as_ptr()).tick_prev_ptr = tcb_ref.tick_prev_ptr };
            }
            None => {
                self.tail = tcb_ref.tick_prev_ptr;
            }
        }

        tcb_ref.tick_prev_ptr = None;
        tcb_ref.tick_next_ptr = None;

        self.entries = self.entries.saturating_sub(1);
    }

    /// Detach and return the head if its deadline has been reached.
    ///
    /// Call repeatedly to drain every expired entry after advancing the
    /// tick counter.
    pub fn pop_expired(&mut self, now: OsTick) -> Option<NonNull<OsTcb>> {
        let head = self.head?;
        let deadline = unsafe { head.as_ref().tick_deadline };
        if (now.wrapping_sub(deadline) as i32) >= 0 {
            self.remove(head);
            Some(head)
        } else {
            None
        }
    }
}

impl Default for TickList {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl Send for TickList {}
unsafe impl Sync for TickList {}

#[cfg(test)]
mod tests {
    use super::*;

    fn tcb() -> OsTcb {
        OsTcb::new()
    }

    #[test]
    fn sorted_by_deadline() {
        let mut list = TickList::new();
        let mut a = tcb();
        let mut b = tcb();
        let mut c = tcb();
        let (pa, pb, pc) = (
            NonNull::from(&mut a),
            NonNull::from(&mut b),
            NonNull::from(&mut c),
        );

        list.insert(pa, 30, 0);
        list.insert(pb, 10, 0);
        list.insert(pc, 20, 0);

        assert_eq!(list.next_deadline(), Some(10));
        assert_eq!(list.pop_expired(10), Some(pb));
        assert_eq!(list.next_deadline(), Some(20));
        assert_eq!(list.pop_expired(15), None);
        assert_eq!(list.pop_expired(30), Some(pc));
        assert_eq!(list.pop_expired(30), Some(pa));
        assert!(list.is_empty());
    }

    #[test]
    fn equal_deadlines_fifo() {
        let mut list = TickList::new();
        let mut a = tcb();
        let mut b = tcb();
        let (pa, pb) = (NonNull::from(&mut a), NonNull::from(&mut b));

        list.insert(pa, 5, 0);
        list.insert(pb, 5, 0);

        assert_eq!(list.pop_expired(5), Some(pa));
        assert_eq!(list.pop_expired(5), Some(pb));
    }

    #[test]
    fn remove_middle() {
        let mut list = TickList::new();
        let mut a = tcb();
        let mut b = tcb();
        let mut c = tcb();
        let (pa, pb, pc) = (
            NonNull::from(&mut a),
            NonNull::from(&mut b),
            NonNull::from(&mut c),
        );

        list.insert(pa, 1, 0);
        list.insert(pb, 2, 0);
        list.insert(pc, 3, 0);

        list.remove(pb);
        assert_eq!(list.nbr_entries(), 2);
        assert_eq!(list.pop_expired(3), Some(pa));
        assert_eq!(list.pop_expired(3), Some(pc));
    }

    #[test]
    fn deadline_across_wrap() {
        let now = OsTick::MAX - 2;
        let mut list = TickList::new();
        let mut a = tcb();
        let mut b = tcb();
        let (pa, pb) = (NonNull::from(&mut a), NonNull::from(&mut b));

        // a expires after the counter wraps, b just before
        list.insert(pa, now.wrapping_add(10), now);
        list.insert(pb, now.wrapping_add(1), now);

        assert_eq!(list.next_deadline(), Some(OsTick::MAX - 1));
        assert_eq!(list.pop_expired(OsTick::MAX - 1), Some(pb));
        assert_eq!(list.pop_expired(OsTick::MAX), None);
        assert_eq!(list.pop_expired(now.wrapping_add(10)), Some(pa));
    }
}
