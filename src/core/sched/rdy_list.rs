//! Ready list - doubly linked list of TCBs at a given priority
//!
//! Each priority level has its own ready list. The head is the next task
//! to run at that priority; round-robin rotates the head to the tail.

use core::ptr::NonNull;

use crate::task::OsTcb;
use crate::types::OsObjQty;

/// Ready list for a single priority level
#[derive(Debug)]
pub struct ReadyList {
    head: Option<NonNull<OsTcb>>,
    tail: Option<NonNull<OsTcb>>,
    entries: OsObjQty,
}

impl ReadyList {
    /// Create a new empty ready list
    pub const fn new() -> Self {
        ReadyList {
            head: None,
            tail: None,
            entries: 0,
        }
    }

    /// Initialize/reset the ready list
    pub fn init(&mut self) {
        self.head = None;
        self.tail = None;
        self.entries = 0;
    }

    /// Get head of list (first to be scheduled)
    #[inline]
    pub fn head(&self) -> Option<NonNull<OsTcb>> {
        self.head
    }

    /// Get tail of list
    #[inline]
    pub fn tail(&self) -> Option<NonNull<OsTcb>> {
        self.tail
    }

    /// Check if list is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Number of tasks in this bucket
    #[inline]
    pub fn nbr_entries(&self) -> OsObjQty {
        self.entries
    }

    /// Insert TCB at the tail of the list
    ///
    /// # Safety
    /// Caller must ensure tcb is valid and not already in any list.
    pub fn insert_tail(&mut self, tcb: NonNull<OsTcb>) {
        // SAFETY: We have exclusive access via critical section
        let tcb_ref = unsafe { &mut *tcb.as_ptr() };

        tcb_ref.next_ptr = None;
        tcb_ref.prev_ptr = self.tail;

        match self.tail {
            Some(tail) => {
                // List not empty - link from current tail
                unsafe { (*tail.as_ptr()).next_ptr = Some(tcb) };
            }
            None => {
                // List is empty - this becomes head
                self.head = Some(tcb);
            }
        }

        self.tail = Some(tcb);
        self.entries += 1;
    }

    /// Insert TCB at the head of the list
    ///
    /// # Safety
    /// Caller must ensure tcb is valid and not already in any list.
    pub fn insert_head(&mut self, tcb: NonNull<OsTcb>) {
        let tcb_ref = unsafe { &mut *tcb.as_ptr() };

        tcb_ref.prev_ptr = None;
        tcb_ref.next_ptr = self.head;

        match self.head {
            Some(head) => {
                // List not empty - link to current head
                unsafe { (*head.as_ptr()).prev_ptr = Some(tcb) };
            }
            None => {
                // List is empty - this becomes tail
                self.tail = Some(tcb);
            }
        }

        self.head = Some(tcb);
        self.entries += 1;
    }

    /// Remove a TCB from the list
    ///
    /// # Safety
    /// Caller must ensure tcb is valid and is in this list.
    pub fn remove(&mut self, tcb: NonNull<OsTcb>) {
        let tcb_ref = unsafe { &mut *tcb.as_ptr() };

        // Update previous node's next pointer
        match tcb_ref.prev_ptr {
            Some(prev) => {
                unsafe { (*prev.as_ptr()).next_ptr = tcb_ref.next_ptr };
            }
            None => {
                // This was the head
                self.head = tcb_ref.next_ptr;
            }
        }

        // Update next node's prev pointer
        match tcb_ref.next_ptr {
            Some(next) => {
                unsafe { (*next.as_ptr()).prev_ptr = tcb_ref.prev_ptr };
            }
            None => {
                // This was the tail
                self.tail = tcb_ref.prev_ptr;
            }
        }

        // Clear TCB's list pointers
        tcb_ref.prev_ptr = None;
        tcb_ref.next_ptr = None;

        self.entries = self.entries.saturating_sub(1);
    }

    /// Rotate the list: the head moves to the tail.
    ///
    /// Used by round-robin when the running task exhausts its quanta.
    pub fn move_head_to_tail(&mut self) {
        if self.head == self.tail {
            return;
        }
        if let Some(head) = self.head {
            self.remove(head);
            self.insert_tail(head);
        }
    }
}

impl Default for ReadyList {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: ReadyList is only modified within critical sections
unsafe impl Send for ReadyList {}
unsafe impl Sync for ReadyList {}

impl Copy for ReadyList {}

impl Clone for ReadyList {
    fn clone(&self) -> Self {
        *self
    }
}
