//! Message storage
//!
//! Messages are `(pointer, size, timestamp)` triples. A fixed pool of
//! message nodes is carved out at initialization; every message queue
//! (standalone or task mailbox) links nodes from this pool, bounded by its
//! own capacity.

use core::ptr::NonNull;

use crate::config::CFG_MSG_POOL_SIZE;
use crate::core::cs_cell::CsCell;
use crate::error::{OsError, OsResult};
use crate::types::{OsMsgSize, OsObjQty, OsTs};

/// One message node
pub struct OsMsg {
    /// Next node in the free list or in a queue
    next: Option<NonNull<OsMsg>>,
    /// Message payload pointer
    msg_ptr: *const (),
    /// Message payload size
    msg_size: OsMsgSize,
    /// Timestamp recorded at post time
    ts: OsTs,
}

const EMPTY_MSG: OsMsg = OsMsg {
    next: None,
    msg_ptr: core::ptr::null(),
    msg_size: 0,
    ts: 0,
};

/// Pool of free message nodes
pub struct OsMsgPool {
    free_head: Option<NonNull<OsMsg>>,
    nbr_free: OsObjQty,
    nbr_used: OsObjQty,
    nbr_used_max: OsObjQty,
    nodes: [OsMsg; CFG_MSG_POOL_SIZE],
}

impl OsMsgPool {
    pub const fn new() -> Self {
        OsMsgPool {
            free_head: None,
            nbr_free: 0,
            nbr_used: 0,
            nbr_used_max: 0,
            nodes: [EMPTY_MSG; CFG_MSG_POOL_SIZE],
        }
    }

    /// Build the free list over the node array.
    ///
    /// Must be called once before any queue operation, and only after the
    /// pool has reached its final address (the free list points into the
    /// node array itself).
    pub fn init(&mut self) {
        self.free_head = None;
        self.nbr_free = 0;
        self.nbr_used = 0;
        self.nbr_used_max = 0;
        for node in self.nodes.iter_mut() {
            let ptr = NonNull::from(&mut *node);
            unsafe {
                (*ptr.as_ptr()).next = self.free_head;
            }
            self.free_head = Some(ptr);
            self.nbr_free += 1;
        }
    }

    /// Number of free nodes remaining
    #[inline]
    pub fn nbr_free(&self) -> OsObjQty {
        self.nbr_free
    }

    /// High watermark of nodes in use
    #[inline]
    pub fn nbr_used_max(&self) -> OsObjQty {
        self.nbr_used_max
    }

    fn alloc(&mut self) -> Option<NonNull<OsMsg>> {
        let node = self.free_head?;
        unsafe {
            self.free_head = (*node.as_ptr()).next;
            (*node.as_ptr()).next = None;
        }
        self.nbr_free -= 1;
        self.nbr_used += 1;
        if self.nbr_used > self.nbr_used_max {
            self.nbr_used_max = self.nbr_used;
        }
        Some(node)
    }

    fn dealloc(&mut self, node: NonNull<OsMsg>) {
        unsafe {
            (*node.as_ptr()).next = self.free_head;
            (*node.as_ptr()).msg_ptr = core::ptr::null();
            (*node.as_ptr()).msg_size = 0;
        }
        self.free_head = Some(node);
        self.nbr_free += 1;
        self.nbr_used -= 1;
    }
}

impl Default for OsMsgPool {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl Send for OsMsgPool {}
unsafe impl Sync for OsMsgPool {}

/// Bounded FIFO/LIFO message queue
///
/// Singly linked from the dequeue end (`head`) to the enqueue end
/// (`tail`); nodes come from the shared [`OsMsgPool`].
pub struct OsMsgQ {
    head: Option<NonNull<OsMsg>>,
    tail: Option<NonNull<OsMsg>>,
    /// Messages currently queued
    entries: OsObjQty,
    /// High watermark of queued messages
    entries_max: OsObjQty,
    /// Capacity
    max: OsObjQty,
}

impl OsMsgQ {
    pub const fn new(max: OsObjQty) -> Self {
        OsMsgQ {
            head: None,
            tail: None,
            entries: 0,
            entries_max: 0,
            max,
        }
    }

    /// Reset the queue and set its capacity.
    ///
    /// Any queued nodes are forgotten, not returned to the pool; use
    /// [`OsMsgQ::flush`] first if the queue may be non-empty.
    pub fn init(&mut self, max: OsObjQty) {
        self.head = None;
        self.tail = None;
        self.entries = 0;
        self.entries_max = 0;
        self.max = max;
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    #[inline]
    pub fn nbr_entries(&self) -> OsObjQty {
        self.entries
    }

    #[inline]
    pub fn capacity(&self) -> OsObjQty {
        self.max
    }

    /// Append (FIFO) or prepend (LIFO) a message.
    pub fn put(
        &mut self,
        pool: &mut OsMsgPool,
        msg_ptr: *const (),
        msg_size: OsMsgSize,
        lifo: bool,
        ts: OsTs,
    ) -> OsResult<()> {
        if self.entries >= self.max {
            return Err(OsError::QMax);
        }
        let node = pool.alloc().ok_or(OsError::MsgPoolEmpty)?;
        unsafe {
            (*node.as_ptr()).msg_ptr = msg_ptr;
            (*node.as_ptr()).msg_size = msg_size;
            (*node.as_ptr()).ts = ts;
            (*node.as_ptr()).next = None;
        }

        if lifo {
            unsafe {
                (*node.as_ptr()).next = self.head;
            }
            self.head = Some(node);
            if self.tail.is_none() {
                self.tail = Some(node);
            }
        } else {
            match self.tail {
                Some(tail) => unsafe {
                    (*tail.as_ptr()).next = Some(node);
                },
                None => {
                    self.head = Some(node);
                }
            }
            self.tail = Some(node);
        }

        self.entries += 1;
        if self.entries > self.entries_max {
            self.entries_max = self.entries;
        }
        Ok(())
    }

    /// Remove and return the oldest message.
    pub fn get(&mut self, pool: &mut OsMsgPool) -> Option<(*const (), OsMsgSize, OsTs)> {
        let node = self.head?;
        let (msg_ptr, msg_size, ts) = unsafe {
            let n = &*node.as_ptr();
            (n.msg_ptr, n.msg_size, n.ts)
        };
        self.head = unsafe { (*node.as_ptr()).next };
        if self.head.is_none() {
            self.tail = None;
        }
        self.entries -= 1;
        pool.dealloc(node);
        Some((msg_ptr, msg_size, ts))
    }

    /// Drop every queued message, returning the number dropped.
    pub fn flush(&mut self, pool: &mut OsMsgPool) -> OsObjQty {
        let mut qty: OsObjQty = 0;
        while self.get(pool).is_some() {
            qty += 1;
        }
        qty
    }
}

impl Default for OsMsgQ {
    fn default() -> Self {
        Self::new(0)
    }
}

unsafe impl Send for OsMsgQ {}
unsafe impl Sync for OsMsgQ {}

// ============ Global message pool ============

/// Global message pool instance
pub(crate) static MSG_POOL: CsCell<OsMsgPool> = CsCell::new(OsMsgPool::new());

/// Get the global message pool. Caller must be inside a critical section.
#[inline(always)]
pub(crate) unsafe fn pool() -> &'static mut OsMsgPool {
    unsafe { MSG_POOL.get_unchecked() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_alloc_exhaustion() {
        let mut pool = OsMsgPool::new();
        pool.init();
        assert_eq!(pool.nbr_free() as usize, CFG_MSG_POOL_SIZE);

        let mut q = OsMsgQ::new(OsObjQty::MAX);
        for i in 0..CFG_MSG_POOL_SIZE {
            q.put(&mut pool, i as *const (), i, false, 0).unwrap();
        }
        assert_eq!(pool.nbr_free(), 0);
        assert_eq!(
            q.put(&mut pool, core::ptr::null(), 0, false, 0),
            Err(OsError::MsgPoolEmpty)
        );

        assert_eq!(q.flush(&mut pool) as usize, CFG_MSG_POOL_SIZE);
        assert_eq!(pool.nbr_free() as usize, CFG_MSG_POOL_SIZE);
    }

    #[test]
    fn fifo_order() {
        let mut pool = OsMsgPool::new();
        pool.init();
        let mut q = OsMsgQ::new(4);

        q.put(&mut pool, 1 as *const (), 10, false, 0).unwrap();
        q.put(&mut pool, 2 as *const (), 20, false, 0).unwrap();
        q.put(&mut pool, 3 as *const (), 30, false, 0).unwrap();

        assert_eq!(q.get(&mut pool), Some((1 as *const (), 10, 0)));
        assert_eq!(q.get(&mut pool), Some((2 as *const (), 20, 0)));
        assert_eq!(q.get(&mut pool), Some((3 as *const (), 30, 0)));
        assert_eq!(q.get(&mut pool), None);
    }

    #[test]
    fn lifo_jumps_the_line() {
        let mut pool = OsMsgPool::new();
        pool.init();
        let mut q = OsMsgQ::new(4);

        q.put(&mut pool, 1 as *const (), 0, false, 0).unwrap();
        q.put(&mut pool, 2 as *const (), 0, false, 0).unwrap();
        q.put(&mut pool, 9 as *const (), 0, true, 0).unwrap();

        assert_eq!(q.get(&mut pool).unwrap().0, 9 as *const ());
        assert_eq!(q.get(&mut pool).unwrap().0, 1 as *const ());
        assert_eq!(q.get(&mut pool).unwrap().0, 2 as *const ());
    }

    #[test]
    fn capacity_bound() {
        let mut pool = OsMsgPool::new();
        pool.init();
        let mut q = OsMsgQ::new(2);

        q.put(&mut pool, 1 as *const (), 0, false, 0).unwrap();
        q.put(&mut pool, 2 as *const (), 0, false, 0).unwrap();
        assert_eq!(
            q.put(&mut pool, 3 as *const (), 0, false, 0),
            Err(OsError::QMax)
        );

        // A zero-capacity queue can never buffer
        let mut q0 = OsMsgQ::new(0);
        assert_eq!(
            q0.put(&mut pool, 1 as *const (), 0, false, 0),
            Err(OsError::QMax)
        );
    }

    #[test]
    fn watermarks() {
        let mut pool = OsMsgPool::new();
        pool.init();
        let mut q = OsMsgQ::new(8);

        q.put(&mut pool, 1 as *const (), 0, false, 0).unwrap();
        q.put(&mut pool, 2 as *const (), 0, false, 0).unwrap();
        q.get(&mut pool).unwrap();
        q.put(&mut pool, 3 as *const (), 0, false, 0).unwrap();

        assert_eq!(q.nbr_entries(), 2);
        assert_eq!(pool.nbr_used_max(), 2);
    }
}
