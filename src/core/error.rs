//! Error types
//!
//! Uses Rust's Result pattern instead of C-style error pointers.

/// Kernel error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum OsError {
    /// No error
    None = 0,

    // ============ ISR errors ============
    /// Function cannot be called from ISR
    AcceptIsr = 10001,
    /// Cannot create object from ISR
    CreateIsr = 12001,
    /// Cannot delete object from ISR
    DelIsr = 13001,
    /// Cannot flush from ISR
    FlushIsr = 15104,

    // ============ Fatal errors ============
    /// Fatal return (task returned unexpectedly)
    FatalReturn = 15001,

    // ============ Flag errors ============
    /// Invalid flag pend option
    FlagPendOpt = 15103,

    // ============ Safety-critical lockdown ============
    /// Object creation after the safety-critical lockdown
    IllegalCreateRunTime = 16001,
    /// Object deletion after the safety-critical lockdown
    IllegalDelRunTime = 16002,

    // ============ Lock errors ============
    /// Lock nesting overflow
    LockNestingOvf = 21001,

    // ============ Message pool errors ============
    /// Message pool is empty (no free message nodes)
    MsgPoolEmpty = 22001,

    // ============ Mutex errors ============
    /// Caller is not the mutex owner
    MutexNotOwner = 22401,
    /// Mutex released with a zero nesting counter
    MutexNesting = 22403,
    /// Mutex nesting overflow
    MutexOvf = 22404,

    // ============ Object errors ============
    /// Object was deleted while pending
    ObjDel = 24002,
    /// Null pointer for object
    ObjPtrNull = 24003,
    /// Wrong object type
    ObjType = 24004,

    // ============ Option errors ============
    /// Invalid option specified
    OptInvalid = 24101,

    // ============ OS state errors ============
    /// OS is not running
    OsNotRunning = 24201,
    /// OS is already running
    OsRunning = 24202,
    /// OS not initialized
    OsNotInit = 24203,
    /// No application task created
    OsNoAppTask = 24204,

    // ============ Pend errors ============
    /// Pend was aborted
    PendAbort = 25001,
    /// Cannot abort pend from ISR
    PendAbortIsr = 25002,
    /// No task to abort
    PendAbortNone = 25003,
    /// Cannot abort own pend
    PendAbortSelf = 25004,
    /// Cannot pend from ISR
    PendIsr = 25006,
    /// Pend would block (non-blocking mode)
    PendWouldBlock = 25008,

    // ============ Priority errors ============
    /// Invalid priority
    PrioInvalid = 25203,

    // ============ Queue errors ============
    /// Queue is full
    QMax = 26003,
    /// Invalid queue capacity
    QSizeInvalid = 26005,

    // ============ Register errors ============
    /// Invalid task register identifier
    RegIdInvalid = 26101,

    // ============ Scheduler errors ============
    /// Cannot lock scheduler from ISR
    SchedLockIsr = 28002,
    /// Scheduler is locked
    SchedLocked = 28003,
    /// Scheduler is not locked
    SchedNotLocked = 28004,
    /// Cannot unlock scheduler from ISR
    SchedUnlockIsr = 28005,
    /// Round-robin is disabled
    SchedRoundRobinDisabled = 28006,
    /// No other task ready at the caller's priority
    SchedRoundRobin1 = 28007,

    // ============ Semaphore errors ============
    /// Semaphore overflow
    SemOvf = 28101,

    // ============ State errors ============
    /// Invalid state for the requested transition
    StateInvalid = 28205,
    /// Internal consistency violation
    StatusInvalid = 28206,
    /// Invalid stack pointer
    StkInvalid = 28207,
    /// Invalid stack size
    StkSizeInvalid = 28208,
    /// Invalid stack limit
    StkLimitInvalid = 28209,
    /// Stack overflow detected
    StkOvf = 28210,

    // ============ Task errors ============
    /// Cannot change priority from ISR
    TaskChangePrioIsr = 29001,
    /// Cannot create task from ISR
    TaskCreateIsr = 29002,
    /// Cannot delete idle task
    TaskDelIdle = 29004,
    /// Cannot delete task from ISR
    TaskDelIsr = 29006,
    /// Task is not delayed
    TaskNotDly = 29009,
    /// Task is not suspended
    TaskNotSuspended = 29011,
    /// Invalid task option
    TaskOpt = 29012,
    /// Suspend nesting counter overflow
    TaskSuspendCtrOvf = 29015,
    /// Cannot suspend task from ISR
    TaskSuspendIsr = 29017,
    /// Cannot suspend idle task
    TaskSuspendIdle = 29019,
    /// Cannot resume task from ISR
    TaskResumeIsr = 29020,
    /// Operation refused because tasks are waiting on the object
    TaskWaiting = 29021,

    // ============ TCB errors ============
    /// Invalid TCB pointer
    TcbInvalid = 29101,

    // ============ Time errors ============
    /// Cannot delay from ISR
    TimeDlyIsr = 29301,
    /// Invalid hours
    TimeInvalidHours = 29302,
    /// Invalid minutes
    TimeInvalidMinutes = 29303,
    /// Invalid seconds
    TimeInvalidSeconds = 29304,
    /// Invalid milliseconds
    TimeInvalidMilliseconds = 29305,
    /// Zero delay specified
    TimeZeroDly = 29310,
    /// Timeout specified while the tick engine is configured out
    TickDisabled = 29311,

    // ============ Timeout ============
    /// Operation timed out
    Timeout = 29401,

    // ============ Yield errors ============
    /// Cannot yield from ISR
    YieldIsr = 34001,
}

/// Result type alias for kernel operations
pub type OsResult<T> = Result<T, OsError>;

impl OsError {
    #[inline]
    pub fn is_ok(self) -> bool {
        self == OsError::None
    }

    #[inline]
    pub fn is_err(self) -> bool {
        self != OsError::None
    }
}
