//! Compile-time configuration
//!
//! These constants control the behavior and resource limits of the kernel.

/// Maximum number of priority levels
pub const CFG_PRIO_MAX: usize = 64;

/// System tick rate in Hz
pub const CFG_TICK_RATE_HZ: u32 = 1000;

/// CPU core clock in Hz, used to program the tick source
pub const CFG_CPU_FREQ_HZ: u32 = 16_000_000;

/// Default time quanta for round-robin scheduling
pub const CFG_TIME_QUANTA_DEFAULT: u32 = 10;

/// Minimum task stack size in words
pub const CFG_STK_SIZE_MIN: usize = 64;

/// Number of message nodes in the global message pool
pub const CFG_MSG_POOL_SIZE: usize = 64;

/// Number of software registers per task
pub const CFG_TASK_REG_TBL_SIZE: usize = 4;

/// Enable round-robin scheduling for same-priority tasks at boot
pub const CFG_SCHED_ROUND_ROBIN_EN: bool = true;

/// Include the tick engine; when false every timeout must be 0
pub const CFG_TICK_EN: bool = true;

/// Tick source is a programmable one-shot rather than a periodic timer
pub const CFG_DYN_TICK_EN: bool = false;

/// Poison and verify a redzone at the growth end of each task stack
pub const CFG_STK_REDZONE_EN: bool = false;

/// Redzone depth in stack words
pub const CFG_STK_REDZONE_DEPTH: usize = 8;

/// Validate caller-supplied arguments in public entry points
pub const CFG_ARG_CHK_EN: bool = true;

/// Validate object type markers before operating on an object
pub const CFG_OBJ_TYPE_CHK_EN: bool = true;

/// Reject task-context-only services when called from an ISR
pub const CFG_CALLED_FROM_ISR_CHK_EN: bool = true;

/// Reject kernel services invoked before the kernel is running
pub const CFG_INVALID_OS_CALLS_CHK_EN: bool = true;

/// Upper bound on the interrupt nesting counter
pub const CFG_ISR_NESTING_MAX: u8 = 250;

/// Upper bound on the scheduler lock nesting counter
pub const CFG_SCHED_LOCK_MAX: u8 = 250;

/// Idle task priority (always the lowest)
pub const CFG_PRIO_IDLE: u8 = (CFG_PRIO_MAX - 1) as u8;

/// Idle task stack size in words
pub const CFG_IDLE_STK_SIZE: usize = 128;
