//! Global kernel state and initialization
//!
//! This module manages the global OS state including initialization,
//! starting the scheduler, the ISR boundary, and the scheduler lock.

use core::ptr::NonNull;
use core::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, AtomicU8, Ordering};

use crate::config::{
    CFG_CPU_FREQ_HZ, CFG_IDLE_STK_SIZE, CFG_ISR_NESTING_MAX, CFG_PRIO_IDLE, CFG_PRIO_MAX,
    CFG_SCHED_LOCK_MAX, CFG_SCHED_ROUND_ROBIN_EN, CFG_STK_REDZONE_EN, CFG_TICK_RATE_HZ,
    CFG_TIME_QUANTA_DEFAULT,
};
use crate::core::cs_cell::CsCell;
use crate::critical::{critical_section, CriticalSection};
use crate::error::{OsError, OsResult};
use crate::hooks;
use crate::prio::PrioTable;
use crate::sched::ReadyList;
use crate::task::OsTcb;
use crate::time::TickList;
use crate::types::{OsNestingCtr, OsObjQty, OsPrio, OsTick};

// ============ Kernel State Structures ============

/// Atomic kernel flags and counters
pub struct KernelFlags {
    initialized: AtomicBool,
    running: AtomicBool,
    int_nesting: AtomicU8,
    sched_lock_nesting: AtomicU8,
    tick_ctr: AtomicU32,
    task_qty: AtomicU16,
    round_robin_en: AtomicBool,
    round_robin_dflt_quanta: AtomicU32,
    safety_critical: AtomicBool,
}

impl KernelFlags {
    const fn new() -> Self {
        Self {
            initialized: AtomicBool::new(false),
            running: AtomicBool::new(false),
            int_nesting: AtomicU8::new(0),
            sched_lock_nesting: AtomicU8::new(0),
            tick_ctr: AtomicU32::new(0),
            task_qty: AtomicU16::new(0),
            round_robin_en: AtomicBool::new(CFG_SCHED_ROUND_ROBIN_EN),
            round_robin_dflt_quanta: AtomicU32::new(CFG_TIME_QUANTA_DEFAULT),
            safety_critical: AtomicBool::new(false),
        }
    }

    pub(crate) fn reset(&self) {
        self.initialized.store(false, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        self.int_nesting.store(0, Ordering::SeqCst);
        self.sched_lock_nesting.store(0, Ordering::SeqCst);
        self.tick_ctr.store(0, Ordering::SeqCst);
        self.task_qty.store(0, Ordering::SeqCst);
        self.round_robin_en
            .store(CFG_SCHED_ROUND_ROBIN_EN, Ordering::SeqCst);
        self.round_robin_dflt_quanta
            .store(CFG_TIME_QUANTA_DEFAULT, Ordering::SeqCst);
        self.safety_critical.store(false, Ordering::SeqCst);
    }

    /// Check if the OS is running
    #[inline(always)]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Check if OS is initialized
    #[inline(always)]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Get current tick count
    #[inline(always)]
    pub fn tick_get(&self) -> OsTick {
        self.tick_ctr.load(Ordering::Relaxed)
    }

    /// Advance the tick counter by `n` and return the new value
    #[inline(always)]
    pub(crate) fn tick_add(&self, n: OsTick) -> OsTick {
        self.tick_ctr.fetch_add(n, Ordering::Relaxed).wrapping_add(n)
    }

    /// Set the tick counter
    #[inline(always)]
    pub(crate) fn tick_set(&self, ticks: OsTick) {
        self.tick_ctr.store(ticks, Ordering::Relaxed);
    }

    /// Get interrupt nesting level
    #[inline(always)]
    pub fn int_nesting(&self) -> OsNestingCtr {
        self.int_nesting.load(Ordering::Relaxed)
    }

    /// Get scheduler lock nesting level
    #[inline(always)]
    pub fn sched_lock_nesting(&self) -> OsNestingCtr {
        self.sched_lock_nesting.load(Ordering::SeqCst)
    }

    /// Enter ISR, capping the nesting counter
    #[inline(always)]
    pub(crate) fn int_enter(&self) {
        let nesting = self.int_nesting.load(Ordering::Relaxed);
        if nesting < CFG_ISR_NESTING_MAX {
            self.int_nesting.store(nesting + 1, Ordering::Relaxed);
        }
    }

    /// Decrement int nesting, returning the new level
    #[inline(always)]
    pub(crate) fn int_nesting_dec(&self) -> OsNestingCtr {
        let nesting = self.int_nesting.load(Ordering::Relaxed);
        if nesting > 0 {
            self.int_nesting.store(nesting - 1, Ordering::Relaxed);
        }
        nesting.saturating_sub(1)
    }

    /// Lock scheduler
    pub(crate) fn try_sched_lock(&self) -> OsResult<()> {
        let nesting = self.sched_lock_nesting.load(Ordering::SeqCst);
        if nesting >= CFG_SCHED_LOCK_MAX {
            return Err(OsError::LockNestingOvf);
        }
        self.sched_lock_nesting.store(nesting + 1, Ordering::SeqCst);
        Ok(())
    }

    /// Unlock scheduler
    pub(crate) fn try_sched_unlock(&self) -> OsResult<OsNestingCtr> {
        let nesting = self.sched_lock_nesting.load(Ordering::SeqCst);
        if nesting == 0 {
            return Err(OsError::SchedNotLocked);
        }
        self.sched_lock_nesting.store(nesting - 1, Ordering::SeqCst);
        Ok(nesting - 1)
    }

    /// Round-robin enabled?
    #[inline(always)]
    pub fn round_robin_en(&self) -> bool {
        self.round_robin_en.load(Ordering::Relaxed)
    }

    /// Default quanta for tasks created with `time_quanta == 0`
    #[inline(always)]
    pub fn round_robin_dflt_quanta(&self) -> OsTick {
        self.round_robin_dflt_quanta.load(Ordering::Relaxed)
    }

    pub(crate) fn set_round_robin(&self, en: bool, dflt_quanta: OsTick) {
        self.round_robin_en.store(en, Ordering::Relaxed);
        let quanta = if dflt_quanta == 0 {
            CFG_TIME_QUANTA_DEFAULT
        } else {
            dflt_quanta
        };
        self.round_robin_dflt_quanta.store(quanta, Ordering::Relaxed);
    }

    /// Number of tasks known to the kernel (idle task included)
    #[inline(always)]
    pub fn task_qty(&self) -> OsObjQty {
        self.task_qty.load(Ordering::Relaxed)
    }

    #[inline(always)]
    pub(crate) fn task_qty_inc(&self) {
        self.task_qty.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub(crate) fn task_qty_dec(&self) {
        self.task_qty.fetch_sub(1, Ordering::Relaxed);
    }

    /// Creation/deletion lockdown active?
    #[inline(always)]
    pub fn safety_critical_started(&self) -> bool {
        self.safety_critical.load(Ordering::Relaxed)
    }

    /// Set initialized flag
    #[inline(always)]
    pub(crate) fn set_initialized(&self, val: bool) {
        self.initialized.store(val, Ordering::SeqCst);
    }

    /// Set running flag
    #[inline(always)]
    pub(crate) fn set_running(&self, val: bool) {
        self.running.store(val, Ordering::SeqCst);
    }
}

// ============ Global Instances ============

/// Global kernel state instance
pub static KERNEL: KernelFlags = KernelFlags::new();

/// Scheduler state
pub struct SchedState {
    pub(crate) prio_tbl: PrioTable,
    pub(crate) rdy_list: [ReadyList; CFG_PRIO_MAX],
    pub(crate) tick_list: TickList,
}

impl SchedState {
    const fn new() -> Self {
        Self {
            prio_tbl: PrioTable::new(),
            rdy_list: [ReadyList::new(); CFG_PRIO_MAX],
            tick_list: TickList::new(),
        }
    }

    pub(crate) fn reset(&mut self) {
        self.prio_tbl = PrioTable::new();
        self.rdy_list = [ReadyList::new(); CFG_PRIO_MAX];
        self.tick_list = TickList::new();
    }
}

/// Global scheduler state instance
pub(crate) static SCHED: CsCell<SchedState> = CsCell::new(SchedState::new());

/// IDLE task TCB
static mut IDLE_TCB: OsTcb = OsTcb::new();

/// IDLE task stack
static mut IDLE_STK: [crate::types::OsStkElement; CFG_IDLE_STK_SIZE] = [0; CFG_IDLE_STK_SIZE];

// ============ CPU/Context Switch State ============

/// CPU context switch state, shared with the port's switch code
#[repr(C)]
pub struct CpuState {
    /// Current running task's TCB pointer
    pub tcb_cur: *mut OsTcb,
    /// Highest priority ready task's TCB pointer
    pub tcb_high_rdy: *mut OsTcb,
    /// Current running task's priority
    pub prio_cur: OsPrio,
    /// Highest ready priority
    pub prio_high_rdy: OsPrio,
}

impl CpuState {
    pub const fn new() -> Self {
        Self {
            tcb_cur: core::ptr::null_mut(),
            tcb_high_rdy: core::ptr::null_mut(),
            prio_cur: 0,
            prio_high_rdy: 0,
        }
    }

    pub fn reset(&mut self) {
        self.tcb_cur = core::ptr::null_mut();
        self.tcb_high_rdy = core::ptr::null_mut();
        self.prio_cur = 0;
        self.prio_high_rdy = 0;
    }
}

/// Global CPU state instance
#[no_mangle]
#[used]
pub static mut CPU_STATE: CpuState = CpuState::new();

// ============ Initialization ============

/// Internal IDLE task function
fn os_idle_task(_: *mut ()) -> ! {
    loop {
        hooks::idle_hook();
        core::hint::spin_loop();
    }
}

/// Reset global kernel state
unsafe fn os_reset_globals() {
    KERNEL.reset();

    unsafe {
        CPU_STATE.reset();
        SCHED.get_unchecked().reset();
        crate::msg::pool().init();
    }
}

// ============ Public API ============

/// Initialize the kernel
///
/// This must be called before any other OS function. It initializes the
/// priority table, ready lists, tick list, and message pool, and creates
/// the IDLE task.
///
/// # Returns
/// * `Ok(())` - Initialization successful
/// * `Err(OsError::OsRunning)` - OS is already running
#[allow(static_mut_refs)]
pub fn os_init() -> OsResult<()> {
    if KERNEL.is_running() {
        return Err(OsError::OsRunning);
    }

    unsafe {
        os_reset_globals();
    }

    critical_section(|cs| {
        let sched = SCHED.get(cs);

        sched.prio_tbl.init();

        for list in sched.rdy_list.iter_mut() {
            list.init();
        }

        sched.tick_list.init();

        // Create IDLE task
        unsafe {
            crate::task::os_task_create_internal(
                &raw mut IDLE_TCB,
                "Idle",
                os_idle_task,
                core::ptr::null_mut(),
                CFG_PRIO_IDLE,
                IDLE_STK.as_mut_ptr(),
                IDLE_STK.len(),
                0,
                0,
                crate::types::opt::TASK_STK_CLR,
            )
            .expect("IDLE task creation failed");
        }

        KERNEL.set_initialized(true);
    });

    Ok(())
}

/// Start multitasking
///
/// Transfers control to the highest priority ready task. Does not return
/// under normal operation.
///
/// # Returns
/// * `Err(OsError::OsNotInit)` - OS not initialized
/// * `Err(OsError::OsRunning)` - OS is already running
/// * `Err(OsError::OsNoAppTask)` - no application task was created
pub fn os_start() -> OsResult<()> {
    if !KERNEL.is_initialized() {
        return Err(OsError::OsNotInit);
    }

    if KERNEL.is_running() {
        return Err(OsError::OsRunning);
    }

    if KERNEL.task_qty() < 2 {
        // Only the idle task exists
        return Err(OsError::OsNoAppTask);
    }

    critical_section(|cs| {
        let sched = SCHED.get(cs);

        let high_prio = sched.prio_tbl.get_highest();

        unsafe {
            CPU_STATE.prio_high_rdy = high_prio;
            CPU_STATE.prio_cur = high_prio;

            if let Some(head) = sched.rdy_list[high_prio as usize].head() {
                CPU_STATE.tcb_high_rdy = head.as_ptr();
                CPU_STATE.tcb_cur = head.as_ptr();
            } else {
                return;
            }
        }

        KERNEL.set_running(true);
    });

    crate::port::os_cpu_systick_init(CFG_CPU_FREQ_HZ / CFG_TICK_RATE_HZ);

    unsafe {
        CPU_STATE.tcb_cur = CPU_STATE.tcb_high_rdy;
        crate::port::os_start_high_rdy()
    };

    Ok(())
}

/// Enter ISR
///
/// Must be the first kernel call in every interrupt handler that uses
/// kernel services. Nesting is accounted; scheduling decisions are
/// deferred until the outermost [`os_int_exit`].
pub fn os_int_enter() {
    if !KERNEL.is_running() {
        return;
    }
    KERNEL.int_enter();
}

/// Exit ISR
///
/// Decrements the nesting counter and, at the outermost exit with the
/// scheduler unlocked, performs an ISR-level reschedule if a higher
/// priority task became ready.
pub fn os_int_exit() {
    if !KERNEL.is_running() {
        return;
    }

    let _cs = CriticalSection::enter();

    if KERNEL.int_nesting() == 0 {
        return;
    }

    let new_nesting = KERNEL.int_nesting_dec();

    if new_nesting == 0 && KERNEL.sched_lock_nesting() == 0 {
        let high_prio = unsafe { SCHED.get_unchecked().prio_tbl.get_highest() };

        unsafe {
            if let Some(head) = SCHED.get_unchecked().rdy_list[high_prio as usize].head() {
                if head.as_ptr() != CPU_STATE.tcb_cur {
                    if CFG_STK_REDZONE_EN {
                        if let Some(cur) = tcb_cur_ptr() {
                            if !crate::task::stack::redzone_chk(cur.as_ref()) {
                                hooks::redzone_hit_hook(Some(cur.as_ref()));
                            }
                        }
                    }
                    CPU_STATE.prio_high_rdy = high_prio;
                    CPU_STATE.tcb_high_rdy = head.as_ptr();
                    crate::port::os_int_ctx_sw();
                }
            }
        }
    }
}

/// Lock the scheduler
///
/// Task-level rescheduling is suppressed until the matching unlock.
/// Interrupts stay enabled; ISR-level rescheduling is deferred as well.
pub fn os_sched_lock() -> OsResult<()> {
    if !KERNEL.is_running() {
        return Err(OsError::OsNotRunning);
    }

    if KERNEL.int_nesting() > 0 {
        return Err(OsError::SchedLockIsr);
    }

    critical_section(|_cs| KERNEL.try_sched_lock())
}

/// Unlock the scheduler
///
/// The outermost unlock triggers a reschedule.
pub fn os_sched_unlock() -> OsResult<()> {
    if !KERNEL.is_running() {
        return Err(OsError::OsNotRunning);
    }

    if KERNEL.int_nesting() > 0 {
        return Err(OsError::SchedUnlockIsr);
    }

    let remaining = critical_section(|_cs| KERNEL.try_sched_unlock())?;
    if remaining == 0 {
        crate::sched::os_sched();
    }
    Ok(())
}

/// Freeze the set of kernel objects
///
/// After this call, creating or deleting tasks and objects fails with
/// `IllegalCreateRunTime` / `IllegalDelRunTime`.
pub fn os_safety_critical_start() {
    KERNEL.safety_critical.store(true, Ordering::SeqCst);
}

// ============ Internal accessors for other modules ============

/// Get mutable reference to priority table
#[inline(always)]
pub(crate) unsafe fn prio_table() -> &'static mut PrioTable {
    unsafe { &mut SCHED.get_unchecked().prio_tbl }
}

/// Get reference to ready list for a priority
#[inline(always)]
pub(crate) unsafe fn rdy_list(prio: OsPrio) -> &'static mut ReadyList {
    unsafe { &mut SCHED.get_unchecked().rdy_list[prio as usize] }
}

/// Get mutable reference to the tick list
#[inline(always)]
pub(crate) unsafe fn tick_list() -> &'static mut TickList {
    unsafe { &mut SCHED.get_unchecked().tick_list }
}

/// Get current TCB pointer as Option<NonNull>
#[inline]
#[allow(static_mut_refs)]
pub(crate) unsafe fn tcb_cur_ptr() -> Option<NonNull<OsTcb>> {
    unsafe { NonNull::new(CPU_STATE.tcb_cur) }
}

/// Get high ready TCB pointer as Option<NonNull>
#[inline]
#[allow(dead_code, static_mut_refs)]
pub(crate) unsafe fn tcb_high_rdy_ptr() -> Option<NonNull<OsTcb>> {
    unsafe { NonNull::new(CPU_STATE.tcb_high_rdy) }
}

/// Set high ready TCB pointer
#[inline]
#[allow(static_mut_refs)]
pub(crate) unsafe fn set_tcb_high_rdy_ptr(tcb: Option<NonNull<OsTcb>>) {
    unsafe {
        CPU_STATE.tcb_high_rdy = tcb.map_or(core::ptr::null_mut(), |p| p.as_ptr());
    }
}

/// Get current priority
#[inline]
#[allow(static_mut_refs)]
pub(crate) unsafe fn prio_cur() -> OsPrio {
    unsafe { CPU_STATE.prio_cur }
}

/// Set current priority
#[inline]
#[allow(dead_code, static_mut_refs)]
pub(crate) unsafe fn set_prio_cur(prio: OsPrio) {
    unsafe {
        CPU_STATE.prio_cur = prio;
    }
}

/// Set high ready priority
#[inline]
#[allow(static_mut_refs)]
pub(crate) unsafe fn set_prio_high_rdy(prio: OsPrio) {
    unsafe {
        CPU_STATE.prio_high_rdy = prio;
    }
}
