//! Critical section handling
//!
//! Kernel data structures are protected by disabling interrupts across a
//! short scope. The guard saves the interrupt-enable state on entry and
//! restores it on drop, so critical sections nest.

/// RAII guard for critical sections
///
/// Interrupts are disabled while at least one guard is alive. Dropping the
/// guard restores the interrupt-enable state captured at entry.
pub struct CriticalSection {
    was_active: bool,
}

impl CriticalSection {
    /// Enter a critical section by disabling interrupts.
    ///
    /// Returns a guard that restores the prior interrupt state when dropped.
    #[inline(always)]
    pub fn enter() -> Self {
        #[cfg(target_arch = "arm")]
        {
            let was_active = cortex_m::register::primask::read().is_active();
            cortex_m::interrupt::disable();
            CriticalSection { was_active }
        }

        #[cfg(not(target_arch = "arm"))]
        {
            CriticalSection { was_active: false }
        }
    }
}

impl Drop for CriticalSection {
    #[inline(always)]
    fn drop(&mut self) {
        #[cfg(target_arch = "arm")]
        if self.was_active {
            unsafe { cortex_m::interrupt::enable() };
        }

        #[cfg(not(target_arch = "arm"))]
        {
            let _ = self.was_active;
        }
    }
}

/// Execute a closure with interrupts disabled
///
/// The closure receives a reference to the critical section guard,
/// which can be used to access [`crate::core::cs_cell::CsCell`] protected data.
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(&CriticalSection) -> R,
{
    let cs = CriticalSection::enter();
    f(&cs)
}
