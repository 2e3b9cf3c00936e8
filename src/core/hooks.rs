//! Application hooks
//!
//! Ports and applications can observe kernel events by installing a
//! `&'static dyn OsHooks`. Every method has a default empty body, so an
//! implementation only overrides what it needs.

use crate::core::cs_cell::CsCell;
use crate::task::OsTcb;

/// Kernel event hooks
pub trait OsHooks: Sync {
    /// A task was created
    fn task_create(&self, _tcb: &OsTcb) {}

    /// A task was deleted
    fn task_delete(&self, _tcb: &OsTcb) {}

    /// A task entry function returned (a task must never return)
    fn task_return(&self, _tcb: &OsTcb) {}

    /// The idle task is running
    fn idle(&self) {}

    /// A kernel tick was processed
    fn tick(&self) {}

    /// A task's stack redzone was found corrupted.
    ///
    /// Returning from this hook lets the system continue; the default
    /// does not return.
    fn redzone_hit(&self, _tcb: Option<&OsTcb>) {}
}

static APP_HOOKS: CsCell<Option<&'static dyn OsHooks>> = CsCell::new(None);

/// Install the application hook table
pub fn os_app_hooks_set(hooks: &'static dyn OsHooks) {
    crate::critical::critical_section(|cs| {
        *APP_HOOKS.get(cs) = Some(hooks);
    });
}

#[inline]
fn hooks() -> Option<&'static dyn OsHooks> {
    // Set-once pointer; racing readers only ever observe None or the
    // installed table.
    unsafe { *APP_HOOKS.get_unchecked() }
}

#[inline]
pub(crate) fn task_create_hook(tcb: &OsTcb) {
    if let Some(h) = hooks() {
        h.task_create(tcb);
    }
}

#[inline]
pub(crate) fn task_delete_hook(tcb: &OsTcb) {
    if let Some(h) = hooks() {
        h.task_delete(tcb);
    }
}

#[inline]
pub(crate) fn task_return_hook(tcb: &OsTcb) {
    if let Some(h) = hooks() {
        h.task_return(tcb);
    }
}

#[inline]
pub(crate) fn idle_hook() {
    if let Some(h) = hooks() {
        h.idle();
    }
}

#[inline]
pub(crate) fn tick_hook() {
    if let Some(h) = hooks() {
        h.tick();
    }
}

/// Report a redzone violation. Panics unless an installed hook chooses to
/// continue.
pub(crate) fn redzone_hit_hook(tcb: Option<&OsTcb>) {
    match hooks() {
        Some(h) => h.redzone_hit(tcb),
        None => panic!("stack redzone violated"),
    }
}
