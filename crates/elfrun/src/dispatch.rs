//! Control transfer into loaded code.
//!
//! This is the only place the loader turns an integer into something it
//! calls. Everything leading up to it is checked; this is not.

use std::num::NonZeroUsize;

/// Signature the entry point is called with: no arguments, `i32` result.
pub type EntryFn = unsafe extern "C" fn() -> i32;

/// Non-null entry address taken from the file header.
///
/// Rejecting 0 is the only check made on the address before the transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntryPoint(NonZeroUsize);

impl EntryPoint {
    /// Returns `None` for address 0, which cannot be called.
    #[must_use]
    pub fn new(address: u32) -> Option<Self> {
        usize::try_from(address)
            .ok()
            .and_then(NonZeroUsize::new)
            .map(Self)
    }

    #[must_use]
    pub const fn address(self) -> usize {
        self.0.get()
    }
}

impl std::fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.address())
    }
}

/// Call the code at `entry` and return what it returns.
///
/// Runs synchronously on the current thread. If the loaded code exits the
/// process instead of returning, this never comes back.
///
/// # Safety
///
/// `entry` must point into an executable mapping holding code that follows
/// the C calling convention of the host for `EntryFn`. Nothing here checks
/// that; a bad address faults the whole process.
pub unsafe fn dispatch(entry: EntryPoint) -> i32 {
    let start: EntryFn =
        unsafe { std::mem::transmute::<*const (), EntryFn>(entry.address() as *const ()) };
    unsafe { start() }
}
