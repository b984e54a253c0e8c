//! Critical sections over the shared heap.
//!
//! Uses parking_lot if available, std otherwise. Every entry carries an
//! identity token naming the caller, which shows up in trace logs.

use std::ops::{Deref, DerefMut};

#[cfg(feature = "parking_lot")]
use parking_lot::{Mutex, MutexGuard};

#[cfg(not(feature = "parking_lot"))]
use std::sync::{Mutex, MutexGuard};

/// Exclusive access to a value, entered per operation.
pub struct CriticalSection<T> {
    inner: Mutex<T>,
}

impl<T> CriticalSection<T> {
    /// Create a new critical section guarding `value`.
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    /// Enter the critical section. Blocks while another caller holds it.
    ///
    /// Not reentrant: entering again from the same thread while a guard
    /// is alive deadlocks.
    pub fn enter(&self, id: &'static str) -> CriticalGuard<'_, T> {
        let guard = self.lock();
        log::trace!("critical section entered by `{id}`");
        CriticalGuard { id, guard }
    }

    #[cfg(feature = "parking_lot")]
    fn lock(&self) -> MutexGuard<'_, T> {
        self.inner.lock()
    }

    // A panic inside a section (strict violation policy) must not wedge
    // the heap for every other caller.
    #[cfg(not(feature = "parking_lot"))]
    fn lock(&self) -> MutexGuard<'_, T> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Tear down the section and return the guarded value.
    pub fn into_inner(self) -> T {
        #[cfg(feature = "parking_lot")]
        {
            self.inner.into_inner()
        }

        #[cfg(not(feature = "parking_lot"))]
        {
            self.inner
                .into_inner()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
        }
    }
}

/// Proof of being inside a [`CriticalSection`]. Leaves it on drop.
pub struct CriticalGuard<'a, T> {
    id: &'static str,
    guard: MutexGuard<'a, T>,
}

impl<T> Deref for CriticalGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for CriticalGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> Drop for CriticalGuard<'_, T> {
    fn drop(&mut self) {
        log::trace!("critical section left by `{}`", self.id);
    }
}
