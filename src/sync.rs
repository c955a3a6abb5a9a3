#[cfg(feature = "loom")]
mod imp {
    pub(crate) use loom::{
        sync::{Condvar, Mutex, MutexGuard},
        thread::{self, JoinHandle},
    };

    /// Loom has to observe every iteration of a busy loop.
    #[inline]
    pub(crate) fn relax() {
        thread::yield_now();
    }
}

#[cfg(not(feature = "loom"))]
mod imp {
    pub(crate) use std::{
        sync::{Condvar, Mutex, MutexGuard},
        thread::{self, JoinHandle},
    };

    #[inline]
    pub(crate) fn relax() {
        core::hint::spin_loop();
    }
}

pub(crate) use imp::*;
use std::sync::PoisonError;

/// Lock ignoring poison: work items never run while the lock is held.
#[inline]
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
