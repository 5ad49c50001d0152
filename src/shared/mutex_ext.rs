//! Usage: Mutex extension trait with automatic recovery from poisoned state.

use std::sync::{Mutex, MutexGuard};

pub(crate) trait MutexExt<T> {
    /// Lock the mutex; if it is poisoned, recover the inner data and log.
    fn lock_or_recover(&self) -> MutexGuard<'_, T>;
}

impl<T> MutexExt<T> for Mutex<T> {
    #[track_caller]
    fn lock_or_recover(&self) -> MutexGuard<'_, T> {
        match self.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                let loc = std::panic::Location::caller();
                tracing::error!(
                    mutex_type = std::any::type_name::<T>(),
                    file = loc.file(),
                    line = loc.line(),
                    column = loc.column(),
                    "mutex poisoned by a panicked thread; recovered, state may be inconsistent"
                );
                poisoned.into_inner()
            }
        }
    }
}
