// This file is part of the shakmaty-tb library.
// Copyright (C) 2017-2022 Niklas Fiekas <niklas.fiekas@backscattering.de>
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <http://www.gnu.org/licenses/>.

use std::{
    cell::UnsafeCell,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    },
};

/// A cell that is initialized at most once.
///
/// Double-checked locking: the fast path is a single acquire-load of the
/// ready flag. The slow path takes the lock, re-checks, initializes and
/// publishes with a release-store. Once ready, the value is immutable for
/// the lifetime of the cell and reads need no further synchronization.
pub struct Lazy<T> {
    ready: AtomicBool,
    lock: Mutex<()>,
    value: UnsafeCell<Option<T>>,
}

unsafe impl<T: Send + Sync> Sync for Lazy<T> {}

impl<T> Lazy<T> {
    pub fn new() -> Lazy<T> {
        Lazy {
            ready: AtomicBool::new(false),
            lock: Mutex::new(()),
            value: UnsafeCell::new(None),
        }
    }

    pub fn get_or_init<F>(&self, f: F) -> &T
    where
        F: FnOnce() -> T,
    {
        if !self.ready.load(Ordering::Acquire) {
            let _guard = self.lock.lock().unwrap();

            if !self.ready.load(Ordering::Relaxed) {
                // Safety: Readers check the ready flag before touching the
                // value, and we hold the lock, so there are no other
                // writers.
                unsafe {
                    *self.value.get() = Some(f());
                }
                self.ready.store(true, Ordering::Release);
            }
        }

        // Safety: The ready flag has been observed, so the value was
        // published by a release-store and will never change again.
        unsafe { (*self.value.get()).as_ref().unwrap() }
    }
}

impl<T> Default for Lazy<T> {
    fn default() -> Lazy<T> {
        Lazy::new()
    }
}

impl<T> fmt::Debug for Lazy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lazy")
            .field("ready", &self.ready.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[test]
    fn test_initializes_once() {
        let lazy = Lazy::new();
        let calls = AtomicUsize::new(0);

        let first = *lazy.get_or_init(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            42
        });
        let second = *lazy.get_or_init(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            43
        });

        assert_eq!(first, 42);
        assert_eq!(second, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_init() {
        let lazy = Lazy::new();
        let calls = AtomicUsize::new(0);

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    lazy.get_or_init(|| {
                        calls.fetch_add(1, Ordering::SeqCst);
                        1
                    });
                });
            }
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
