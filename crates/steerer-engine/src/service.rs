//! Process-wide steering library service.
//!
//! The steering library is not safe for concurrent use: the poller's
//! `poll_next_message` and the interactive thread's consume and command
//! calls all touch the same session tables. [`LibraryService`] owns the
//! library behind a single mutex and is shared as `Arc<LibraryService>`
//! by the poller and the steerer. Each call holds the lock for exactly
//! one closure and releases it immediately afterwards.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use steerer_core::{LibraryError, SteeringLibrary};

/// Owner of the steering library and its process-wide lock.
pub struct LibraryService {
    library: Mutex<Box<dyn SteeringLibrary>>,
    torn_down: AtomicBool,
}

impl LibraryService {
    /// Take ownership of a library and run its one-time initialisation.
    pub fn new(mut library: Box<dyn SteeringLibrary>) -> Result<Self, LibraryError> {
        library.initialize()?;
        tracing::debug!("steering library initialized");
        Ok(Self {
            library: Mutex::new(library),
            torn_down: AtomicBool::new(false),
        })
    }

    /// Run one library call under the lock.
    ///
    /// Fails with [`LibraryError::NotInitialized`] after
    /// [`teardown`](Self::teardown).
    pub fn with_library<R>(
        &self,
        f: impl FnOnce(&mut dyn SteeringLibrary) -> Result<R, LibraryError>,
    ) -> Result<R, LibraryError> {
        let mut guard = self.lock();
        // Checked under the lock so a teardown queued ahead of us wins.
        if self.torn_down.load(Ordering::Acquire) {
            return Err(LibraryError::NotInitialized);
        }
        f(&mut **guard)
    }

    /// Run `finalize` once. Later calls, and every later
    /// [`with_library`](Self::with_library), are no-ops / errors.
    pub fn teardown(&self) {
        let mut guard = self.lock();
        if self.torn_down.swap(true, Ordering::AcqRel) {
            return;
        }
        guard.finalize();
        tracing::debug!("steering library finalized");
    }

    /// Whether [`teardown`](Self::teardown) has run.
    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }

    fn lock(&self) -> MutexGuard<'_, Box<dyn SteeringLibrary>> {
        // Poisoned by a panic inside a library call; the guard is still usable.
        self.library.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("steering library lock was poisoned; recovering");
            poisoned.into_inner()
        })
    }
}

impl Drop for LibraryService {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for LibraryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibraryService")
            .field("torn_down", &self.is_torn_down())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;
    use steerer_test_utils::MockLibrary;

    #[test]
    fn initialize_and_finalize_run_once() {
        let lib = MockLibrary::new();
        let probe = lib.probe();
        let service = LibraryService::new(Box::new(lib)).unwrap();
        assert_eq!(probe.count("initialize"), 1);

        service.teardown();
        service.teardown();
        drop(service);
        assert_eq!(probe.count("finalize"), 1);
    }

    #[test]
    fn calls_after_teardown_fail() {
        let service = LibraryService::new(Box::new(MockLibrary::new())).unwrap();
        service.teardown();
        let err = service
            .with_library(|lib| lib.attach("sim"))
            .unwrap_err();
        assert_eq!(err, LibraryError::NotInitialized);
    }

    #[test]
    fn call_queued_behind_teardown_sees_finalized_library() {
        let lib = MockLibrary::new();
        let probe = lib.probe();
        probe.set_poll_delay(Duration::from_millis(200));
        let service = Arc::new(LibraryService::new(Box::new(lib)).unwrap());

        let poller = {
            let s = Arc::clone(&service);
            thread::spawn(move || s.with_library(|lib| lib.poll_next_message()))
        };
        while probe.calls_in_flight() == 0 {
            thread::sleep(Duration::from_millis(1));
        }
        let closer = {
            let s = Arc::clone(&service);
            thread::spawn(move || s.teardown())
        };
        // Give teardown time to queue on the lock ahead of the attach.
        thread::sleep(Duration::from_millis(50));
        let attacher = {
            let s = Arc::clone(&service);
            thread::spawn(move || s.with_library(|lib| lib.attach("sim")))
        };

        assert!(poller.join().unwrap().is_ok());
        closer.join().unwrap();
        let attached = attacher.join().unwrap();

        let calls = probe.calls();
        let finalize_at = calls.iter().position(|c| *c == "finalize").unwrap();
        match attached {
            Err(LibraryError::NotInitialized) => {
                assert!(!calls.contains(&"attach"), "attach reached the library: {calls:?}");
            }
            Ok(_) => {
                let attach_at = calls.iter().position(|c| *c == "attach").unwrap();
                assert!(attach_at < finalize_at, "attach ran after finalize: {calls:?}");
            }
            Err(other) => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn failed_initialize_is_reported() {
        let lib = MockLibrary::new();
        lib.probe().fail_call("initialize");
        match LibraryService::new(Box::new(lib)) {
            Err(LibraryError::CallFailed { call, .. }) => assert_eq!(call, "initialize"),
            other => panic!("expected CallFailed, got {other:?}"),
        }
    }

    #[test]
    fn calls_from_two_threads_never_overlap() {
        let lib = MockLibrary::new();
        let probe = lib.probe();
        let service = Arc::new(LibraryService::new(Box::new(lib)).unwrap());
        let handle = service.with_library(|lib| lib.attach("sim")).unwrap();

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let s = Arc::clone(&service);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        s.with_library(|lib| lib.consume_log(handle)).unwrap();
                        s.with_library(|lib| lib.poll_next_message()).unwrap();
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }
        assert_eq!(probe.max_concurrent_calls(), 1);
        assert_eq!(probe.count("consume_log"), 200);
    }
}
