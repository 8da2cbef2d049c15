//! Background poller: sleep, ask the library for the next message, post it.
//!
//! The poll thread owns nothing but an [`Outbox`] and a shared handle to
//! the [`LibraryService`]; it never touches session state. It sleeps
//! with `thread::park_timeout` so that [`Poller::stop`] can wake it
//! immediately with `unpark` instead of waiting out a long interval.
//!
//! # State machine
//!
//! ```text
//! Idle --start()--> Running --stop()--> StoppingRequested --(top of cycle)--> Idle
//! ```
//!
//! The stop flag is only observed at the wake point, never inside a
//! library call, so a poll already in flight always completes (and its
//! envelope is posted) before the thread exits. `stop()` joins the
//! thread, so once it returns nothing more can be posted.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use steerer_core::MessageTag;

use crate::config::{ConfigError, PollInterval, MAX_INTERVAL_SECS, MIN_INTERVAL_SECS};
use crate::relay::{Envelope, Outbox};
use crate::service::LibraryService;

/// Lifecycle state of the poller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollerState {
    /// No poll thread.
    Idle,
    /// The poll thread is cycling.
    Running,
    /// `stop()` has been called; the thread exits at its next wake point.
    StoppingRequested,
}

impl PollerState {
    fn to_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Running => 1,
            Self::StoppingRequested => 2,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Running,
            2 => Self::StoppingRequested,
            _ => Self::Idle,
        }
    }
}

/// Counters returned by the poll thread when it exits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PollStats {
    /// Library poll calls made.
    pub polls: u64,
    /// Envelopes posted (including poll-failure envelopes).
    pub posted: u64,
    /// Poll calls that failed.
    pub failures: u64,
}

/// Settings shared between the poller handle and its thread.
struct PollShared {
    interval_ms: AtomicU64,
    auto_poll: AtomicBool,
    stop_flag: AtomicBool,
    state: AtomicU8,
}

impl PollShared {
    fn set_state(&self, state: PollerState) {
        self.state.store(state.to_u8(), Ordering::Release);
    }
}

/// Handle to the background poll thread.
pub struct Poller {
    service: Arc<LibraryService>,
    outbox: Outbox,
    shared: Arc<PollShared>,
    thread: Option<JoinHandle<PollStats>>,
    last_stats: PollStats,
}

impl Poller {
    /// Create an idle poller. Nothing runs until [`start`](Self::start).
    pub fn new(
        service: Arc<LibraryService>,
        outbox: Outbox,
        interval: PollInterval,
        auto_poll: bool,
    ) -> Self {
        Self {
            service,
            outbox,
            shared: Arc::new(PollShared {
                interval_ms: AtomicU64::new(interval.as_millis()),
                auto_poll: AtomicBool::new(auto_poll),
                stop_flag: AtomicBool::new(false),
                state: AtomicU8::new(PollerState::Idle.to_u8()),
            }),
            thread: None,
            last_stats: PollStats::default(),
        }
    }

    /// Start polling. A no-op if the thread is already running.
    pub fn start(&mut self) -> Result<(), ConfigError> {
        if let Some(handle) = &self.thread {
            if !handle.is_finished() {
                return Ok(());
            }
            // The thread exited on its own (inbox dropped); reap it.
            self.stop();
        }

        self.shared.stop_flag.store(false, Ordering::Release);
        self.shared.set_state(PollerState::Running);

        let state = PollLoop {
            service: Arc::clone(&self.service),
            outbox: self.outbox.clone(),
            shared: Arc::clone(&self.shared),
            stats: PollStats::default(),
        };
        match thread::Builder::new()
            .name("steerer-poll".into())
            .spawn(move || state.run())
        {
            Ok(handle) => {
                tracing::debug!(interval_ms = self.interval().as_millis(), "poller started");
                self.thread = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.shared.set_state(PollerState::Idle);
                Err(ConfigError::ThreadSpawnFailed {
                    reason: format!("poll thread: {e}"),
                })
            }
        }
    }

    /// Stop polling and wait for the thread to exit.
    ///
    /// Safe to call while the thread sleeps: it is unparked and exits at
    /// once. If a poll is in flight, this waits for it to complete. Once
    /// this returns, no further envelope is posted. Idempotent.
    pub fn stop(&mut self) -> PollStats {
        let Some(handle) = self.thread.take() else {
            return self.last_stats;
        };

        self.shared.set_state(PollerState::StoppingRequested);
        self.shared.stop_flag.store(true, Ordering::Release);
        handle.thread().unpark();

        let stats = match handle.join() {
            Ok(stats) => stats,
            Err(_) => {
                tracing::error!("poll thread panicked");
                PollStats::default()
            }
        };
        self.shared.set_state(PollerState::Idle);
        tracing::debug!(
            polls = stats.polls,
            posted = stats.posted,
            failures = stats.failures,
            "poller stopped"
        );
        self.last_stats = stats;
        stats
    }

    /// Change the fixed interval. Takes effect from the next sleep; a sleep
    /// already in progress is not cut short.
    pub fn set_interval(&self, interval: PollInterval) {
        self.shared
            .interval_ms
            .store(interval.as_millis(), Ordering::Release);
    }

    /// The fixed interval.
    pub fn interval(&self) -> PollInterval {
        let ms = self.shared.interval_ms.load(Ordering::Acquire);
        PollInterval::from_millis(ms).unwrap_or_default()
    }

    /// Switch between the fixed interval and the library's recommendation.
    pub fn set_auto_poll(&self, enabled: bool) {
        self.shared.auto_poll.store(enabled, Ordering::Release);
    }

    /// Whether auto-poll mode is on.
    pub fn auto_poll(&self) -> bool {
        self.shared.auto_poll.load(Ordering::Acquire)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PollerState {
        PollerState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    /// Whether a poll thread exists and has not exited.
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Poller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("state", &self.state())
            .field("interval", &self.interval())
            .field("auto_poll", &self.auto_poll())
            .finish()
    }
}

/// State owned by the poll thread.
struct PollLoop {
    service: Arc<LibraryService>,
    outbox: Outbox,
    shared: Arc<PollShared>,
    stats: PollStats,
}

impl PollLoop {
    /// Main loop. Runs until the stop flag is seen at a wake point or the
    /// inbox is dropped.
    fn run(mut self) -> PollStats {
        loop {
            if self.stopping() {
                break;
            }
            let interval = self.effective_interval();
            self.sleep(interval);
            if self.stopping() {
                break;
            }
            if !self.poll_once() {
                tracing::debug!("inbox dropped; poll thread exiting");
                break;
            }
        }
        self.shared.set_state(PollerState::Idle);
        self.stats
    }

    fn stopping(&self) -> bool {
        self.shared.stop_flag.load(Ordering::Acquire)
    }

    /// The interval for this cycle.
    fn effective_interval(&self) -> Duration {
        let fixed = Duration::from_millis(self.shared.interval_ms.load(Ordering::Acquire));
        if !self.shared.auto_poll.load(Ordering::Acquire) {
            return fixed;
        }
        let recommended = self
            .service
            .with_library(|lib| Ok(lib.recommended_interval()))
            .ok()
            .flatten();
        match recommended {
            Some(d) => d.clamp(
                Duration::from_secs_f64(MIN_INTERVAL_SECS),
                Duration::from_secs_f64(MAX_INTERVAL_SECS),
            ),
            None => fixed,
        }
    }

    /// Park until the interval elapses or `stop()` unparks us.
    /// Spurious wakeups go back to sleep for the remainder.
    fn sleep(&self, interval: Duration) {
        let deadline = Instant::now() + interval;
        loop {
            if self.stopping() {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            thread::park_timeout(deadline - now);
        }
    }

    /// One poll. Returns `false` if the inbox is gone.
    fn poll_once(&mut self) -> bool {
        self.stats.polls += 1;
        let envelope = match self.service.with_library(|lib| lib.poll_next_message()) {
            Ok(Some((_, MessageTag::NotSet))) | Ok(None) => return true,
            Ok(Some((handle, tag))) => {
                tracing::trace!(handle = %handle, tag = %tag, "message pending");
                Envelope::to(handle, tag)
            }
            Err(e) => {
                self.stats.failures += 1;
                tracing::debug!(err = %e, "poll failed; retrying next cycle");
                Envelope::poll_failed()
            }
        };
        if !self.outbox.post(envelope) {
            return false;
        }
        self.stats.posted += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::{channel, Inbox};
    use steerer_core::SimHandle;
    use steerer_test_utils::{LibraryProbe, MockLibrary};

    fn setup(interval_ms: u64) -> (Poller, Inbox, LibraryProbe) {
        let lib = MockLibrary::new();
        let probe = lib.probe();
        let service = Arc::new(LibraryService::new(Box::new(lib)).unwrap());
        let (outbox, inbox) = channel();
        let poller = Poller::new(
            service,
            outbox,
            PollInterval::from_millis(interval_ms).unwrap(),
            false,
        );
        (poller, inbox, probe)
    }

    #[test]
    fn starts_idle_and_returns_to_idle() {
        let (mut poller, _inbox, _probe) = setup(100);
        assert_eq!(poller.state(), PollerState::Idle);
        poller.start().unwrap();
        assert_eq!(poller.state(), PollerState::Running);
        assert!(poller.is_running());
        poller.stop();
        assert_eq!(poller.state(), PollerState::Idle);
        assert!(!poller.is_running());
    }

    #[test]
    fn start_is_idempotent_and_stop_is_idempotent() {
        let (mut poller, _inbox, _probe) = setup(100);
        poller.start().unwrap();
        poller.start().unwrap();
        assert_eq!(poller.state(), PollerState::Running);
        poller.stop();
        let again = poller.stop();
        assert_eq!(poller.state(), PollerState::Idle);
        assert_eq!(again, poller.last_stats);
    }

    #[test]
    fn posts_queued_message() {
        let (mut poller, inbox, probe) = setup(100);
        probe.push_message(SimHandle(3), MessageTag::ParamDefs);
        poller.start().unwrap();
        let env = inbox
            .next_timeout(Duration::from_secs(2))
            .expect("no envelope within 2s");
        assert_eq!(env, Envelope::to(SimHandle(3), MessageTag::ParamDefs));
        poller.stop();
    }

    #[test]
    fn poll_failure_posts_error_and_keeps_running() {
        let (mut poller, inbox, probe) = setup(100);
        probe.push_poll_error();
        probe.push_message(SimHandle(1), MessageTag::Status);
        poller.start().unwrap();

        let first = inbox.next_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(first, Envelope::poll_failed());
        let second = inbox.next_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(second, Envelope::to(SimHandle(1), MessageTag::Status));

        let stats = poller.stop();
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.posted, 2);
    }

    #[test]
    fn unknown_message_code_counts_as_poll_failure() {
        let (mut poller, inbox, probe) = setup(100);
        probe.push_message_code(SimHandle(1), 42);
        probe.push_message_code(SimHandle(1), MessageTag::IoDefs.code());
        poller.start().unwrap();

        let first = inbox.next_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(first, Envelope::poll_failed());
        let second = inbox.next_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(second, Envelope::to(SimHandle(1), MessageTag::IoDefs));
        assert_eq!(poller.stop().failures, 1);
    }

    #[test]
    fn not_set_is_not_posted() {
        let (mut poller, inbox, probe) = setup(100);
        probe.push_message(SimHandle(1), MessageTag::NotSet);
        poller.start().unwrap();
        let deadline = Instant::now() + Duration::from_secs(2);
        while probe.pending_messages() > 0 {
            assert!(Instant::now() < deadline, "message never polled");
            thread::sleep(Duration::from_millis(10));
        }
        poller.stop();
        assert!(inbox.is_empty());
    }

    /// With a 10 s interval the thread is parked when stop() is called;
    /// unpark must cut the sleep short.
    #[test]
    fn stop_interrupts_long_sleep() {
        let (mut poller, _inbox, _probe) = setup(10_000);
        poller.start().unwrap();
        thread::sleep(Duration::from_millis(50));
        let start = Instant::now();
        poller.stop();
        let wall_ms = start.elapsed().as_millis();
        assert!(wall_ms < 500, "stop took {wall_ms}ms with a 10s interval");
    }

    #[test]
    fn stop_waits_for_in_flight_poll_and_nothing_follows() {
        let (mut poller, inbox, probe) = setup(100);
        probe.set_poll_delay(Duration::from_millis(300));
        probe.push_message(SimHandle(1), MessageTag::Status);
        probe.push_message(SimHandle(1), MessageTag::Status);
        probe.push_message(SimHandle(1), MessageTag::Status);
        poller.start().unwrap();

        // Wait until the first poll call is under way.
        let deadline = Instant::now() + Duration::from_secs(2);
        while probe.count("poll_next_message") == 0 {
            assert!(Instant::now() < deadline, "poll never started");
            thread::sleep(Duration::from_millis(5));
        }
        poller.stop();

        assert_eq!(probe.calls_in_flight(), 0);
        // The in-flight poll completed and its envelope was posted.
        let posted = inbox.len();
        assert!(posted >= 1);
        thread::sleep(Duration::from_millis(400));
        assert_eq!(inbox.len(), posted, "envelope posted after stop()");
    }

    #[test]
    fn restart_after_stop() {
        let (mut poller, inbox, probe) = setup(100);
        poller.start().unwrap();
        poller.stop();
        probe.push_message(SimHandle(2), MessageTag::IoDefs);
        poller.start().unwrap();
        let env = inbox.next_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(env.tag, MessageTag::IoDefs);
        poller.stop();
    }

    #[test]
    fn set_interval_applies_to_next_sleep() {
        let (mut poller, _inbox, probe) = setup(10_000);
        poller.start().unwrap();
        poller.set_interval(PollInterval::from_millis(100).unwrap());
        assert_eq!(poller.interval().as_millis(), 100);
        // The first 10 s sleep is not interrupted by the change.
        thread::sleep(Duration::from_millis(300));
        assert_eq!(probe.count("poll_next_message"), 0);
        poller.stop();
    }

    #[test]
    fn auto_poll_uses_recommended_interval() {
        let (mut poller, inbox, probe) = setup(10_000);
        probe.set_recommended_interval(Some(Duration::from_millis(100)));
        probe.push_message(SimHandle(1), MessageTag::ChkDefs);
        poller.set_auto_poll(true);
        assert!(poller.auto_poll());
        poller.start().unwrap();
        let env = inbox.next_timeout(Duration::from_secs(2));
        assert_eq!(env, Some(Envelope::to(SimHandle(1), MessageTag::ChkDefs)));
        poller.stop();
    }

    #[test]
    fn auto_poll_without_recommendation_falls_back_to_fixed() {
        let (mut poller, _inbox, probe) = setup(100);
        poller.set_auto_poll(true);
        poller.start().unwrap();
        let deadline = Instant::now() + Duration::from_secs(2);
        while probe.count("poll_next_message") == 0 {
            assert!(Instant::now() < deadline, "no poll with fixed fallback");
            thread::sleep(Duration::from_millis(10));
        }
        poller.stop();
    }

    #[test]
    fn thread_exits_when_inbox_dropped() {
        let (mut poller, inbox, probe) = setup(100);
        probe.push_message(SimHandle(1), MessageTag::Status);
        drop(inbox);
        poller.start().unwrap();
        let deadline = Instant::now() + Duration::from_secs(2);
        while poller.is_running() {
            assert!(Instant::now() < deadline, "poll thread did not exit");
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(poller.state(), PollerState::Idle);
    }
}
