//! Test utilities and mock types for steering client development.
//!
//! Provides [`MockLibrary`], a scripted in-memory implementation of
//! [`SteeringLibrary`], together with a [`LibraryProbe`] that tests keep
//! after the library has been boxed and moved into the engine. The probe
//! queues poll results, injects failures, sets per-session definitions,
//! and records every call for assertions.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

pub use fixtures::{iotype, param, RecordingNotifier};

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use steerer_core::{
    ChkLogEntry, CommandRequest, IoTypeId, IoTypeDef, LibraryError, LogEntry, MessageTag,
    ParamDef, ParamHandle, SimHandle, StatusReport, SteeringLibrary, SupportedCommand,
};

type PollResult = Result<Option<(SimHandle, MessageTag)>, LibraryError>;

/// Per-simulation state held by the mock.
#[derive(Default)]
struct SimState {
    identifier: String,
    attached: bool,
    params: Vec<ParamDef>,
    iotypes: Vec<IoTypeDef>,
    chktypes: Vec<IoTypeDef>,
    log: Vec<LogEntry>,
    supported: Vec<SupportedCommand>,
    status: VecDeque<StatusReport>,
    chk_log: HashMap<IoTypeId, Vec<ChkLogEntry>>,
    emitted: Vec<SupportedCommand>,
    controls: Vec<CommandRequest>,
    restarts: Vec<String>,
    frequencies: Vec<(IoTypeId, u32)>,
    param_values: Vec<(ParamHandle, String)>,
}

struct Inner {
    next_handle: i32,
    sims: HashMap<SimHandle, SimState>,
    pending: VecDeque<PollResult>,
    failing: HashSet<&'static str>,
    calls: Vec<(&'static str, Option<SimHandle>)>,
    default_supported: Vec<SupportedCommand>,
    recommended: Option<Duration>,
    poll_delay: Duration,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            next_handle: 1,
            sims: HashMap::new(),
            pending: VecDeque::new(),
            failing: HashSet::new(),
            calls: Vec::new(),
            default_supported: vec![
                SupportedCommand::Stop,
                SupportedCommand::Pause,
                SupportedCommand::Resume,
                SupportedCommand::Detach,
            ],
            recommended: None,
            poll_delay: Duration::ZERO,
        }
    }
}

#[derive(Default)]
struct Shared {
    inner: Mutex<Inner>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Shared {
    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }
}

/// Tracks one library call for the concurrency high-water mark.
struct CallGuard<'a>(&'a Shared);

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Scripted steering library.
///
/// Handles are issued sequentially from 1. Every call is recorded; a call
/// whose name was passed to [`LibraryProbe::fail_call`] returns
/// [`LibraryError::CallFailed`] until cleared.
pub struct MockLibrary {
    shared: Arc<Shared>,
}

impl MockLibrary {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared::default()),
        }
    }

    /// A handle for scripting and inspecting this library after it has
    /// been moved into the engine.
    pub fn probe(&self) -> LibraryProbe {
        LibraryProbe {
            shared: Arc::clone(&self.shared),
        }
    }

    fn enter(&self, call: &'static str, handle: Option<SimHandle>) -> Result<CallGuard<'_>, LibraryError> {
        let now = self.shared.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.shared.max_in_flight.fetch_max(now, Ordering::AcqRel);
        let guard = CallGuard(&self.shared);
        let mut inner = self.shared.inner();
        inner.calls.push((call, handle));
        if inner.failing.contains(call) {
            return Err(LibraryError::failed(call));
        }
        Ok(guard)
    }

    fn with_sim<R>(
        &self,
        call: &'static str,
        handle: SimHandle,
        f: impl FnOnce(&mut SimState) -> R,
    ) -> Result<R, LibraryError> {
        let _guard = self.enter(call, Some(handle))?;
        let mut inner = self.shared.inner();
        match inner.sims.get_mut(&handle) {
            Some(sim) if sim.attached => Ok(f(sim)),
            _ => Err(LibraryError::UnknownHandle { handle }),
        }
    }
}

impl Default for MockLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl SteeringLibrary for MockLibrary {
    fn initialize(&mut self) -> Result<(), LibraryError> {
        self.enter("initialize", None).map(drop)
    }

    fn finalize(&mut self) {
        let _ = self.enter("finalize", None);
    }

    fn attach(&mut self, identifier: &str) -> Result<SimHandle, LibraryError> {
        let _guard = self.enter("attach", None)?;
        let mut inner = self.shared.inner();
        let handle = SimHandle(inner.next_handle);
        inner.next_handle += 1;
        let supported = inner.default_supported.clone();
        let sim = inner.sims.entry(handle).or_default();
        sim.identifier = identifier.to_string();
        sim.attached = true;
        sim.supported = supported;
        Ok(handle)
    }

    fn detach(&mut self, handle: SimHandle) -> Result<(), LibraryError> {
        self.with_sim("detach", handle, |sim| sim.attached = false)
    }

    fn delete_sim_table_entry(&mut self, handle: SimHandle) {
        let _ = self.with_sim("delete_sim_table_entry", handle, |sim| sim.attached = false);
    }

    fn poll_next_message(&mut self) -> Result<Option<(SimHandle, MessageTag)>, LibraryError> {
        let _guard = self.enter("poll_next_message", None)?;
        let delay = self.shared.inner().poll_delay;
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        self.shared.inner().pending.pop_front().unwrap_or(Ok(None))
    }

    fn recommended_interval(&mut self) -> Option<Duration> {
        let _ = self.enter("recommended_interval", None);
        self.shared.inner().recommended
    }

    fn supported_commands(
        &mut self,
        handle: SimHandle,
    ) -> Result<Vec<SupportedCommand>, LibraryError> {
        self.with_sim("supported_commands", handle, |sim| sim.supported.clone())
    }

    fn consume_param_defs(&mut self, handle: SimHandle) -> Result<(), LibraryError> {
        self.with_sim("consume_param_defs", handle, |_| ())
    }

    fn consume_iotype_defs(&mut self, handle: SimHandle) -> Result<(), LibraryError> {
        self.with_sim("consume_iotype_defs", handle, |_| ())
    }

    fn consume_chktype_defs(&mut self, handle: SimHandle) -> Result<(), LibraryError> {
        self.with_sim("consume_chktype_defs", handle, |_| ())
    }

    fn consume_status(&mut self, handle: SimHandle) -> Result<StatusReport, LibraryError> {
        self.with_sim("consume_status", handle, |sim| {
            sim.status.pop_front().unwrap_or_default()
        })
    }

    fn consume_log(&mut self, handle: SimHandle) -> Result<(), LibraryError> {
        self.with_sim("consume_log", handle, |_| ())
    }

    fn param_defs(&mut self, handle: SimHandle) -> Result<Vec<ParamDef>, LibraryError> {
        self.with_sim("param_defs", handle, |sim| sim.params.clone())
    }

    fn iotype_defs(&mut self, handle: SimHandle) -> Result<Vec<IoTypeDef>, LibraryError> {
        self.with_sim("iotype_defs", handle, |sim| sim.iotypes.clone())
    }

    fn chktype_defs(&mut self, handle: SimHandle) -> Result<Vec<IoTypeDef>, LibraryError> {
        self.with_sim("chktype_defs", handle, |sim| sim.chktypes.clone())
    }

    fn param_log(&mut self, handle: SimHandle) -> Result<Vec<LogEntry>, LibraryError> {
        self.with_sim("param_log", handle, |sim| sim.log.clone())
    }

    fn set_param_values(
        &mut self,
        handle: SimHandle,
        values: &[(ParamHandle, String)],
    ) -> Result<(), LibraryError> {
        self.with_sim("set_param_values", handle, |sim| {
            sim.param_values.extend_from_slice(values)
        })
    }

    fn emit_command(
        &mut self,
        handle: SimHandle,
        command: SupportedCommand,
    ) -> Result<(), LibraryError> {
        self.with_sim("emit_command", handle, |sim| sim.emitted.push(command))
    }

    fn emit_control(
        &mut self,
        handle: SimHandle,
        requests: &[CommandRequest],
    ) -> Result<(), LibraryError> {
        self.with_sim("emit_control", handle, |sim| {
            sim.controls.extend_from_slice(requests)
        })
    }

    fn emit_restart(&mut self, handle: SimHandle, gsh: &str) -> Result<(), LibraryError> {
        self.with_sim("emit_restart", handle, |sim| sim.restarts.push(gsh.to_string()))
    }

    fn set_frequency(
        &mut self,
        handle: SimHandle,
        ids: &[IoTypeId],
        freqs: &[u32],
    ) -> Result<(), LibraryError> {
        self.with_sim("set_frequency", handle, |sim| {
            sim.frequencies
                .extend(ids.iter().copied().zip(freqs.iter().copied()))
        })
    }

    fn checkpoint_log(
        &mut self,
        handle: SimHandle,
        chk_type: IoTypeId,
    ) -> Result<Vec<ChkLogEntry>, LibraryError> {
        self.with_sim("checkpoint_log", handle, |sim| {
            sim.chk_log.get(&chk_type).cloned().unwrap_or_default()
        })
    }
}

/// Scripting and inspection handle for a [`MockLibrary`].
#[derive(Clone)]
pub struct LibraryProbe {
    shared: Arc<Shared>,
}

impl LibraryProbe {
    // ── scripting ────────────────────────────────────────────────

    /// Queue a message for the next poll.
    pub fn push_message(&self, handle: SimHandle, tag: MessageTag) {
        self.shared.inner().pending.push_back(Ok(Some((handle, tag))));
    }

    /// Queue a message by raw code, decoded the way a library adapter would.
    pub fn push_message_code(&self, handle: SimHandle, code: i32) {
        let result = MessageTag::decode(code).map(|tag| Some((handle, tag)));
        self.shared.inner().pending.push_back(result);
    }

    /// Queue a poll failure.
    pub fn push_poll_error(&self) {
        self.shared
            .inner()
            .pending
            .push_back(Err(LibraryError::failed("poll_next_message")));
    }

    /// Make every call with this name fail until [`clear_failure`](Self::clear_failure).
    pub fn fail_call(&self, call: &'static str) {
        self.shared.inner().failing.insert(call);
    }

    /// Stop failing calls with this name.
    pub fn clear_failure(&self, call: &'static str) {
        self.shared.inner().failing.remove(call);
    }

    /// Commands advertised by simulations attached from now on.
    pub fn set_default_supported(&self, commands: Vec<SupportedCommand>) {
        self.shared.inner().default_supported = commands;
    }

    /// Value returned by `recommended_interval`.
    pub fn set_recommended_interval(&self, interval: Option<Duration>) {
        self.shared.inner().recommended = interval;
    }

    /// Make every poll take this long (while holding the library lock).
    pub fn set_poll_delay(&self, delay: Duration) {
        self.shared.inner().poll_delay = delay;
    }

    pub fn set_params(&self, handle: SimHandle, params: Vec<ParamDef>) {
        self.sim(handle, |sim| sim.params = params);
    }

    pub fn set_iotypes(&self, handle: SimHandle, iotypes: Vec<IoTypeDef>) {
        self.sim(handle, |sim| sim.iotypes = iotypes);
    }

    pub fn set_chktypes(&self, handle: SimHandle, chktypes: Vec<IoTypeDef>) {
        self.sim(handle, |sim| sim.chktypes = chktypes);
    }

    pub fn set_log(&self, handle: SimHandle, log: Vec<LogEntry>) {
        self.sim(handle, |sim| sim.log = log);
    }

    /// Queue the payload returned by the next `consume_status`.
    pub fn push_status(&self, handle: SimHandle, report: StatusReport) {
        self.sim(handle, |sim| sim.status.push_back(report));
    }

    pub fn set_checkpoint_log(&self, handle: SimHandle, chk_type: IoTypeId, entries: Vec<ChkLogEntry>) {
        self.sim(handle, |sim| {
            sim.chk_log.insert(chk_type, entries);
        });
    }

    // ── inspection ───────────────────────────────────────────────

    /// Number of recorded calls with this name.
    pub fn count(&self, call: &str) -> usize {
        self.shared
            .inner()
            .calls
            .iter()
            .filter(|(name, _)| *name == call)
            .count()
    }

    /// Names of all recorded calls, in order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.shared.inner().calls.iter().map(|(name, _)| *name).collect()
    }

    /// Names of recorded calls made for one session, in order.
    pub fn calls_for(&self, handle: SimHandle) -> Vec<&'static str> {
        self.shared
            .inner()
            .calls
            .iter()
            .filter(|(_, h)| *h == Some(handle))
            .map(|(name, _)| *name)
            .collect()
    }

    /// Highest number of library calls observed running at once.
    pub fn max_concurrent_calls(&self) -> usize {
        self.shared.max_in_flight.load(Ordering::Acquire)
    }

    /// Library calls running right now.
    pub fn calls_in_flight(&self) -> usize {
        self.shared.in_flight.load(Ordering::Acquire)
    }

    /// Polls queued but not yet consumed.
    pub fn pending_messages(&self) -> usize {
        self.shared.inner().pending.len()
    }

    pub fn is_attached(&self, handle: SimHandle) -> bool {
        self.shared
            .inner()
            .sims
            .get(&handle)
            .is_some_and(|sim| sim.attached)
    }

    pub fn identifier(&self, handle: SimHandle) -> Option<String> {
        self.shared
            .inner()
            .sims
            .get(&handle)
            .map(|sim| sim.identifier.clone())
    }

    pub fn emitted_commands(&self, handle: SimHandle) -> Vec<SupportedCommand> {
        self.read_sim(handle, |sim| sim.emitted.clone())
    }

    pub fn emitted_controls(&self, handle: SimHandle) -> Vec<CommandRequest> {
        self.read_sim(handle, |sim| sim.controls.clone())
    }

    pub fn restarts(&self, handle: SimHandle) -> Vec<String> {
        self.read_sim(handle, |sim| sim.restarts.clone())
    }

    pub fn sent_frequencies(&self, handle: SimHandle) -> Vec<(IoTypeId, u32)> {
        self.read_sim(handle, |sim| sim.frequencies.clone())
    }

    pub fn sent_param_values(&self, handle: SimHandle) -> Vec<(ParamHandle, String)> {
        self.read_sim(handle, |sim| sim.param_values.clone())
    }

    fn sim(&self, handle: SimHandle, f: impl FnOnce(&mut SimState)) {
        let mut inner = self.shared.inner();
        f(inner.sims.entry(handle).or_default());
    }

    fn read_sim<R: Default>(&self, handle: SimHandle, f: impl FnOnce(&SimState) -> R) -> R {
        self.shared.inner().sims.get(&handle).map(f).unwrap_or_default()
    }
}
