//! The steering client: attach, steer, poll, dispatch, close.
//!
//! [`Steerer`] is owned by the interactive thread. It holds the library
//! service, the poller, the inbox end of the relay, the session registry
//! and the notifier. The embedding front-end calls
//! [`process_pending`](Steerer::process_pending) (or
//! [`process_for`](Steerer::process_for)) from its event loop to drain
//! envelopes posted by the poller.
//!
//! # Shutdown
//!
//! [`shutdown`](Steerer::shutdown) stops the poller (joining its thread),
//! detaches every attached session and tears the library down. It is
//! idempotent and also runs on drop.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use steerer_core::{
    ChkLogEntry, CommandRequest, IoTypeId, LibraryError, Notifier, ParamHandle, SimHandle,
    SteeringLibrary, SupportedCommand,
};

use crate::config::{ConfigError, PollInterval, SteererConfig};
use crate::dispatch::{DispatchOutcome, Dispatcher, ERROR_TITLE};
use crate::error::{AttachError, CommandError, StartupError};
use crate::poller::{Poller, PollerState};
use crate::registry::SessionRegistry;
use crate::relay::{self, Inbox};
use crate::service::LibraryService;
use crate::session::{Capabilities, SessionView};

/// Warning body when attach fails after the library accepted it.
pub const ATTACH_FAILED_MESSAGE: &str = "Internal error - attach failed";
/// Main status line when the library refuses an attach.
pub const ATTACH_REFUSED_STATUS: &str = "Failed to attach";
/// Session status line while attached and running.
pub const ATTACHED_STATUS: &str = "Attached to application";

/// How a session identifier is interpreted by the library.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttachMode {
    /// A steering directory on the local filesystem.
    Local,
    /// A remote steering service address.
    Remote,
}

/// Steering client for any number of simulations.
pub struct Steerer {
    service: Arc<LibraryService>,
    poller: Poller,
    inbox: Inbox,
    registry: SessionRegistry,
    notifier: Box<dyn Notifier>,
    config: SteererConfig,
    shut_down: bool,
}

impl Steerer {
    /// Validate `config`, initialise the library, and build an idle
    /// steerer. Polling starts with the first attach.
    pub fn new(
        library: Box<dyn SteeringLibrary>,
        notifier: Box<dyn Notifier>,
        config: SteererConfig,
    ) -> Result<Self, StartupError> {
        config.validate()?;
        let interval = config.poll_interval()?;
        let service = Arc::new(LibraryService::new(library)?);
        let (outbox, inbox) = relay::channel();
        let poller = Poller::new(
            Arc::clone(&service),
            outbox,
            interval,
            config.poll.auto_poll,
        );
        Ok(Self {
            service,
            poller,
            inbox,
            registry: SessionRegistry::new(),
            notifier,
            config,
            shut_down: false,
        })
    }

    // ── attach / close ──────────────────────────────────────────

    /// Attach to a simulation and start polling if this is the first.
    pub fn attach(
        &mut self,
        identifier: &str,
        mode: AttachMode,
    ) -> Result<SimHandle, AttachError> {
        let handle = match self.service.with_library(|lib| lib.attach(identifier)) {
            Ok(handle) => handle,
            Err(e) => {
                tracing::info!(identifier, err = %e, "attach refused");
                self.notifier.global_status(ATTACH_REFUSED_STATUS);
                return Err(AttachError::Library(e));
            }
        };

        let supported = self
            .service
            .with_library(|lib| lib.supported_commands(handle));
        let supported = match supported {
            Ok(supported) => supported,
            Err(e) => {
                self.abandon_attach(handle, &e);
                return Err(AttachError::Library(e));
            }
        };

        let mut view = SessionView::new(
            handle,
            identifier,
            mode == AttachMode::Local,
            Capabilities::from_commands(&supported),
        );
        view.set_status(ATTACHED_STATUS);
        self.registry.add(view);

        if let Err(e) = self.poller.start() {
            self.registry.close(handle);
            self.abandon_attach(handle, &e);
            return Err(AttachError::Poller(e));
        }

        tracing::info!(handle = %handle, identifier, ?mode, "attached");
        self.notifier.status(handle, ATTACHED_STATUS);
        Ok(handle)
    }

    /// Attach to a local simulation through its steering directory.
    ///
    /// Falls back to the configured default directory
    /// (`REG_STEER_DIRECTORY`) when `dir` is `None`.
    pub fn attach_local(&mut self, dir: Option<&Path>) -> Result<SimHandle, AttachError> {
        let dir = match dir {
            Some(dir) => dir.to_path_buf(),
            None => self
                .config
                .default_attach_dir
                .clone()
                .ok_or(AttachError::NoAttachDirectory)?,
        };
        self.attach(&dir.to_string_lossy(), AttachMode::Local)
    }

    fn abandon_attach(&mut self, handle: SimHandle, err: &dyn std::error::Error) {
        tracing::warn!(handle = %handle, err = %err, "attach failed after library accepted it");
        if let Err(e) = self.service.with_library(|lib| lib.detach(handle)) {
            tracing::debug!(handle = %handle, err = %e, "detach after failed attach also failed");
        }
        self.notifier.warning(ERROR_TITLE, ATTACH_FAILED_MESSAGE);
    }

    /// Close a session: detach if the library still has it, drop its view,
    /// and stop polling once no session is attached.
    ///
    /// Returns the closed view, or `None` for an unknown handle.
    pub fn close_session(&mut self, handle: SimHandle) -> Option<SessionView> {
        let view = self.registry.close(handle)?;
        if view.is_attached() {
            if let Err(e) = self.service.with_library(|lib| lib.detach(handle)) {
                tracing::debug!(handle = %handle, err = %e, "detach on close failed");
            }
        }
        tracing::info!(handle = %handle, "session closed");
        self.stop_poller_if_idle();
        Some(view)
    }

    // ── single commands ─────────────────────────────────────────

    /// Ask the simulation to stop. The session becomes read-only until the
    /// simulation acknowledges.
    pub fn emit_stop(&mut self, handle: SimHandle) -> Result<(), CommandError> {
        self.emit_command(handle, SupportedCommand::Stop)
    }

    /// Pause the simulation.
    pub fn emit_pause(&mut self, handle: SimHandle) -> Result<(), CommandError> {
        self.emit_command(handle, SupportedCommand::Pause)
    }

    /// Resume a paused simulation.
    pub fn emit_resume(&mut self, handle: SimHandle) -> Result<(), CommandError> {
        self.emit_command(handle, SupportedCommand::Resume)
    }

    /// Ask the simulation to detach the client.
    pub fn emit_detach(&mut self, handle: SimHandle) -> Result<(), CommandError> {
        self.emit_command(handle, SupportedCommand::Detach)
    }

    fn emit_command(
        &mut self,
        handle: SimHandle,
        command: SupportedCommand,
    ) -> Result<(), CommandError> {
        self.session(handle)?.check_command(command)?;
        self.library_call(handle, |lib| lib.emit_command(handle, command))?;
        if let Some(view) = self.registry.get_mut(handle) {
            let status = view.apply_command(command);
            view.set_status(status);
            self.notifier.status(handle, status);
        }
        tracing::debug!(handle = %handle, %command, "command sent");
        Ok(())
    }

    /// Restart the simulation from a logged checkpoint of `chk_type`.
    ///
    /// The tag must appear in the type's checkpoint log. The request goes
    /// out as a control message on the checkpoint type with an
    /// `IN <tag>` parameter.
    pub fn emit_restart(
        &mut self,
        handle: SimHandle,
        chk_type: IoTypeId,
        tag: &str,
    ) -> Result<(), CommandError> {
        self.require_io(handle)?;
        let log = self.checkpoint_log(handle, chk_type)?;
        if !log.iter().any(|entry| entry.tag == tag) {
            return Err(CommandError::UnknownCheckpoint {
                chk_type,
                tag: tag.to_string(),
            });
        }
        let request = [CommandRequest::with_param(chk_type, format!("IN {tag}"))];
        self.library_call(handle, |lib| lib.emit_control(handle, &request))?;
        tracing::debug!(handle = %handle, chk_type = %chk_type, tag, "restart sent");
        Ok(())
    }

    /// Restart the simulation on the grid service named by `gsh`.
    pub fn emit_grid_restart(&mut self, handle: SimHandle, gsh: &str) -> Result<(), CommandError> {
        self.require_io(handle)?;
        self.library_call(handle, |lib| lib.emit_restart(handle, gsh))?;
        tracing::debug!(handle = %handle, gsh, "grid restart sent");
        Ok(())
    }

    /// Ask for one emit/consume of a sample type, or the creation of a
    /// checkpoint, now.
    ///
    /// Checkpoint types carry an `OUT 1` parameter.
    pub fn emit_iotype(
        &mut self,
        handle: SimHandle,
        iotype: IoTypeId,
    ) -> Result<(), CommandError> {
        self.require_io(handle)?;
        let view = self.session(handle)?;
        let request = if view.chktypes().iter().any(|t| t.id == iotype) {
            CommandRequest::with_param(iotype, "OUT 1")
        } else if view.iotypes().iter().any(|t| t.id == iotype) {
            CommandRequest::iotype(iotype)
        } else {
            return Err(CommandError::UnknownIoType { id: iotype });
        };
        self.library_call(handle, |lib| lib.emit_control(handle, &[request]))
    }

    // ── parameters and frequencies ──────────────────────────────

    /// Stage a new value for a steerable parameter.
    pub fn set_parameter(
        &mut self,
        handle: SimHandle,
        param: ParamHandle,
        value: impl Into<String>,
    ) -> Result<(), CommandError> {
        self.session_mut(handle)?.stage_param(param, value.into())
    }

    /// Send every staged parameter value in one library call.
    ///
    /// Returns the number of values sent.
    pub fn emit_parameters(&mut self, handle: SimHandle) -> Result<usize, CommandError> {
        self.require_writable(handle)?;
        let values = self.session_mut(handle)?.take_staged_params();
        if values.is_empty() {
            return Ok(0);
        }
        self.library_call(handle, |lib| lib.set_param_values(handle, &values))?;
        Ok(values.len())
    }

    /// Validate and stage an automatic frequency.
    pub fn stage_frequency(
        &mut self,
        handle: SimHandle,
        iotype: IoTypeId,
        frequency: u32,
    ) -> Result<(), CommandError> {
        self.session_mut(handle)?.stage_frequency(iotype, frequency)
    }

    /// Set every staged frequency, then emit a control message so the
    /// simulation receives them.
    ///
    /// Returns the number of frequencies sent.
    pub fn emit_frequencies(&mut self, handle: SimHandle) -> Result<usize, CommandError> {
        self.require_writable(handle)?;
        let (ids, freqs) = self.session_mut(handle)?.take_staged_frequencies();
        if ids.is_empty() {
            return Ok(0);
        }
        self.library_call(handle, |lib| lib.set_frequency(handle, &ids, &freqs))?;
        // Frequencies travel with the next control message; send an empty one.
        self.library_call(handle, |lib| lib.emit_control(handle, &[]))?;
        Ok(ids.len())
    }

    /// Checkpoint log entries for a checkpoint type.
    pub fn checkpoint_log(
        &mut self,
        handle: SimHandle,
        chk_type: IoTypeId,
    ) -> Result<Vec<ChkLogEntry>, CommandError> {
        if !self.session(handle)?.chktypes().iter().any(|t| t.id == chk_type) {
            return Err(CommandError::UnknownIoType { id: chk_type });
        }
        self.library_call(handle, |lib| lib.checkpoint_log(handle, chk_type))
    }

    // ── poll interval ───────────────────────────────────────────

    /// Set the fixed poll interval from user-entered seconds.
    ///
    /// Out-of-range values are rejected and leave the interval unchanged.
    pub fn set_poll_interval_secs(&mut self, secs: f64) -> Result<PollInterval, ConfigError> {
        let interval = PollInterval::from_secs(secs)?;
        self.poller.set_interval(interval);
        self.config.poll.interval_ms = interval.as_millis();
        tracing::debug!(%interval, "poll interval changed");
        Ok(interval)
    }

    /// The fixed poll interval.
    pub fn poll_interval(&self) -> PollInterval {
        self.poller.interval()
    }

    /// Flip auto-poll mode. Returns the new setting.
    pub fn toggle_auto_poll(&mut self) -> bool {
        let enabled = !self.poller.auto_poll();
        self.poller.set_auto_poll(enabled);
        self.config.poll.auto_poll = enabled;
        enabled
    }

    /// Whether auto-poll mode is on.
    pub fn auto_poll(&self) -> bool {
        self.poller.auto_poll()
    }

    /// Poller lifecycle state.
    pub fn poller_state(&self) -> PollerState {
        self.poller.state()
    }

    // ── event processing ────────────────────────────────────────

    /// Dispatch every envelope already queued. Returns how many were
    /// processed.
    pub fn process_pending(&mut self) -> usize {
        let mut processed = 0;
        while let Some(envelope) = self.inbox.try_next() {
            self.dispatch(envelope);
            processed += 1;
        }
        processed
    }

    /// Wait up to `timeout` for envelopes, dispatching each as it arrives.
    /// Returns how many were processed.
    pub fn process_for(&mut self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        let mut processed = 0;
        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            match self.inbox.next_timeout(deadline - now) {
                Some(envelope) => {
                    self.dispatch(envelope);
                    processed += 1;
                }
                None => break,
            }
        }
        processed
    }

    fn dispatch(&mut self, envelope: relay::Envelope) -> DispatchOutcome {
        let outcome = Dispatcher {
            service: &self.service,
            registry: &mut self.registry,
            notifier: self.notifier.as_mut(),
        }
        .dispatch(envelope);
        tracing::trace!(?envelope, ?outcome, "envelope dispatched");
        if matches!(outcome, DispatchOutcome::Escalated | DispatchOutcome::PeerClosed(_)) {
            self.stop_poller_if_idle();
        }
        outcome
    }

    // ── sessions ────────────────────────────────────────────────

    /// The view for `handle`, attached or detached but not yet closed.
    pub fn session_view(&self, handle: SimHandle) -> Option<&SessionView> {
        self.registry.view(handle)
    }

    /// Whether `handle` is attached and receiving updates.
    pub fn is_active(&self, handle: SimHandle) -> bool {
        self.registry.is_active(handle)
    }

    /// Attached sessions, in attach order.
    pub fn active_sessions(&self) -> Vec<SimHandle> {
        self.registry.active_handles()
    }

    /// Sessions detached by the simulation or after an error that are
    /// still viewable until [`close_session`](Self::close_session).
    pub fn retired_sessions(&self) -> Vec<SimHandle> {
        self.registry.retired_handles()
    }

    // ── shutdown ────────────────────────────────────────────────

    /// Stop polling, detach every session and finalise the library.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.poller.stop();
        for handle in self.registry.active_handles() {
            if let Err(e) = self.service.with_library(|lib| lib.detach(handle)) {
                tracing::debug!(handle = %handle, err = %e, "detach on shutdown failed");
            }
            self.registry.close(handle);
        }
        self.service.teardown();
        tracing::info!("steerer shut down");
    }

    // ── helpers ─────────────────────────────────────────────────

    fn session(&self, handle: SimHandle) -> Result<&SessionView, CommandError> {
        self.registry
            .get(handle)
            .ok_or(CommandError::UnknownSession { handle })
    }

    fn session_mut(&mut self, handle: SimHandle) -> Result<&mut SessionView, CommandError> {
        self.registry
            .get_mut(handle)
            .ok_or(CommandError::UnknownSession { handle })
    }

    fn require_writable(&self, handle: SimHandle) -> Result<(), CommandError> {
        if self.session(handle)?.is_read_only() {
            return Err(CommandError::ReadOnly { handle });
        }
        Ok(())
    }

    fn require_io(&self, handle: SimHandle) -> Result<(), CommandError> {
        self.require_writable(handle)?;
        if !self.session(handle)?.io_commands_enabled() {
            return Err(CommandError::Paused { handle });
        }
        Ok(())
    }

    /// Run a steering call; on failure detach the session and warn.
    fn library_call<R>(
        &mut self,
        handle: SimHandle,
        f: impl FnOnce(&mut dyn SteeringLibrary) -> Result<R, LibraryError>,
    ) -> Result<R, CommandError> {
        match self.service.with_library(f) {
            Ok(r) => Ok(r),
            Err(e) => {
                Dispatcher {
                    service: &self.service,
                    registry: &mut self.registry,
                    notifier: self.notifier.as_mut(),
                }
                .escalate(handle, &e);
                self.stop_poller_if_idle();
                Err(CommandError::Library(e))
            }
        }
    }

    fn stop_poller_if_idle(&mut self) {
        if !self.registry.has_active() && self.poller.is_running() {
            tracing::debug!("no attached sessions; stopping poller");
            self.poller.stop();
        }
    }
}

impl Drop for Steerer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Steerer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Steerer")
            .field("poller", &self.poller)
            .field("active", &self.registry.active_count())
            .field("retired", &self.registry.retired_handles())
            .field("shut_down", &self.shut_down)
            .finish()
    }
}
