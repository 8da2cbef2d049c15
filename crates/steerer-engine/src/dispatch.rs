//! Dispatcher: acts on one envelope at a time on the interactive thread.
//!
//! For each tag the dispatcher makes the matching consume call, then
//! re-reads the definitions that message may have changed and stores
//! them in the session's view. Every library call goes through
//! [`LibraryService::with_library`] and the lock is released before the
//! view is touched.
//!
//! # Failure policy
//!
//! | Failure | Effect |
//! |---|---|
//! | poll failed (no target) | debug log only |
//! | consume of `SteerLog` | debug log only, session stays attached |
//! | any other consume or refresh | detach, read-only, one warning |
//! | envelope for a stale or retired session | dropped |

use steerer_core::{LibraryError, MessageTag, Notifier, SimHandle, SupportedCommand};

use crate::registry::SessionRegistry;
use crate::relay::Envelope;
use crate::service::LibraryService;
use crate::session::DetachReason;

/// Title of the warning shown when a session is detached on error.
pub const ERROR_TITLE: &str = "Steerer Error";
/// Body of the warning shown when a session is detached on error.
pub const DETACH_ON_ERROR_MESSAGE: &str = "Internal library error - detaching from application";

/// What happened to one envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Consumed and the view refreshed.
    Applied,
    /// Nothing to do for this tag.
    Ignored,
    /// The poll itself failed; retried on the next cycle.
    PollFailed,
    /// The target session is unknown, closed, or already detached.
    Stale,
    /// Consuming the log failed; the session is unaffected.
    LogFailed,
    /// The simulation detached or stopped.
    PeerClosed(DetachReason),
    /// A library call failed and the session was detached.
    Escalated,
}

/// Borrowed view of everything one dispatch needs.
pub(crate) struct Dispatcher<'a> {
    pub(crate) service: &'a LibraryService,
    pub(crate) registry: &'a mut SessionRegistry,
    pub(crate) notifier: &'a mut dyn Notifier,
}

impl Dispatcher<'_> {
    /// Act on one envelope.
    pub(crate) fn dispatch(&mut self, envelope: Envelope) -> DispatchOutcome {
        let Some(handle) = envelope.target else {
            tracing::debug!(tag = %envelope.tag, "transient poll failure");
            return DispatchOutcome::PollFailed;
        };
        match self.registry.get(handle) {
            Some(view) if view.is_attached() => {}
            _ => {
                tracing::debug!(
                    handle = %handle,
                    tag = %envelope.tag,
                    "dropping envelope for inactive session"
                );
                return DispatchOutcome::Stale;
            }
        }

        match self.apply(handle, envelope.tag) {
            Ok(outcome) => outcome,
            Err(e) if !envelope.tag.detaches_on_failure() => {
                tracing::debug!(handle = %handle, err = %e, "consume_log failed; ignoring");
                DispatchOutcome::LogFailed
            }
            Err(e) => {
                self.escalate(handle, &e);
                DispatchOutcome::Escalated
            }
        }
    }

    fn apply(
        &mut self,
        handle: SimHandle,
        tag: MessageTag,
    ) -> Result<DispatchOutcome, LibraryError> {
        match tag {
            MessageTag::ParamDefs => {
                self.service.with_library(|lib| lib.consume_param_defs(handle))?;
                self.refresh_params(handle)?;
            }
            MessageTag::IoDefs => {
                self.service.with_library(|lib| lib.consume_iotype_defs(handle))?;
                self.refresh_iotypes(handle)?;
            }
            MessageTag::ChkDefs => {
                self.service.with_library(|lib| lib.consume_chktype_defs(handle))?;
                self.refresh_chktypes(handle)?;
            }
            MessageTag::Status => return self.apply_status(handle),
            MessageTag::SteerLog => {
                self.service.with_library(|lib| lib.consume_log(handle))?;
                let log = self.service.with_library(|lib| lib.param_log(handle))?;
                if let Some(view) = self.registry.get_mut(handle) {
                    view.set_log(log);
                }
            }
            MessageTag::Control | MessageTag::SuppCmds | MessageTag::NotSet => {
                tracing::debug!(handle = %handle, tag = %tag, "no action for message");
                return Ok(DispatchOutcome::Ignored);
            }
            MessageTag::Error => return Err(LibraryError::failed("poll_next_message")),
        }
        Ok(DispatchOutcome::Applied)
    }

    fn apply_status(&mut self, handle: SimHandle) -> Result<DispatchOutcome, LibraryError> {
        let report = self.service.with_library(|lib| lib.consume_status(handle))?;
        self.refresh_params(handle)?;
        self.refresh_iotypes(handle)?;
        self.refresh_chktypes(handle)?;
        if let Some(view) = self.registry.get_mut(handle) {
            view.set_seq_num(report.seq_num);
        }
        tracing::trace!(handle = %handle, seq_num = report.seq_num, "status consumed");

        let Some(command) = report.peer_shutdown() else {
            return Ok(DispatchOutcome::Applied);
        };
        let reason = match command {
            SupportedCommand::Stop => DetachReason::PeerStopped,
            _ => DetachReason::PeerDetached,
        };
        // The simulation has already gone; only the library's table entry remains.
        if let Err(e) = self.service.with_library(|lib| {
            lib.delete_sim_table_entry(handle);
            Ok(())
        }) {
            tracing::debug!(handle = %handle, err = %e, "could not delete sim table entry");
        }
        self.retire(handle, reason);
        tracing::info!(handle = %handle, reason = ?reason, "session closed by peer");
        Ok(DispatchOutcome::PeerClosed(reason))
    }

    /// Detach after a library failure: the session becomes read-only,
    /// leaves the active set, and exactly one warning is shown.
    pub(crate) fn escalate(&mut self, handle: SimHandle, err: &LibraryError) {
        tracing::warn!(handle = %handle, err = %err, "library call failed; detaching");
        if let Err(e) = self.service.with_library(|lib| lib.detach(handle)) {
            tracing::debug!(handle = %handle, err = %e, "detach after error also failed");
        }
        self.retire(handle, DetachReason::InternalError);
        self.notifier.warning(ERROR_TITLE, DETACH_ON_ERROR_MESSAGE);
    }

    fn retire(&mut self, handle: SimHandle, reason: DetachReason) {
        if let Some(view) = self.registry.get_mut(handle) {
            view.mark_detached(reason);
            view.set_status(reason.status_message());
        }
        self.registry.retire(handle);
        self.notifier.status(handle, reason.status_message());
    }

    fn refresh_params(&mut self, handle: SimHandle) -> Result<(), LibraryError> {
        let params = self.service.with_library(|lib| lib.param_defs(handle))?;
        if let Some(view) = self.registry.get_mut(handle) {
            view.set_params(params);
        }
        Ok(())
    }

    fn refresh_iotypes(&mut self, handle: SimHandle) -> Result<(), LibraryError> {
        let iotypes = self.service.with_library(|lib| lib.iotype_defs(handle))?;
        if let Some(view) = self.registry.get_mut(handle) {
            view.set_iotypes(iotypes);
        }
        Ok(())
    }

    fn refresh_chktypes(&mut self, handle: SimHandle) -> Result<(), LibraryError> {
        let chktypes = self.service.with_library(|lib| lib.chktype_defs(handle))?;
        if let Some(view) = self.registry.get_mut(handle) {
            view.set_chktypes(chktypes);
        }
        Ok(())
    }
}
