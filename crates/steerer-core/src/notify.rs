//! User-visible notifications.
//!
//! The engine never talks to a widget toolkit. Warnings that a desktop
//! front-end would show as a modal box, and the per-session status
//! line, go through a [`Notifier`] supplied by whoever embeds the engine.

use crate::id::SimHandle;

/// One user-visible notification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notice {
    /// A modal warning.
    Warning {
        /// Window title.
        title: String,
        /// Body text.
        message: String,
    },
    /// A new main status line, not tied to a session.
    Global {
        /// Status text.
        message: String,
    },
    /// A new status line for one session.
    Status {
        /// Session the status belongs to.
        handle: SimHandle,
        /// Status text.
        message: String,
    },
}

/// Receiver of user-visible notifications.
///
/// Called only from the interactive thread.
pub trait Notifier: Send {
    /// Show a warning.
    fn warning(&mut self, title: &str, message: &str);

    /// Replace the status line of a session.
    fn status(&mut self, handle: SimHandle, message: &str);

    /// Replace the main status line (used when there is no session yet).
    fn global_status(&mut self, message: &str);
}

/// A notifier that drops everything. Useful when no front-end is attached.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn warning(&mut self, _title: &str, _message: &str) {}

    fn status(&mut self, _handle: SimHandle, _message: &str) {}

    fn global_status(&mut self, _message: &str) {}
}
