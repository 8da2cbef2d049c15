//! Polling relay, dispatcher and session registry for the steering client.
//!
//! A background [`Poller`] asks the steering library for pending messages
//! and posts [`Envelope`]s through the [`relay`]. The interactive thread
//! owns a [`Steerer`], which drains the relay, dispatches each envelope to
//! the right [`SessionView`], and exposes attach, command and interval
//! operations. All library access goes through one [`LibraryService`]
//! lock shared by both threads.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod config;
pub mod dispatch;
pub mod error;
pub mod notify;
pub mod poller;
pub mod registry;
pub mod relay;
pub mod service;
pub mod session;
pub mod steerer;

pub use config::{ConfigError, PollConfig, PollInterval, SteererConfig};
pub use dispatch::DispatchOutcome;
pub use error::{AttachError, CommandError, FrequencyError, StartupError};
pub use notify::TracingNotifier;
pub use poller::{PollStats, Poller, PollerState};
pub use registry::SessionRegistry;
pub use relay::{Envelope, Inbox, Outbox};
pub use service::LibraryService;
pub use session::{Capabilities, ControlState, DetachReason, SessionView};
pub use steerer::{AttachMode, Steerer};
