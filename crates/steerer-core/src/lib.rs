//! Core types and traits for the steering client.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the vocabulary shared by the rest of the workspace: session and
//! object identifiers, message tags, steering commands, error types,
//! the [`SteeringLibrary`] trait through which every call into the
//! external steering library is made, and the [`Notifier`] trait through
//! which user-visible warnings leave the engine.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod command;
pub mod error;
pub mod id;
pub mod library;
pub mod message;
pub mod notify;

pub use command::{CommandRequest, SupportedCommand};
pub use error::LibraryError;
pub use id::{IoTypeId, ParamHandle, SimHandle};
pub use library::{
    ChkLogEntry, IoDirection, IoTypeDef, LogEntry, ParamDef, ParamKind, StatusCommands,
    StatusReport, SteeringLibrary,
};
pub use message::MessageTag;
pub use notify::{Notice, Notifier, NullNotifier};
