//! Error types for attach and steering operations.
//!
//! [`ConfigError`](crate::config::ConfigError) lives with the config it
//! validates; everything a caller can get back from a
//! [`Steerer`](crate::steerer::Steerer) operation is here.

use std::error::Error;
use std::fmt;

use steerer_core::{IoTypeId, LibraryError, ParamHandle, SimHandle, SupportedCommand};

use crate::config::ConfigError;

// ── StartupError ───────────────────────────────────────────────────

/// Why a [`Steerer`](crate::steerer::Steerer) could not be built.
#[derive(Debug, PartialEq)]
pub enum StartupError {
    /// The configuration failed validation.
    Config(ConfigError),
    /// The library's one-time initialisation failed.
    Library(LibraryError),
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "invalid configuration: {e}"),
            Self::Library(e) => write!(f, "steering library initialisation failed: {e}"),
        }
    }
}

impl Error for StartupError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Library(e) => Some(e),
        }
    }
}

impl From<ConfigError> for StartupError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<LibraryError> for StartupError {
    fn from(e: LibraryError) -> Self {
        Self::Library(e)
    }
}

// ── AttachError ────────────────────────────────────────────────────

/// Why an attach did not create a session.
#[derive(Debug, PartialEq)]
pub enum AttachError {
    /// The library refused the attach or could not report capabilities.
    Library(LibraryError),
    /// Local attach with no directory given and none configured.
    NoAttachDirectory,
    /// The session was created but polling could not be started.
    Poller(ConfigError),
}

impl fmt::Display for AttachError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Library(e) => write!(f, "attach failed: {e}"),
            Self::NoAttachDirectory => write!(
                f,
                "no attach directory given and {} is not set",
                crate::config::STEER_DIRECTORY_ENV
            ),
            Self::Poller(e) => write!(f, "attached but polling did not start: {e}"),
        }
    }
}

impl Error for AttachError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Library(e) => Some(e),
            Self::Poller(e) => Some(e),
            Self::NoAttachDirectory => None,
        }
    }
}

impl From<LibraryError> for AttachError {
    fn from(e: LibraryError) -> Self {
        Self::Library(e)
    }
}

// ── FrequencyError ─────────────────────────────────────────────────

/// A rejected automatic emit/consume frequency.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrequencyError {
    /// The session has no I/O or checkpoint type with this id.
    UnknownIoType {
        /// The requested id.
        id: IoTypeId,
    },
    /// The type does not support automatic emit/consume.
    NotAutomatic {
        /// The requested id.
        id: IoTypeId,
    },
    /// Sample-in types only accept 0 (off) or 1 (every step).
    SampleInOutOfRange {
        /// The requested id.
        id: IoTypeId,
        /// The rejected frequency.
        frequency: u32,
    },
}

impl fmt::Display for FrequencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownIoType { id } => write!(f, "unknown I/O type {id}"),
            Self::NotAutomatic { id } => {
                write!(f, "I/O type {id} does not support automatic emit/consume")
            }
            Self::SampleInOutOfRange { id, frequency } => write!(
                f,
                "sample-in type {id} accepts frequency 0 or 1, got {frequency}"
            ),
        }
    }
}

impl Error for FrequencyError {}

// ── CommandError ───────────────────────────────────────────────────

/// Why a steering operation on a session was not carried out.
#[derive(Debug, PartialEq)]
pub enum CommandError {
    /// No attached session with this handle.
    UnknownSession {
        /// The requested handle.
        handle: SimHandle,
    },
    /// The session is read-only (stopping, detaching, or detached).
    ReadOnly {
        /// The session.
        handle: SimHandle,
    },
    /// I/O commands are unavailable while the simulation is paused.
    Paused {
        /// The session.
        handle: SimHandle,
    },
    /// The simulation did not advertise this command on attach.
    Unsupported {
        /// The session.
        handle: SimHandle,
        /// The rejected command.
        command: SupportedCommand,
    },
    /// The command is supported but not available in the current state
    /// (for example resume while running).
    Disabled {
        /// The session.
        handle: SimHandle,
        /// The rejected command.
        command: SupportedCommand,
    },
    /// No parameter with this handle.
    UnknownParam {
        /// The requested parameter.
        param: ParamHandle,
    },
    /// The parameter is monitored only.
    NotSteerable {
        /// The requested parameter.
        param: ParamHandle,
    },
    /// No I/O or checkpoint type with this id.
    UnknownIoType {
        /// The requested id.
        id: IoTypeId,
    },
    /// The checkpoint type's log has no entry with this tag.
    UnknownCheckpoint {
        /// The checkpoint type searched.
        chk_type: IoTypeId,
        /// The requested tag.
        tag: String,
    },
    /// A frequency was rejected.
    Frequency(FrequencyError),
    /// The library call failed; the session has been detached.
    Library(LibraryError),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownSession { handle } => write!(f, "no attached session {handle}"),
            Self::ReadOnly { handle } => write!(f, "session {handle} is read-only"),
            Self::Paused { handle } => write!(f, "session {handle} is paused"),
            Self::Unsupported { handle, command } => {
                write!(f, "session {handle} does not support {command}")
            }
            Self::Disabled { handle, command } => {
                write!(f, "{command} is not available for session {handle} right now")
            }
            Self::UnknownParam { param } => write!(f, "unknown parameter {param}"),
            Self::NotSteerable { param } => write!(f, "parameter {param} is not steerable"),
            Self::UnknownIoType { id } => write!(f, "unknown I/O type {id}"),
            Self::UnknownCheckpoint { chk_type, tag } => {
                write!(f, "no checkpoint {tag:?} logged for type {chk_type}")
            }
            Self::Frequency(e) => write!(f, "invalid frequency: {e}"),
            Self::Library(e) => write!(f, "library call failed, session detached: {e}"),
        }
    }
}

impl Error for CommandError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Frequency(e) => Some(e),
            Self::Library(e) => Some(e),
            _ => None,
        }
    }
}

impl From<FrequencyError> for CommandError {
    fn from(e: FrequencyError) -> Self {
        Self::Frequency(e)
    }
}
