//! Error type for calls into the steering library.

use std::error::Error;
use std::fmt;

use crate::id::SimHandle;

/// A steering library call did not return success.
///
/// The library reports failure as a status code; the client keeps the
/// name of the call that failed so logs and warnings can say which one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LibraryError {
    /// The call returned a failure status.
    CallFailed {
        /// Name of the library call.
        call: &'static str,
        /// Status code returned by the library.
        status: i32,
    },
    /// The handle is not known to the library (already detached or never
    /// attached).
    UnknownHandle {
        /// The stale handle.
        handle: SimHandle,
    },
    /// The library was used before `initialize` or after `finalize`.
    NotInitialized,
    /// A poll returned a message code this client does not know.
    UnknownMessageCode {
        /// The raw code.
        code: i32,
    },
}

impl LibraryError {
    /// Shorthand for a failed call with the library's generic failure code.
    pub fn failed(call: &'static str) -> Self {
        Self::CallFailed { call, status: 1 }
    }
}

impl fmt::Display for LibraryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CallFailed { call, status } => {
                write!(f, "{call} failed with status {status}")
            }
            Self::UnknownHandle { handle } => write!(f, "unknown sim handle {handle}"),
            Self::NotInitialized => write!(f, "steering library not initialized"),
            Self::UnknownMessageCode { code } => write!(f, "unknown message code {code}"),
        }
    }
}

impl Error for LibraryError {}
