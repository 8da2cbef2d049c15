//! Steering control commands and generic command requests.

use std::fmt;

use crate::id::IoTypeId;

/// The control commands a simulation may advertise as supported.
///
/// A simulation reports its supported set once, on attach. The same
/// values appear in status messages when the simulation itself detaches
/// or stops.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SupportedCommand {
    /// Stop the simulation.
    Stop,
    /// Pause the simulation.
    Pause,
    /// Resume a paused simulation.
    Resume,
    /// Detach the steering client.
    Detach,
}

impl SupportedCommand {
    /// Stable integer code for this command.
    pub fn code(self) -> i32 {
        match self {
            Self::Stop => 1,
            Self::Pause => 2,
            Self::Resume => 3,
            Self::Detach => 4,
        }
    }

    /// Decode an integer code. Returns `None` for codes outside the
    /// control vocabulary (for example I/O type commands).
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(Self::Stop),
            2 => Some(Self::Pause),
            3 => Some(Self::Resume),
            4 => Some(Self::Detach),
            _ => None,
        }
    }
}

impl fmt::Display for SupportedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Stop => "stop",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Detach => "detach",
        };
        f.write_str(name)
    }
}

/// One entry of a batched control emission.
///
/// Requests use the I/O or checkpoint type id as the command id. Checkpoint
/// requests carry a direction parameter: `OUT 1` to create one, `IN <tag>`
/// to restart from one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandRequest {
    /// Command id understood by the library.
    pub id: i32,
    /// Optional string parameter.
    pub param: Option<String>,
}

impl CommandRequest {
    /// A request to emit or consume an I/O type.
    pub fn iotype(id: IoTypeId) -> Self {
        Self {
            id: id.0,
            param: None,
        }
    }

    /// A request carrying a parameter, such as `IN <tag>` for a restart.
    pub fn with_param(id: IoTypeId, param: impl Into<String>) -> Self {
        Self {
            id: id.0,
            param: Some(param.into()),
        }
    }
}
