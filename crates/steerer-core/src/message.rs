//! Message tags reported by the steering library's poll call.

use std::fmt;

use crate::error::LibraryError;

/// Classifies what the poller found waiting for a simulation.
///
/// A tag carries no payload. The dispatcher fetches the payload with a
/// tag-specific consume call keyed by the session handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageTag {
    /// Nothing pending.
    NotSet,
    /// Parameter definitions changed.
    ParamDefs,
    /// Sample I/O type definitions changed.
    IoDefs,
    /// Checkpoint type definitions changed.
    ChkDefs,
    /// Status update (parameter values, frequencies, peer commands).
    Status,
    /// New entries in the parameter log.
    SteerLog,
    /// A control message (client-to-simulation direction; ignored here).
    Control,
    /// A supported-commands message (only meaningful during attach).
    SuppCmds,
    /// The library failed to fetch the next message.
    Error,
}

impl MessageTag {
    /// All tags, in code order.
    pub const ALL: [MessageTag; 9] = [
        MessageTag::NotSet,
        MessageTag::ParamDefs,
        MessageTag::IoDefs,
        MessageTag::ChkDefs,
        MessageTag::Status,
        MessageTag::SteerLog,
        MessageTag::Control,
        MessageTag::SuppCmds,
        MessageTag::Error,
    ];

    /// Stable integer code for this tag.
    pub fn code(self) -> i32 {
        match self {
            Self::NotSet => 0,
            Self::ParamDefs => 1,
            Self::IoDefs => 2,
            Self::ChkDefs => 3,
            Self::Status => 4,
            Self::SteerLog => 5,
            Self::Control => 6,
            Self::SuppCmds => 7,
            Self::Error => -1,
        }
    }

    /// Decode an integer code. Returns `None` for unknown codes.
    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.code() == code)
    }

    /// Decode a code returned by a poll. Library adapters use this so an
    /// unknown code surfaces as a failed poll.
    pub fn decode(code: i32) -> Result<Self, LibraryError> {
        Self::from_code(code).ok_or(LibraryError::UnknownMessageCode { code })
    }

    /// Whether a failure to consume this message detaches the session.
    ///
    /// Log data is non-critical: a failed log consume is only logged.
    pub fn detaches_on_failure(self) -> bool {
        !matches!(self, Self::SteerLog)
    }
}

impl fmt::Display for MessageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotSet => "not-set",
            Self::ParamDefs => "param-defs",
            Self::IoDefs => "iotype-defs",
            Self::ChkDefs => "chktype-defs",
            Self::Status => "status",
            Self::SteerLog => "steer-log",
            Self::Control => "control",
            Self::SuppCmds => "supp-cmds",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_unique_and_decodable() {
        for tag in MessageTag::ALL {
            assert_eq!(MessageTag::from_code(tag.code()), Some(tag));
        }
        let mut codes: Vec<i32> = MessageTag::ALL.iter().map(|t| t.code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), MessageTag::ALL.len());
    }

    #[test]
    fn unknown_code_is_none() {
        assert_eq!(MessageTag::from_code(42), None);
        assert_eq!(MessageTag::from_code(-7), None);
        assert_eq!(
            MessageTag::decode(42),
            Err(LibraryError::UnknownMessageCode { code: 42 })
        );
        assert_eq!(MessageTag::decode(4), Ok(MessageTag::Status));
    }

    #[test]
    fn only_log_tag_survives_failure() {
        for tag in MessageTag::ALL {
            assert_eq!(tag.detaches_on_failure(), tag != MessageTag::SteerLog);
        }
    }
}
