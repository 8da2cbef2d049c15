//! Strongly-typed identifiers issued by the steering library.

use std::fmt;

/// Identifies one attached simulation.
///
/// Issued by the library on attach and invalidated on detach or stop.
/// The value is opaque: the client never derives meaning from it beyond
/// equality and hashing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SimHandle(pub i32);

impl fmt::Display for SimHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for SimHandle {
    fn from(v: i32) -> Self {
        Self(v)
    }
}

/// Identifies a registered parameter within one simulation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParamHandle(pub i32);

impl fmt::Display for ParamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for ParamHandle {
    fn from(v: i32) -> Self {
        Self(v)
    }
}

/// Identifies a registered sample or checkpoint I/O type.
///
/// The library also uses this value as the command id when requesting
/// an emit or consume of the type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IoTypeId(pub i32);

impl fmt::Display for IoTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for IoTypeId {
    fn from(v: i32) -> Self {
        Self(v)
    }
}
