//! The steering library trait and the records it returns.
//!
//! [`SteeringLibrary`] is the single seam between the client and the
//! external steering library. Every method corresponds to one library
//! call; callers in the engine hold the process-wide library lock for
//! the duration of each call, so implementations may assume exclusive
//! access and take `&mut self`.

use std::time::Duration;

use smallvec::SmallVec;

use crate::command::{CommandRequest, SupportedCommand};
use crate::error::LibraryError;
use crate::id::{IoTypeId, ParamHandle, SimHandle};
use crate::message::MessageTag;

/// Value type of a registered parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParamKind {
    /// Integer.
    Int,
    /// Single-precision float.
    Float,
    /// Double-precision float.
    Double,
    /// Character string.
    Char,
    /// Opaque binary blob (displayed, never steered).
    Bin,
}

/// A parameter registered by the simulation.
#[derive(Clone, Debug, PartialEq)]
pub struct ParamDef {
    /// Library handle of the parameter.
    pub handle: ParamHandle,
    /// Display label.
    pub label: String,
    /// Current value, formatted by the library.
    pub value: String,
    /// Whether the client may set a new value (steered) or only
    /// observe it (monitored).
    pub steerable: bool,
    /// Value type.
    pub kind: ParamKind,
}

/// Direction of an I/O type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IoDirection {
    /// Data flows into the simulation (sample consume / restart).
    In,
    /// Data flows out of the simulation (sample emit / checkpoint).
    Out,
    /// Both directions (checkpoint types only).
    InOut,
}

/// A sample or checkpoint I/O type registered by the simulation.
#[derive(Clone, Debug, PartialEq)]
pub struct IoTypeDef {
    /// Library id, also used as the command id for this type.
    pub id: IoTypeId,
    /// Display label.
    pub label: String,
    /// Data direction.
    pub direction: IoDirection,
    /// Whether the simulation emits/consumes automatically at a frequency.
    pub auto_supported: bool,
    /// Current automatic frequency (steps between emissions, 0 = off).
    pub frequency: u32,
}

/// Raw command codes embedded in a status message.
pub type StatusCommands = SmallVec<[i32; 8]>;

/// Payload of a consumed status message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StatusReport {
    /// The simulation's sequence number at the time of the report.
    pub seq_num: i32,
    /// Commands sent by the simulation to the client.
    pub commands: StatusCommands,
}

impl StatusReport {
    /// The first peer-initiated detach or stop in this report, if any.
    pub fn peer_shutdown(&self) -> Option<SupportedCommand> {
        self.commands
            .iter()
            .filter_map(|&c| SupportedCommand::from_code(c))
            .find(|c| matches!(c, SupportedCommand::Detach | SupportedCommand::Stop))
    }
}

/// One row of the parameter history log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogEntry {
    /// Parameter the value belongs to.
    pub param: ParamHandle,
    /// Simulation sequence number at which the value was recorded.
    pub seq_num: i32,
    /// Recorded value.
    pub value: String,
}

/// One entry of a checkpoint type's log, used to pick a restart point.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChkLogEntry {
    /// Checkpoint tag passed back on restart.
    pub tag: String,
    /// Parameter label/value pairs recorded with the checkpoint.
    pub params: Vec<(String, String)>,
}

/// Calls consumed from the external steering library.
///
/// Object-safe so the engine can hold a `Box<dyn SteeringLibrary>`.
/// `Send` because the poller thread calls [`poll_next_message`] while the
/// interactive thread makes every other call; the engine serialises all
/// of them through one lock.
///
/// [`poll_next_message`]: SteeringLibrary::poll_next_message
pub trait SteeringLibrary: Send {
    /// One-time library setup, run when the library service is created.
    fn initialize(&mut self) -> Result<(), LibraryError> {
        Ok(())
    }

    /// One-time library teardown, run when the library service is torn down.
    fn finalize(&mut self) {}

    /// Attach to a simulation.
    fn attach(&mut self, identifier: &str) -> Result<SimHandle, LibraryError>;

    /// Detach from a simulation and release the library's resources for it.
    fn detach(&mut self, handle: SimHandle) -> Result<(), LibraryError>;

    /// Forget a simulation that has already gone away on its own.
    fn delete_sim_table_entry(&mut self, handle: SimHandle);

    /// Next pending message across all attached simulations.
    ///
    /// `Ok(None)` means nothing is pending.
    fn poll_next_message(&mut self) -> Result<Option<(SimHandle, MessageTag)>, LibraryError>;

    /// The library's current recommended poll interval, for auto-poll mode.
    fn recommended_interval(&mut self) -> Option<Duration> {
        None
    }

    /// Control commands the simulation supports.
    fn supported_commands(
        &mut self,
        handle: SimHandle,
    ) -> Result<Vec<SupportedCommand>, LibraryError>;

    /// Consume a parameter-definitions message.
    fn consume_param_defs(&mut self, handle: SimHandle) -> Result<(), LibraryError>;

    /// Consume a sample I/O type definitions message.
    fn consume_iotype_defs(&mut self, handle: SimHandle) -> Result<(), LibraryError>;

    /// Consume a checkpoint type definitions message.
    fn consume_chktype_defs(&mut self, handle: SimHandle) -> Result<(), LibraryError>;

    /// Consume a status message.
    fn consume_status(&mut self, handle: SimHandle) -> Result<StatusReport, LibraryError>;

    /// Consume a parameter log message.
    fn consume_log(&mut self, handle: SimHandle) -> Result<(), LibraryError>;

    /// Currently registered parameters.
    fn param_defs(&mut self, handle: SimHandle) -> Result<Vec<ParamDef>, LibraryError>;

    /// Currently registered sample I/O types.
    fn iotype_defs(&mut self, handle: SimHandle) -> Result<Vec<IoTypeDef>, LibraryError>;

    /// Currently registered checkpoint types.
    fn chktype_defs(&mut self, handle: SimHandle) -> Result<Vec<IoTypeDef>, LibraryError>;

    /// Parameter history log.
    fn param_log(&mut self, handle: SimHandle) -> Result<Vec<LogEntry>, LibraryError>;

    /// Stage new values for steerable parameters and send them.
    fn set_param_values(
        &mut self,
        handle: SimHandle,
        values: &[(ParamHandle, String)],
    ) -> Result<(), LibraryError>;

    /// Send one control command.
    fn emit_command(
        &mut self,
        handle: SimHandle,
        command: SupportedCommand,
    ) -> Result<(), LibraryError>;

    /// Send a batch of command requests.
    fn emit_control(
        &mut self,
        handle: SimHandle,
        requests: &[CommandRequest],
    ) -> Result<(), LibraryError>;

    /// Request a restart on the grid service named by `gsh`.
    fn emit_restart(&mut self, handle: SimHandle, gsh: &str) -> Result<(), LibraryError>;

    /// Set automatic emit/consume frequencies. `ids` and `freqs` are
    /// parallel slices.
    fn set_frequency(
        &mut self,
        handle: SimHandle,
        ids: &[IoTypeId],
        freqs: &[u32],
    ) -> Result<(), LibraryError>;

    /// Log entries recorded for a checkpoint type.
    fn checkpoint_log(
        &mut self,
        handle: SimHandle,
        chk_type: IoTypeId,
    ) -> Result<Vec<ChkLogEntry>, LibraryError>;
}
