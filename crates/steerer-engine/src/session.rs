//! Per-session presentation state.
//!
//! A [`SessionView`] is what a front-end would render for one attached
//! simulation: parameter, I/O type and checkpoint type tables, the
//! parameter log, the status line, and which commands are currently
//! available. It is owned by the interactive thread (through the
//! registry) and never touched by the poller.
//!
//! Command availability follows a small state machine:
//!
//! ```text
//! Running --pause--> Paused --resume--> Running
//! Running|Paused --stop--> AwaitingStop     (read-only)
//! Running        --detach--> AwaitingDetach (read-only)
//! ```
//!
//! Pause disables detach and the I/O type commands; a read-only session
//! accepts nothing but close.

use indexmap::IndexMap;

use steerer_core::{
    IoDirection, IoTypeDef, IoTypeId, LogEntry, ParamDef, ParamHandle, SimHandle,
    SupportedCommand,
};

use crate::error::{CommandError, FrequencyError};

/// The control commands a simulation advertised on attach.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Stop is supported.
    pub stop: bool,
    /// Pause is supported.
    pub pause: bool,
    /// Resume is supported.
    pub resume: bool,
    /// Detach is supported.
    pub detach: bool,
}

impl Capabilities {
    /// Build from the library's supported-command list.
    pub fn from_commands(commands: &[SupportedCommand]) -> Self {
        let mut caps = Self::default();
        for cmd in commands {
            match cmd {
                SupportedCommand::Stop => caps.stop = true,
                SupportedCommand::Pause => caps.pause = true,
                SupportedCommand::Resume => caps.resume = true,
                SupportedCommand::Detach => caps.detach = true,
            }
        }
        caps
    }

    /// Whether `command` was advertised.
    pub fn supports(&self, command: SupportedCommand) -> bool {
        match command {
            SupportedCommand::Stop => self.stop,
            SupportedCommand::Pause => self.pause,
            SupportedCommand::Resume => self.resume,
            SupportedCommand::Detach => self.detach,
        }
    }
}

/// Where the session is in its command lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlState {
    /// Attached and running.
    Running,
    /// Paused by the user.
    Paused,
    /// Stop sent; waiting for the simulation to acknowledge.
    AwaitingStop,
    /// Detach sent; waiting for the simulation to acknowledge.
    AwaitingDetach,
}

/// Why a session is no longer attached.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetachReason {
    /// The simulation sent a detach command.
    PeerDetached,
    /// The simulation sent a stop command.
    PeerStopped,
    /// A library call failed and the client detached.
    InternalError,
}

impl DetachReason {
    /// Whether the simulation, not the client, ended the session.
    pub fn is_closed_by_peer(self) -> bool {
        matches!(self, Self::PeerDetached | Self::PeerStopped)
    }

    /// Status line shown once the session has detached.
    pub fn status_message(self) -> &'static str {
        match self {
            Self::PeerDetached => "Application has detached",
            Self::PeerStopped => "Detached as application has stopped",
            Self::InternalError => "Detached from application due to internal error",
        }
    }
}

/// Presentation state of one attached simulation.
#[derive(Clone, Debug)]
pub struct SessionView {
    handle: SimHandle,
    identifier: String,
    is_local: bool,
    status: String,
    params: Vec<ParamDef>,
    iotypes: Vec<IoTypeDef>,
    chktypes: Vec<IoTypeDef>,
    log: Vec<LogEntry>,
    capabilities: Capabilities,
    control: ControlState,
    read_only: bool,
    detached: Option<DetachReason>,
    staged_params: IndexMap<ParamHandle, String>,
    staged_freqs: IndexMap<IoTypeId, u32>,
    last_seq_num: Option<i32>,
}

impl SessionView {
    /// A freshly attached session.
    pub fn new(
        handle: SimHandle,
        identifier: impl Into<String>,
        is_local: bool,
        capabilities: Capabilities,
    ) -> Self {
        Self {
            handle,
            identifier: identifier.into(),
            is_local,
            status: String::new(),
            params: Vec::new(),
            iotypes: Vec::new(),
            chktypes: Vec::new(),
            log: Vec::new(),
            capabilities,
            control: ControlState::Running,
            read_only: false,
            detached: None,
            staged_params: IndexMap::new(),
            staged_freqs: IndexMap::new(),
            last_seq_num: None,
        }
    }

    // ── accessors ───────────────────────────────────────────────

    /// Library handle.
    pub fn handle(&self) -> SimHandle {
        self.handle
    }

    /// Identifier the session was attached with (directory or service address).
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Whether the session was attached locally.
    pub fn is_local(&self) -> bool {
        self.is_local
    }

    /// Current status line.
    pub fn status(&self) -> &str {
        &self.status
    }

    /// Registered parameters, as last refreshed.
    pub fn params(&self) -> &[ParamDef] {
        &self.params
    }

    /// Registered sample I/O types, as last refreshed.
    pub fn iotypes(&self) -> &[IoTypeDef] {
        &self.iotypes
    }

    /// Registered checkpoint types, as last refreshed.
    pub fn chktypes(&self) -> &[IoTypeDef] {
        &self.chktypes
    }

    /// Parameter history, as last refreshed.
    pub fn log(&self) -> &[LogEntry] {
        &self.log
    }

    /// Commands advertised on attach.
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Command lifecycle state.
    pub fn control_state(&self) -> ControlState {
        self.control
    }

    /// Whether everything but close is disabled.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Why the session detached, if it has.
    pub fn detach_reason(&self) -> Option<DetachReason> {
        self.detached
    }

    /// Whether the simulation ended the session itself.
    pub fn is_closed_by_peer(&self) -> bool {
        self.detached.is_some_and(DetachReason::is_closed_by_peer)
    }

    /// Whether the library still considers this session attached.
    pub fn is_attached(&self) -> bool {
        self.detached.is_none()
    }

    /// Close is always available, including after an error.
    pub fn can_close(&self) -> bool {
        true
    }

    /// Sequence number from the most recent status message.
    pub fn last_seq_num(&self) -> Option<i32> {
        self.last_seq_num
    }

    /// Parameter values staged but not yet sent.
    pub fn staged_params(&self) -> impl Iterator<Item = (ParamHandle, &str)> {
        self.staged_params.iter().map(|(h, v)| (*h, v.as_str()))
    }

    /// Frequencies staged but not yet sent.
    pub fn staged_frequencies(&self) -> impl Iterator<Item = (IoTypeId, u32)> + '_ {
        self.staged_freqs.iter().map(|(id, f)| (*id, *f))
    }

    // ── command availability ────────────────────────────────────

    /// Whether `command` may be sent now.
    pub fn command_enabled(&self, command: SupportedCommand) -> bool {
        if self.read_only || !self.capabilities.supports(command) {
            return false;
        }
        match (self.control, command) {
            (ControlState::Running, SupportedCommand::Resume) => false,
            (ControlState::Running, _) => true,
            (ControlState::Paused, SupportedCommand::Stop) => true,
            (ControlState::Paused, SupportedCommand::Resume) => true,
            (ControlState::Paused, _) => false,
            (ControlState::AwaitingStop | ControlState::AwaitingDetach, _) => false,
        }
    }

    /// Whether I/O type emit/consume commands may be sent now.
    pub fn io_commands_enabled(&self) -> bool {
        !self.read_only && self.control == ControlState::Running
    }

    /// Check that `command` may be sent, with the reason if not.
    pub fn check_command(&self, command: SupportedCommand) -> Result<(), CommandError> {
        let handle = self.handle;
        if self.read_only {
            return Err(CommandError::ReadOnly { handle });
        }
        if !self.capabilities.supports(command) {
            return Err(CommandError::Unsupported { handle, command });
        }
        if !self.command_enabled(command) {
            return Err(CommandError::Disabled { handle, command });
        }
        Ok(())
    }

    // ── updates (interactive thread only) ───────────────────────

    pub(crate) fn set_status(&mut self, message: impl Into<String>) {
        self.status = message.into();
    }

    pub(crate) fn set_params(&mut self, params: Vec<ParamDef>) {
        // A redefinition may drop parameters; forget staged values for them.
        self.staged_params
            .retain(|h, _| params.iter().any(|p| p.handle == *h));
        self.params = params;
    }

    pub(crate) fn set_iotypes(&mut self, iotypes: Vec<IoTypeDef>) {
        self.iotypes = iotypes;
        self.retain_known_frequencies();
    }

    pub(crate) fn set_chktypes(&mut self, chktypes: Vec<IoTypeDef>) {
        self.chktypes = chktypes;
        self.retain_known_frequencies();
    }

    pub(crate) fn set_log(&mut self, log: Vec<LogEntry>) {
        self.log = log;
    }

    pub(crate) fn set_seq_num(&mut self, seq_num: i32) {
        self.last_seq_num = Some(seq_num);
    }

    /// Record that `command` was sent successfully.
    ///
    /// Returns the status line for the new state.
    pub(crate) fn apply_command(&mut self, command: SupportedCommand) -> &'static str {
        match command {
            SupportedCommand::Pause => {
                self.control = ControlState::Paused;
                "Attached - user requested pause"
            }
            SupportedCommand::Resume => {
                self.control = ControlState::Running;
                "Attached to application"
            }
            SupportedCommand::Stop => {
                self.control = ControlState::AwaitingStop;
                self.read_only = true;
                "Attached - awaiting user requested stop"
            }
            SupportedCommand::Detach => {
                self.control = ControlState::AwaitingDetach;
                self.read_only = true;
                "Attached - awaiting user requested detach"
            }
        }
    }

    /// Mark the session detached and read-only.
    pub(crate) fn mark_detached(&mut self, reason: DetachReason) {
        self.detached = Some(reason);
        self.read_only = true;
        self.staged_params.clear();
        self.staged_freqs.clear();
    }

    // ── staging ─────────────────────────────────────────────────

    /// Stage a new value for a steerable parameter.
    pub(crate) fn stage_param(
        &mut self,
        param: ParamHandle,
        value: String,
    ) -> Result<(), CommandError> {
        if self.read_only {
            return Err(CommandError::ReadOnly {
                handle: self.handle,
            });
        }
        let def = self
            .params
            .iter()
            .find(|p| p.handle == param)
            .ok_or(CommandError::UnknownParam { param })?;
        if !def.steerable {
            return Err(CommandError::NotSteerable { param });
        }
        self.staged_params.insert(param, value);
        Ok(())
    }

    pub(crate) fn take_staged_params(&mut self) -> Vec<(ParamHandle, String)> {
        self.staged_params.drain(..).collect()
    }

    /// Validate and stage an automatic frequency for a sample or
    /// checkpoint type.
    pub(crate) fn stage_frequency(
        &mut self,
        id: IoTypeId,
        frequency: u32,
    ) -> Result<(), CommandError> {
        if self.read_only {
            return Err(CommandError::ReadOnly {
                handle: self.handle,
            });
        }
        let def = self
            .find_io(id)
            .ok_or(FrequencyError::UnknownIoType { id })?;
        if !def.auto_supported {
            return Err(FrequencyError::NotAutomatic { id }.into());
        }
        let is_sample_in =
            def.direction == IoDirection::In && self.iotypes.iter().any(|t| t.id == id);
        if is_sample_in && frequency > 1 {
            return Err(FrequencyError::SampleInOutOfRange { id, frequency }.into());
        }
        self.staged_freqs.insert(id, frequency);
        Ok(())
    }

    /// Drain staged frequencies as parallel id/value arrays.
    pub(crate) fn take_staged_frequencies(&mut self) -> (Vec<IoTypeId>, Vec<u32>) {
        self.staged_freqs.drain(..).unzip()
    }

    /// Look up a sample type, then a checkpoint type.
    pub fn find_io(&self, id: IoTypeId) -> Option<&IoTypeDef> {
        self.iotypes
            .iter()
            .chain(self.chktypes.iter())
            .find(|t| t.id == id)
    }

    fn retain_known_frequencies(&mut self) {
        let iotypes = &self.iotypes;
        let chktypes = &self.chktypes;
        self.staged_freqs
            .retain(|id, _| iotypes.iter().chain(chktypes.iter()).any(|t| t.id == *id));
    }
}
