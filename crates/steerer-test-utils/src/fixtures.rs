//! Reusable definitions and a recording notifier.
//!
//! - [`param`] / [`iotype`] build library records with sensible defaults.
//! - [`RecordingNotifier`] keeps every notice for later assertions.

use std::sync::{Arc, Mutex};

use steerer_core::{
    IoDirection, IoTypeDef, IoTypeId, Notice, Notifier, ParamDef, ParamHandle, ParamKind,
    SimHandle,
};

/// A double-valued parameter.
pub fn param(handle: i32, label: &str, value: &str, steerable: bool) -> ParamDef {
    ParamDef {
        handle: ParamHandle(handle),
        label: label.to_string(),
        value: value.to_string(),
        steerable,
        kind: ParamKind::Double,
    }
}

/// An I/O type with automatic emission supported and frequency 0.
pub fn iotype(id: i32, label: &str, direction: IoDirection) -> IoTypeDef {
    IoTypeDef {
        id: IoTypeId(id),
        label: label.to_string(),
        direction,
        auto_supported: true,
        frequency: 0,
    }
}

/// Notifier that records every notice.
///
/// Clones share the same log, so a test keeps one clone and hands the
/// other to the engine.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    notices: Arc<Mutex<Vec<Notice>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// All notices so far, in order.
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }

    /// Number of warnings so far.
    pub fn warning_count(&self) -> usize {
        self.notices
            .lock()
            .unwrap()
            .iter()
            .filter(|n| matches!(n, Notice::Warning { .. }))
            .count()
    }

    /// The most recent status line for a session.
    pub fn last_status(&self, handle: SimHandle) -> Option<String> {
        self.notices
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find_map(|n| match n {
                Notice::Status { handle: h, message } if *h == handle => Some(message.clone()),
                _ => None,
            })
    }

    /// The most recent main status line.
    pub fn last_global_status(&self) -> Option<String> {
        self.notices
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find_map(|n| match n {
                Notice::Global { message } => Some(message.clone()),
                _ => None,
            })
    }

    /// Every status line for a session, oldest first.
    pub fn statuses(&self, handle: SimHandle) -> Vec<String> {
        self.notices
            .lock()
            .unwrap()
            .iter()
            .filter_map(|n| match n {
                Notice::Status { handle: h, message } if *h == handle => Some(message.clone()),
                _ => None,
            })
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn warning(&mut self, title: &str, message: &str) {
        self.notices.lock().unwrap().push(Notice::Warning {
            title: title.to_string(),
            message: message.to_string(),
        });
    }

    fn status(&mut self, handle: SimHandle, message: &str) {
        self.notices.lock().unwrap().push(Notice::Status {
            handle,
            message: message.to_string(),
        });
    }

    fn global_status(&mut self, message: &str) {
        self.notices.lock().unwrap().push(Notice::Global {
            message: message.to_string(),
        });
    }
}
