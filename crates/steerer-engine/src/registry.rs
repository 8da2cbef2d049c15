//! Session registry: handle → presentation state.
//!
//! Attached sessions live in an insertion-ordered map so that iteration
//! (for shutdown, or a front-end's tab order) follows attach order. A
//! session that detaches on its own or on error is *retired*: it no
//! longer receives envelopes, but its view stays readable until the user
//! closes it.
//!
//! Lookups by a stale handle return `None`. That is the normal case for an
//! envelope that was queued before its session was closed.

use indexmap::IndexMap;

use steerer_core::SimHandle;

use crate::session::SessionView;

/// Attached and retired sessions.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    attached: IndexMap<SimHandle, SessionView>,
    retired: IndexMap<SimHandle, SessionView>,
}

impl SessionRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly attached session. Replaces any retired view
    /// with the same handle (the library may reuse handles).
    pub fn add(&mut self, view: SessionView) {
        let handle = view.handle();
        self.retired.shift_remove(&handle);
        if self.attached.insert(handle, view).is_some() {
            tracing::warn!(handle = %handle, "replaced an attached session with the same handle");
        }
    }

    /// The attached session for `handle`.
    pub fn get(&self, handle: SimHandle) -> Option<&SessionView> {
        self.attached.get(&handle)
    }

    /// The attached session for `handle`, mutably.
    pub fn get_mut(&mut self, handle: SimHandle) -> Option<&mut SessionView> {
        self.attached.get_mut(&handle)
    }

    /// The session for `handle`, attached or retired.
    pub fn view(&self, handle: SimHandle) -> Option<&SessionView> {
        self.attached
            .get(&handle)
            .or_else(|| self.retired.get(&handle))
    }

    /// Move an attached session to the retired set.
    ///
    /// Returns `false` if it was not attached.
    pub fn retire(&mut self, handle: SimHandle) -> bool {
        match self.attached.shift_remove(&handle) {
            Some(view) => {
                self.retired.insert(handle, view);
                true
            }
            None => false,
        }
    }

    /// Remove a session from whichever set holds it.
    pub fn close(&mut self, handle: SimHandle) -> Option<SessionView> {
        self.attached
            .shift_remove(&handle)
            .or_else(|| self.retired.shift_remove(&handle))
    }

    /// Whether `handle` is attached (receives envelopes).
    pub fn is_active(&self, handle: SimHandle) -> bool {
        self.attached.contains_key(&handle)
    }

    /// Whether any session is attached.
    pub fn has_active(&self) -> bool {
        !self.attached.is_empty()
    }

    /// Attached handles, in attach order.
    pub fn active_handles(&self) -> Vec<SimHandle> {
        self.attached.keys().copied().collect()
    }

    /// Number of attached sessions.
    pub fn active_count(&self) -> usize {
        self.attached.len()
    }

    /// Retired handles, in retirement order.
    pub fn retired_handles(&self) -> Vec<SimHandle> {
        self.retired.keys().copied().collect()
    }
}
