//! A [`Notifier`] that writes to the `tracing` log.

use steerer_core::{Notifier, SimHandle};

/// Sends warnings and status lines to `tracing` instead of a UI.
///
/// Warnings are logged at `WARN`, status lines at `INFO`. Suitable for
/// headless use and the bundled example.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn warning(&mut self, title: &str, message: &str) {
        tracing::warn!(title, "{message}");
    }

    fn status(&mut self, handle: SimHandle, message: &str) {
        tracing::info!(handle = %handle, "{message}");
    }

    fn global_status(&mut self, message: &str) {
        tracing::info!("{message}");
    }
}
