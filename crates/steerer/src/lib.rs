//! Steerer: a computational steering client.
//!
//! This is the top-level facade crate that re-exports the public API of
//! the steerer sub-crates. For most users, adding `steerer` as a single
//! dependency is sufficient; supply your own [`types::SteeringLibrary`]
//! implementation for the steering library you link against.
//!
//! # Quick start
//!
//! ```rust
//! use steerer::prelude::*;
//! use steerer_test_utils::MockLibrary;
//!
//! let library = MockLibrary::new();
//! let probe = library.probe();
//!
//! let mut steerer = Steerer::new(
//!     Box::new(library),
//!     Box::new(NullNotifier),
//!     SteererConfig::default(),
//! )
//! .unwrap();
//!
//! let handle = steerer.attach("localhost:50000", AttachMode::Remote).unwrap();
//! probe.push_message(handle, MessageTag::ParamDefs);
//!
//! // Drain whatever the poller has relayed so far.
//! steerer.process_for(std::time::Duration::from_secs(1));
//!
//! steerer.close_session(handle);
//! steerer.shutdown();
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `steerer-core` | IDs, message tags, library trait, notifier, errors |
//! | [`engine`] | `steerer-engine` | Poller, relay, dispatcher, registry, steerer |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types, traits, and IDs (`steerer-core`).
///
/// Contains the [`types::SteeringLibrary`] trait, message tags, session
/// and parameter handles, and the [`types::Notifier`] trait.
pub use steerer_core as types;

/// Polling relay and steering engine (`steerer-engine`).
///
/// [`engine::Steerer`] is the entry point; [`engine::Poller`] and
/// [`engine::relay`] are exposed for embedding the relay on its own.
pub use steerer_engine as engine;

/// Common imports for typical steerer usage.
///
/// ```rust
/// use steerer::prelude::*;
/// ```
pub mod prelude {
    // Core types and traits
    pub use steerer_core::{
        IoTypeId, MessageTag, Notice, Notifier, NullNotifier, ParamHandle, SimHandle,
        SteeringLibrary, SupportedCommand,
    };

    // Errors
    pub use steerer_core::LibraryError;
    pub use steerer_engine::{AttachError, CommandError, ConfigError, StartupError};

    // Engine
    pub use steerer_engine::{
        AttachMode, PollInterval, SessionView, Steerer, SteererConfig, TracingNotifier,
    };
}
