//! Layered setting resolution and persistence engine.
//!
//! Components declare trees of typed settings. The engine resolves the
//! effective value of a setting across a temporary layer, any number of
//! active named layers and the declared defaults, validates writes, persists
//! them per plugin through a `ConfigAdapter`, and notifies listeners when an
//! effective value changes.
//!
//! # Layers
//!
//! - **Temporary** (`tmp`): live, highest precedence, the only layer with
//!   change notification
//! - **Named**: caller-ordered overlays below the temporary layer
//! - **Defaults**: declared per leaf, parsed lazily
//!
//! Bulk flows (`reload`, `import_settings`) buffer the writes listeners make
//! while the flow runs, so cascading writes can be told apart from the flow's
//! own writes and persisted deterministically.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![forbid(unsafe_code)]

pub mod buffer;
pub mod bulk;
pub mod cache;
pub mod codec;
pub mod command;
pub mod declaration;
pub mod deferred;
pub mod engine;
pub mod limiter;
pub mod notifier;
pub mod prelude;
pub mod registry;
pub mod schema;
pub mod validator;

pub use buffer::ConfigBuffer;
pub use declaration::{ComponentDecl, Declaration, ON_SETTING};
pub use engine::{SettingRead, SettingsEngine, SettingsEngineBuilder};
pub use notifier::{Lifecycle, Listener, ListenerId, SettingChange};
pub use validator::Validator;

// vim: ts=4
