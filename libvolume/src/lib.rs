//! # libvolume — gcsfuse-backed Docker volume plugin
//!
//! `libvolume` implements the storage side of a Docker volume plugin: a
//! registry of named volumes, each bound to a Google Cloud Storage bucket
//! (and optionally a directory within it), mounted on demand by running
//! `gcsfuse`.  It follows the RK8s conventions (Tokio async runtime,
//! `tracing` for observability, `thiserror` for structured errors).
//!
//! ## Module overview
//!
//! | Module | Purpose |
//! |---|---|
//! | [`types`] | Shared data: `VolumeInfo`, `MountSpec`, capabilities. |
//! | [`error`] | [`VolumeError`] enum covering all failure modes. |
//! | [`profile`] | Required create options and enabled operations. |
//! | [`executor`] | [`MountExecutor`] trait and the `gcsfuse` implementation. |
//! | [`volume`] | A single volume and its mount state machine. |
//! | [`driver`] | [`VolumeDriver`] trait — the plugin RPC vocabulary. |
//! | [`registry`] | [`Registry`] — name → volume map implementing the driver. |
//! | [`logging`] | [`Logging`] — entry/exit logging decorator. |
//! | [`message`] | Docker plugin protocol payloads. |
//! | [`transport`] | Unix-socket HTTP server for the plugin protocol. |

pub mod driver;
pub mod error;
pub mod executor;
pub mod logging;
pub mod message;
pub mod profile;
pub mod registry;
pub mod transport;
pub mod types;
pub mod volume;

// Re-export the most commonly used items at crate root for convenience.
pub use driver::VolumeDriver;
pub use error::VolumeError;
pub use executor::{Diagnostic, FuseExecutor, MountExecutor};
pub use logging::Logging;
pub use profile::{OptionProfile, Operation, Profile};
pub use registry::Registry;
pub use transport::PluginServer;
pub use types::*;
pub use volume::Volume;
