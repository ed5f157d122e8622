//! Artifacts generated from a scanned topology. Both generators are pure:
//! they read a [`Topology`](crate::topology::Topology) and own no state.

pub mod manifest;
pub mod register;

pub use manifest::{ComposeManifestGenerator, ManifestService, ManifestSettings};
pub use register::{NetworkEnvironment, RegistrationCommand, RegistrationScriptGenerator};
