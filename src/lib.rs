//! fleetgen — provisioning for a validator / storage / archival node fleet.
//!
//! * [`identity`] creates one encrypted keystore per node slot, idempotently.
//! * [`topology`] discovers provisioned slots and their addresses from disk.
//! * [`artifacts`] turns a topology into registration commands and a compose
//!   manifest.
//! * [`cli`] binds the three into the `fleetgen` binary.

pub mod artifacts;
pub mod cli;
pub mod config;
pub mod error;
pub mod fleet;
pub mod identity;
pub mod keystore;
pub mod logger;
pub mod observer;
pub mod persist;
pub mod topology;

pub use error::FleetError;
pub use fleet::{NodeSlot, Role};
pub use identity::{IdentityStore, KeyOutcome, NodeIdentity};
pub use keystore::Address;
pub use topology::{Topology, TopologyEntry, TopologyScanner};
