//! Progress reporting for provisioning runs.
//!
//! Components never print. They report to a [`FleetObserver`] handed in by the
//! caller; the binary uses [`TracingObserver`], tests use [`RecordingObserver`].

use std::{
    path::{Path, PathBuf},
    sync::Mutex,
};

use tracing::{info, warn};

use crate::{
    fleet::{NodeSlot, Role},
    keystore::Address,
    topology::Topology,
};

pub trait FleetObserver {
    fn key_created(&self, slot: NodeSlot, path: &Path, address: &Address);

    fn key_skipped(&self, slot: NodeSlot, path: &Path, address: &Address);

    /// A slot directory was found but left out of the topology.
    fn slot_excluded(&self, slot: NodeSlot, path: &Path, reason: &str);

    /// A directory is shaped like a slot name but names no usable slot.
    fn dir_ignored(&self, path: &Path, reason: &str);

    fn topology_scanned(&self, root: &Path, topology: &Topology);
}

/// Emits one structured `tracing` event per observation.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl FleetObserver for TracingObserver {
    fn key_created(&self, slot: NodeSlot, path: &Path, address: &Address) {
        info!(%slot, path = %path.display(), %address, "key file created");
    }

    fn key_skipped(&self, slot: NodeSlot, path: &Path, address: &Address) {
        info!(%slot, path = %path.display(), %address, "key file exists, skipping");
    }

    fn slot_excluded(&self, slot: NodeSlot, path: &Path, reason: &str) {
        warn!(%slot, path = %path.display(), reason, "slot excluded from topology");
    }

    fn dir_ignored(&self, path: &Path, reason: &str) {
        warn!(path = %path.display(), reason, "directory ignored");
    }

    fn topology_scanned(&self, root: &Path, topology: &Topology) {
        if topology.is_empty() {
            warn!(dir = %root.display(), role = topology.role().describe(), "no provisioned slots found");
        } else {
            info!(role = topology.role().describe(), slots = ?topology.indices(), "topology scanned");
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    Created(NodeSlot, Address),
    Skipped(NodeSlot, Address),
    Excluded(NodeSlot, String),
    Ignored(PathBuf, String),
    Scanned(Role, Vec<u32>),
}

/// Keeps every observation in memory, in order.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<Observation>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Observation> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn warnings(&self) -> Vec<(NodeSlot, String)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Observation::Excluded(slot, reason) => Some((slot, reason)),
                _ => None,
            })
            .collect()
    }

    /// Directories reported as ignored, with the reason.
    pub fn ignored(&self) -> Vec<(PathBuf, String)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Observation::Ignored(path, reason) => Some((path, reason)),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: Observation) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl FleetObserver for RecordingObserver {
    fn key_created(&self, slot: NodeSlot, _path: &Path, address: &Address) {
        self.push(Observation::Created(slot, *address));
    }

    fn key_skipped(&self, slot: NodeSlot, _path: &Path, address: &Address) {
        self.push(Observation::Skipped(slot, *address));
    }

    fn slot_excluded(&self, slot: NodeSlot, _path: &Path, reason: &str) {
        self.push(Observation::Excluded(slot, reason.to_string()));
    }

    fn dir_ignored(&self, path: &Path, reason: &str) {
        self.push(Observation::Ignored(path.to_path_buf(), reason.to_string()));
    }

    fn topology_scanned(&self, _root: &Path, topology: &Topology) {
        self.push(Observation::Scanned(topology.role(), topology.indices()));
    }
}
