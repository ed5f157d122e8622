//! Topology discovery: which slots of a role exist under a root, and which
//! address each one carries.
//!
//! The filesystem is reached only through [`DirectoryLister`], so the scan
//! logic runs the same against a real tree or an in-memory one.

use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};

use tracing::warn;

use crate::{
    error::FleetError,
    fleet::{KEYSTORE_FILE, NodeSlot, Role},
    keystore::{self, Address},
    observer::FleetObserver,
};

/// Read-only view of a directory tree.
pub trait DirectoryLister {
    /// Names of the immediate subdirectories of `root`. Plain files are not
    /// included.
    fn subdirectories(&self, root: &Path) -> io::Result<Vec<String>>;

    fn read_to_string(&self, path: &Path) -> io::Result<String>;
}

/// [`DirectoryLister`] over the real filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsLister;

impl DirectoryLister for FsLister {
    fn subdirectories(&self, root: &Path) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(root)? {
            let entry = entry?;
            // Follows symlinks, so a linked slot directory still counts.
            if !entry.path().is_dir() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(raw) => warn!(
                    dir = %root.display(),
                    name = %raw.to_string_lossy(),
                    "skipping directory with non-UTF-8 name"
                ),
            }
        }
        Ok(names)
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyEntry {
    pub slot: NodeSlot,
    pub address: Address,
    /// Directory the keystore was read from, relative to the scanned root.
    /// Usually `slot.dir_name()`; differs only for names like `V1` or `v01`.
    pub dir: String,
}

impl TopologyEntry {
    /// Entry living in the slot's canonical directory.
    pub fn new(slot: NodeSlot, address: Address) -> Self {
        Self { slot, address, dir: slot.dir_name() }
    }
}

/// Provisioned slots of one role, ascending by index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    role: Role,
    entries: Vec<TopologyEntry>,
}

impl Topology {
    /// Build a topology from arbitrary entries. Entries of other roles or with
    /// an out-of-range index are dropped; for a repeated index the first
    /// entry wins.
    pub fn from_entries(role: Role, entries: impl IntoIterator<Item = TopologyEntry>) -> Self {
        let mut by_index: BTreeMap<u32, TopologyEntry> = BTreeMap::new();
        for entry in entries
            .into_iter()
            .filter(|e| e.slot.role == role && e.slot.in_range())
        {
            by_index.entry(entry.slot.index).or_insert(entry);
        }
        Self { role, entries: by_index.into_values().collect() }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn entries(&self) -> &[TopologyEntry] {
        &self.entries
    }

    pub fn indices(&self) -> Vec<u32> {
        self.entries.iter().map(|e| e.slot.index).collect()
    }

    pub fn get(&self, index: u32) -> Option<&TopologyEntry> {
        self.entries
            .binary_search_by_key(&index, |e| e.slot.index)
            .ok()
            .map(|i| &self.entries[i])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub struct TopologyScanner<'a, L: DirectoryLister> {
    lister: L,
    observer: &'a dyn FleetObserver,
}

impl<'a, L: DirectoryLister> TopologyScanner<'a, L> {
    pub fn new(lister: L, observer: &'a dyn FleetObserver) -> Self {
        Self { lister, observer }
    }

    /// Discover every provisioned slot of `role` under `root`.
    ///
    /// A slot whose keystore is missing or unreadable is reported to the
    /// observer and left out; only failing to list `root` itself is an error.
    /// When several directories name one index, the canonical `dir_name()`
    /// wins, else the first name in sorted order.
    pub fn scan(&self, root: &Path, role: Role) -> Result<Topology, FleetError> {
        let mut names = self
            .lister
            .subdirectories(root)
            .map_err(|e| FleetError::io(root, e))?;
        // Fixed visiting order, so duplicate resolution does not depend on
        // directory iteration order.
        names.sort();

        let mut candidates: BTreeMap<u32, Vec<String>> = BTreeMap::new();
        for name in names {
            let Some(index) = NodeSlot::dir_index(role, &name) else {
                continue;
            };
            match NodeSlot::try_new(role, index) {
                Ok(slot) => candidates.entry(slot.index).or_default().push(name),
                Err(e) => self.observer.dir_ignored(&root.join(&name), &e.to_string()),
            }
        }

        let mut entries = Vec::with_capacity(candidates.len());
        for (index, mut dirs) in candidates {
            let slot = NodeSlot::new(role, index);
            let canonical = slot.dir_name();
            let keep = dirs.iter().position(|d| *d == canonical).unwrap_or(0);
            let dir = dirs.remove(keep);
            for other in dirs {
                self.observer.slot_excluded(
                    slot,
                    &root.join(&other),
                    &format!("duplicate of directory '{dir}'"),
                );
            }

            let path = root.join(&dir).join(KEYSTORE_FILE);
            match self.read_address(&path) {
                Ok(address) => entries.push(TopologyEntry { slot, address, dir }),
                Err(e) => self.observer.slot_excluded(slot, &path, &e.to_string()),
            }
        }

        let topology = Topology { role, entries };
        self.observer.topology_scanned(root, &topology);
        Ok(topology)
    }

    fn read_address(&self, path: &Path) -> Result<Address, FleetError> {
        let text = self.lister.read_to_string(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => FleetError::NotFound(PathBuf::from(path)),
            _ => FleetError::malformed(path, format!("unreadable: {e}")),
        })?;
        keystore::parse_address(&text).map_err(|reason| FleetError::malformed(path, reason))
    }
}

/// Scan a real directory tree.
pub fn scan_dir(
    root: &Path,
    role: Role,
    observer: &dyn FleetObserver,
) -> Result<Topology, FleetError> {
    TopologyScanner::new(FsLister, observer).scan(root, role)
}
