//! Fleet model — node roles and the `(role, index)` slots they occupy.
//!
//! A slot lives on disk as `<root>/<letter><index>/node_key.json`, e.g.
//! `v3/node_key.json` for the third validator.

use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

use crate::error::FleetError;

/// File name of the keystore document inside each slot directory.
pub const KEYSTORE_FILE: &str = "node_key.json";

/// Upper bound for `generate-keys` batches.
pub const MAX_SLOTS_PER_BATCH: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    Validator,
    Storage,
    Archival,
}

impl Role {
    pub fn letter(self) -> char {
        match self {
            Role::Validator => 'v',
            Role::Storage => 's',
            Role::Archival => 'a',
        }
    }

    pub fn from_letter(letter: char) -> Option<Role> {
        match letter.to_ascii_lowercase() {
            'v' => Some(Role::Validator),
            's' => Some(Role::Storage),
            'a' => Some(Role::Archival),
            _ => None,
        }
    }

    pub fn base_stake(self) -> u64 {
        match self {
            Role::Validator => 100,
            Role::Storage => 200,
            Role::Archival => 300,
        }
    }

    pub fn base_port(self) -> u16 {
        match self {
            Role::Validator => 4000,
            Role::Storage => 3000,
            Role::Archival => 5000,
        }
    }

    /// Largest slot index whose port (`base_port + index`) still fits in a
    /// `u16`.
    pub fn max_index(self) -> u32 {
        u32::from(u16::MAX - self.base_port())
    }

    /// Name of the on-chain registration call for this role.
    pub fn registration_kind(self) -> &'static str {
        match self {
            Role::Validator => "registerValidator",
            Role::Storage => "registerStorage",
            Role::Archival => "registerArchival",
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            Role::Validator => "validator node",
            Role::Storage => "storage node",
            Role::Archival => "archival node",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

impl FromStr for Role {
    type Err = FleetError;

    /// Accepts the single role letter (`v`, `s`, `a`) in either case, or the
    /// full role name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let mut chars = lower.chars();
        let role = match (chars.next(), chars.next()) {
            (Some(c), None) => Role::from_letter(c),
            _ => match lower.as_str() {
                "validator" => Some(Role::Validator),
                "storage" => Some(Role::Storage),
                "archival" => Some(Role::Archival),
                _ => None,
            },
        };
        role.ok_or_else(|| {
            FleetError::Validation(format!("invalid node type '{s}'; valid options: v, s, a"))
        })
    }
}

/// One fleet position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeSlot {
    pub role: Role,
    pub index: u32,
}

impl NodeSlot {
    pub fn new(role: Role, index: u32) -> Self {
        Self { role, index }
    }

    /// Build a slot, rejecting indices outside `1..=role.max_index()`.
    pub fn try_new(role: Role, index: u64) -> Result<NodeSlot, FleetError> {
        let max = role.max_index();
        match u32::try_from(index) {
            Ok(i) if (1..=max).contains(&i) => Ok(NodeSlot { role, index: i }),
            _ => Err(FleetError::Validation(format!(
                "slot index {index} out of range for {}, 1..={max} is valid range",
                role.describe()
            ))),
        }
    }

    /// Index named by a slot-shaped directory such as `v12`, before any range
    /// check. `None` when the name is not slot-shaped for `role` at all.
    ///
    /// The role letter matches case-insensitively; the rest must be ASCII
    /// digits. Suffixes too long for a `u64` come back as `u64::MAX`.
    pub fn dir_index(role: Role, name: &str) -> Option<u64> {
        let mut chars = name.chars();
        let first = chars.next()?;
        if !first.eq_ignore_ascii_case(&role.letter()) {
            return None;
        }
        let digits = chars.as_str();
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        Some(digits.parse().unwrap_or(u64::MAX))
    }

    /// Parse a slot directory name such as `v12` for the given role. Only
    /// indices accepted by [`NodeSlot::try_new`] parse.
    pub fn parse_dir_name(role: Role, name: &str) -> Option<NodeSlot> {
        let index = Self::dir_index(role, name)?;
        Self::try_new(role, index).ok()
    }

    /// Canonical directory name, e.g. `v3`.
    pub fn dir_name(&self) -> String {
        format!("{}{}", self.role.letter(), self.index)
    }

    pub fn dir(&self, root: &Path) -> PathBuf {
        root.join(self.dir_name())
    }

    pub fn keystore_path(&self, root: &Path) -> PathBuf {
        self.dir(root).join(KEYSTORE_FILE)
    }

    /// `basePort + index`, shared by the service URL and the manifest.
    ///
    /// Slots built through [`NodeSlot::try_new`] or the scanner always fit;
    /// a hand-built slot past [`Role::max_index`] saturates at `u16::MAX`.
    pub fn port(&self) -> u16 {
        u16::try_from(self.index)
            .ok()
            .and_then(|i| self.role.base_port().checked_add(i))
            .unwrap_or(u16::MAX)
    }

    pub fn in_range(&self) -> bool {
        (1..=self.role.max_index()).contains(&self.index)
    }

    pub fn stake(&self) -> u64 {
        self.role.base_stake() + u64::from(self.index)
    }
}

impl fmt::Display for NodeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dir_name())
    }
}
