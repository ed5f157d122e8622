//! Node identities — one secp256k1 keypair per slot, persisted as an encrypted
//! keystore document.
//!
//! Layout under the key root:
//! ```text
//! <root>/
//! ├── v1/
//! │   └── node_key.json   (encrypted keystore, mode 0600)
//! ├── v2/
//! │   └── node_key.json
//! └── …
//! ```
//!
//! Key files are created once and never rewritten. Re-running a batch over a
//! partially provisioned root only fills the gaps.

use std::{
    fmt, fs,
    path::{Path, PathBuf},
};

use k256::SecretKey;
use rand_core::OsRng;

use crate::{
    error::FleetError,
    fleet::{MAX_SLOTS_PER_BATCH, NodeSlot, Role},
    keystore::{self, Address, KdfParams, KeystoreDocument},
    observer::FleetObserver,
    persist,
};

/// A decrypted node key and the address it derives.
pub struct NodeIdentity {
    secret: SecretKey,
    address: Address,
}

impl NodeIdentity {
    pub fn generate() -> Self {
        Self::from_secret(SecretKey::random(&mut OsRng))
    }

    pub fn from_secret(secret: SecretKey) -> Self {
        let address = Address::from_secret(&secret);
        Self { secret, address }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn secret(&self) -> &SecretKey {
        &self.secret
    }
}

impl fmt::Debug for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeIdentity")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Result of provisioning one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOutcome {
    Created { slot: NodeSlot, address: Address },
    Skipped { slot: NodeSlot, address: Address },
}

impl KeyOutcome {
    pub fn slot(&self) -> NodeSlot {
        match self {
            KeyOutcome::Created { slot, .. } | KeyOutcome::Skipped { slot, .. } => *slot,
        }
    }

    pub fn address(&self) -> Address {
        match self {
            KeyOutcome::Created { address, .. } | KeyOutcome::Skipped { address, .. } => *address,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, KeyOutcome::Created { .. })
    }
}

/// Owns the keystore files under a key root.
#[derive(Debug, Clone, Default)]
pub struct IdentityStore {
    kdf: KdfParams,
}

impl IdentityStore {
    pub fn new(kdf: KdfParams) -> Self {
        Self { kdf }
    }

    /// Make sure slots `1..=count` of `role` each have a keystore under `root`.
    ///
    /// Inputs are validated before anything is written. Slots are handled in
    /// index order; an I/O failure aborts the batch but leaves every slot
    /// written so far intact.
    pub fn ensure_keys(
        &self,
        root: &Path,
        role: Role,
        count: u32,
        password: &str,
        observer: &dyn FleetObserver,
    ) -> Result<Vec<KeyOutcome>, FleetError> {
        validate_batch(root, count, password)?;

        let mut outcomes = Vec::with_capacity(count as usize);
        for index in 1..=count {
            let slot = NodeSlot::new(role, index);
            outcomes.push(self.ensure_slot(root, slot, password, observer)?);
        }
        Ok(outcomes)
    }

    fn ensure_slot(
        &self,
        root: &Path,
        slot: NodeSlot,
        password: &str,
        observer: &dyn FleetObserver,
    ) -> Result<KeyOutcome, FleetError> {
        let path = slot.keystore_path(root);

        // An existing file is never replaced, even when it does not parse.
        if path.exists() {
            let address = recover_address(&path)?;
            observer.key_skipped(slot, &path, &address);
            return Ok(KeyOutcome::Skipped { slot, address });
        }

        let dir = slot.dir(root);
        fs::create_dir_all(&dir).map_err(|e| FleetError::io(&dir, e))?;

        let identity = NodeIdentity::generate();
        let doc = keystore::encrypt(identity.secret(), password, self.kdf)
            .map_err(FleetError::Serialize)?;
        write_document(&path, &doc)?;

        let address = identity.address();
        observer.key_created(slot, &path, &address);
        Ok(KeyOutcome::Created { slot, address })
    }

    /// Decrypt the keystore at `path` and check it against its recorded address.
    pub fn unlock(&self, path: &Path, password: &str) -> Result<NodeIdentity, FleetError> {
        let doc = read_document(path)?;
        let recorded: Address = doc
            .address
            .parse()
            .map_err(|reason: String| FleetError::malformed(path, reason))?;

        let raw = keystore::decrypt(&doc, password).map_err(FleetError::Decrypt)?;
        let secret = SecretKey::from_slice(raw.as_slice())
            .map_err(|_| FleetError::malformed(path, "decrypted key is not a valid secp256k1 scalar"))?;

        let identity = NodeIdentity::from_secret(secret);
        if identity.address() != recorded {
            return Err(FleetError::malformed(
                path,
                format!("key derives {} but document records {recorded}", identity.address()),
            ));
        }
        Ok(identity)
    }
}

/// Read the cleartext address of the keystore at `path`. No password needed.
pub fn recover_address(path: &Path) -> Result<Address, FleetError> {
    let text = read_keystore_text(path)?;
    keystore::parse_address(&text).map_err(|reason| FleetError::malformed(path, reason))
}

pub fn validate_batch(root: &Path, count: u32, password: &str) -> Result<(), FleetError> {
    if !(1..=MAX_SLOTS_PER_BATCH).contains(&count) {
        return Err(FleetError::Validation(format!(
            "invalid node count {count}, 1..{MAX_SLOTS_PER_BATCH} is valid range"
        )));
    }
    if password.is_empty() {
        return Err(FleetError::Validation("key password must not be empty".into()));
    }
    if !root.is_dir() {
        return Err(FleetError::Validation(format!(
            "key dir {} does not exist or is not a directory",
            root.display()
        )));
    }
    Ok(())
}

// ── internals ────────────────────────────────────────────────────────────────

fn read_keystore_text(path: &Path) -> Result<String, FleetError> {
    fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => FleetError::NotFound(PathBuf::from(path)),
        _ => FleetError::malformed(path, format!("unreadable: {e}")),
    })
}

fn read_document(path: &Path) -> Result<KeystoreDocument, FleetError> {
    let text = read_keystore_text(path)?;
    serde_json::from_str(&text).map_err(|e| FleetError::malformed(path, e.to_string()))
}

fn write_document(path: &Path, doc: &KeystoreDocument) -> Result<(), FleetError> {
    let json = serde_json::to_vec_pretty(doc).map_err(|e| FleetError::Serialize(e.to_string()))?;
    persist::write_atomic(path, &json, Some(0o600))
}

// ── tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keystore::TEST_KDF;
    use crate::observer::{Observation, RecordingObserver};
    use std::collections::HashSet;
    use tempfile::TempDir;

    fn store() -> IdentityStore {
        IdentityStore::new(TEST_KDF)
    }

    #[test]
    fn creates_one_keystore_per_slot() {
        let tmp = TempDir::new().unwrap();
        let obs = RecordingObserver::new();
        let outcomes = store()
            .ensure_keys(tmp.path(), Role::Validator, 3, "test", &obs)
            .unwrap();

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().all(KeyOutcome::is_created));
        for i in 1..=3 {
            assert!(tmp.path().join(format!("v{i}")).join("node_key.json").is_file());
        }
        assert_eq!(obs.events().len(), 3);
    }

    #[test]
    fn addresses_are_distinct() {
        let tmp = TempDir::new().unwrap();
        let outcomes = store()
            .ensure_keys(tmp.path(), Role::Storage, 5, "test", &RecordingObserver::new())
            .unwrap();
        let unique: HashSet<_> = outcomes.iter().map(KeyOutcome::address).collect();
        assert_eq!(unique.len(), 5);
    }

    #[test]
    fn rerun_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let s = store();
        let first = s
            .ensure_keys(tmp.path(), Role::Validator, 2, "test", &RecordingObserver::new())
            .unwrap();

        let obs = RecordingObserver::new();
        let second = s.ensure_keys(tmp.path(), Role::Validator, 2, "test", &obs).unwrap();

        assert!(second.iter().all(|o| !o.is_created()));
        let a: Vec<_> = first.iter().map(KeyOutcome::address).collect();
        let b: Vec<_> = second.iter().map(KeyOutcome::address).collect();
        assert_eq!(a, b);
        assert!(matches!(obs.events()[0], Observation::Skipped(_, _)));
    }

    #[test]
    fn rerun_fills_gaps_only() {
        let tmp = TempDir::new().unwrap();
        let s = store();
        s.ensure_keys(tmp.path(), Role::Archival, 1, "test", &RecordingObserver::new())
            .unwrap();
        let outcomes = s
            .ensure_keys(tmp.path(), Role::Archival, 3, "test", &RecordingObserver::new())
            .unwrap();
        let created: Vec<bool> = outcomes.iter().map(KeyOutcome::is_created).collect();
        assert_eq!(created, vec![false, true, true]);
    }

    #[test]
    fn recover_address_round_trip() {
        let tmp = TempDir::new().unwrap();
        let outcomes = store()
            .ensure_keys(tmp.path(), Role::Validator, 1, "test", &RecordingObserver::new())
            .unwrap();
        let path = NodeSlot::new(Role::Validator, 1).keystore_path(tmp.path());
        assert_eq!(recover_address(&path).unwrap(), outcomes[0].address());
    }

    #[test]
    fn unlock_returns_matching_key() {
        let tmp = TempDir::new().unwrap();
        let s = store();
        let outcomes = s
            .ensure_keys(tmp.path(), Role::Validator, 1, "hunter2", &RecordingObserver::new())
            .unwrap();
        let path = NodeSlot::new(Role::Validator, 1).keystore_path(tmp.path());

        let identity = s.unlock(&path, "hunter2").unwrap();
        assert_eq!(identity.address(), outcomes[0].address());

        let err = s.unlock(&path, "wrong").unwrap_err();
        assert!(matches!(err, FleetError::Decrypt(_)));
    }

    #[test]
    fn recover_address_missing_and_malformed() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("v1").join("node_key.json");
        assert!(matches!(recover_address(&missing), Err(FleetError::NotFound(_))));

        fs::create_dir_all(missing.parent().unwrap()).unwrap();
        fs::write(&missing, "{ not json").unwrap();
        assert!(matches!(recover_address(&missing), Err(FleetError::Malformed { .. })));
    }

    #[test]
    fn malformed_existing_keystore_is_never_overwritten() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("v1").join("node_key.json");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "garbage").unwrap();

        let err = store()
            .ensure_keys(tmp.path(), Role::Validator, 2, "test", &RecordingObserver::new())
            .unwrap_err();
        assert!(matches!(err, FleetError::Malformed { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), "garbage");
    }

    #[test]
    fn io_failure_aborts_batch_and_rerun_completes() {
        let tmp = TempDir::new().unwrap();
        let s = store();
        // A plain file where the v2 slot directory should go.
        let blocker = tmp.path().join("v2");
        fs::write(&blocker, "not a directory").unwrap();

        let err = s
            .ensure_keys(tmp.path(), Role::Validator, 3, "test", &RecordingObserver::new())
            .unwrap_err();
        match err {
            FleetError::Io { path, .. } => assert_eq!(path, blocker),
            other => panic!("expected io error, got {other:?}"),
        }
        let v1 = NodeSlot::new(Role::Validator, 1).keystore_path(tmp.path());
        let first = recover_address(&v1).unwrap();
        assert!(!tmp.path().join("v3").exists());

        fs::remove_file(&blocker).unwrap();
        let outcomes = s
            .ensure_keys(tmp.path(), Role::Validator, 3, "test", &RecordingObserver::new())
            .unwrap();
        let created: Vec<bool> = outcomes.iter().map(KeyOutcome::is_created).collect();
        assert_eq!(created, vec![false, true, true]);
        assert_eq!(outcomes[0].address(), first);
    }

    #[test]
    fn validation_rejects_bad_input_before_writing() {
        let tmp = TempDir::new().unwrap();
        let s = store();
        let obs = RecordingObserver::new();

        for count in [0, 101] {
            let err = s.ensure_keys(tmp.path(), Role::Validator, count, "test", &obs).unwrap_err();
            assert!(matches!(err, FleetError::Validation(_)));
        }
        let err = s.ensure_keys(tmp.path(), Role::Validator, 1, "", &obs).unwrap_err();
        assert!(matches!(err, FleetError::Validation(_)));

        let absent = tmp.path().join("nope");
        let err = s.ensure_keys(&absent, Role::Validator, 1, "test", &obs).unwrap_err();
        assert!(matches!(err, FleetError::Validation(_)));

        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 0);
        assert!(obs.events().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn keystore_mode_is_0600() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = TempDir::new().unwrap();
        store()
            .ensure_keys(tmp.path(), Role::Validator, 1, "test", &RecordingObserver::new())
            .unwrap();
        let mode = fs::metadata(tmp.path().join("v1/node_key.json"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
