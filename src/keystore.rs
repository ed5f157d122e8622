//! Keystore documents — password-encrypted node keys with a cleartext address.
//!
//! The private key is sealed with ChaCha20-Poly1305 under a key stretched from
//! the password by Argon2id. The Poly1305 tag is stored as `mac`, and the
//! address bytes are bound in as associated data so editing the cleartext
//! address breaks decryption.
//!
//! ```json
//! {
//!   "version": 1,
//!   "id": "3f1c…",
//!   "address": "9d8a62f656a8d1615c1294fd71e9cfb3e4855a4f",
//!   "crypto": {
//!     "cipher": "chacha20-poly1305",
//!     "cipherparams": { "nonce": "…" },
//!     "ciphertext": "…",
//!     "kdf": "argon2id",
//!     "kdfparams": { "m_cost": 65536, "t_cost": 3, "p_cost": 1, "dklen": 32, "salt": "…" },
//!     "mac": "…"
//!   }
//! }
//! ```

use std::{fmt, str::FromStr};

use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::aead::{AeadInPlace, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce, Tag};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::SecretKey;
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use zeroize::Zeroizing;

pub const KEYSTORE_VERSION: u32 = 1;
pub const CIPHER_NAME: &str = "chacha20-poly1305";
pub const KDF_NAME: &str = "argon2id";

const SALT_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;
const TAG_LEN: usize = 16;

// ── address ──────────────────────────────────────────────────────────────────

/// 20-byte account address: the last 20 bytes of `keccak256(pubkey)` over the
/// uncompressed public key without its `0x04` prefix.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; 20]);

impl Address {
    pub fn from_secret(secret: &SecretKey) -> Address {
        let point = secret.public_key().to_encoded_point(false);
        let hash = Keccak256::digest(&point.as_bytes()[1..]);
        let mut out = [0u8; 20];
        out.copy_from_slice(&hash[12..]);
        Address(out)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Lowercase hex without `0x`, as stored in keystore documents.
    pub fn to_plain_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// EIP-55 mixed-case checksum form with `0x` prefix.
    pub fn to_checksum(&self) -> String {
        let lower = self.to_plain_hex();
        let hash = Keccak256::digest(lower.as_bytes());
        let mut out = String::with_capacity(42);
        out.push_str("0x");
        for (i, ch) in lower.chars().enumerate() {
            let byte = hash[i / 2];
            let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0f };
            if ch.is_ascii_alphabetic() && nibble >= 8 {
                out.push(ch.to_ascii_uppercase());
            } else {
                out.push(ch);
            }
        }
        out
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_checksum())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_checksum())
    }
}

impl FromStr for Address {
    type Err = String;

    /// Accepts 40 hex characters in any case, with or without `0x`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let body = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        if body.len() != 40 {
            return Err(format!("address must be 40 hex chars, got {}", body.len()));
        }
        let bytes = hex::decode(body).map_err(|e| format!("address is not hex: {e}"))?;
        let mut out = [0u8; 20];
        out.copy_from_slice(&bytes);
        Ok(Address(out))
    }
}

// ── document ─────────────────────────────────────────────────────────────────

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB.
    pub m_cost: u32,
    pub t_cost: u32,
    pub p_cost: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self { m_cost: 65_536, t_cost: 3, p_cost: 1 }
    }
}

/// Cheap parameters so tests do not spend seconds in Argon2.
#[cfg(test)]
pub(crate) const TEST_KDF: KdfParams = KdfParams { m_cost: 64, t_cost: 1, p_cost: 1 };

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeystoreDocument {
    pub version: u32,
    pub id: String,
    pub address: String,
    pub crypto: CryptoSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CryptoSection {
    pub cipher: String,
    pub cipherparams: CipherParams,
    #[serde(with = "hex_bytes")]
    pub ciphertext: Vec<u8>,
    pub kdf: String,
    pub kdfparams: StoredKdfParams,
    #[serde(with = "hex_bytes")]
    pub mac: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CipherParams {
    #[serde(with = "hex_bytes")]
    pub nonce: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredKdfParams {
    pub m_cost: u32,
    pub t_cost: u32,
    pub p_cost: u32,
    pub dklen: u32,
    #[serde(with = "hex_bytes")]
    pub salt: Vec<u8>,
}

/// Public projection of a keystore document — enough to recover the address
/// without touching the encrypted payload.
#[derive(Deserialize)]
struct PublicFields {
    address: String,
}

/// Extract the cleartext address from a keystore document.
pub fn parse_address(json: &str) -> Result<Address, String> {
    let fields: PublicFields =
        serde_json::from_str(json).map_err(|e| format!("not a keystore document: {e}"))?;
    fields.address.parse()
}

/// Seal `secret` under `password`.
pub fn encrypt(
    secret: &SecretKey,
    password: &str,
    params: KdfParams,
) -> Result<KeystoreDocument, String> {
    let address = Address::from_secret(secret);

    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let derived = derive_key(password, &salt, params)?;
    let cipher = ChaCha20Poly1305::new(Key::from_slice(&derived[..]));

    let mut buffer = secret.to_bytes().to_vec();
    let tag = cipher
        .encrypt_in_place_detached(Nonce::from_slice(&nonce), address.as_bytes(), &mut buffer)
        .map_err(|e| format!("encryption failure: {e}"))?;

    Ok(KeystoreDocument {
        version: KEYSTORE_VERSION,
        id: uuid::Uuid::new_v4().to_string(),
        address: address.to_plain_hex(),
        crypto: CryptoSection {
            cipher: CIPHER_NAME.to_string(),
            cipherparams: CipherParams { nonce: nonce.to_vec() },
            ciphertext: buffer,
            kdf: KDF_NAME.to_string(),
            kdfparams: StoredKdfParams {
                m_cost: params.m_cost,
                t_cost: params.t_cost,
                p_cost: params.p_cost,
                dklen: KEY_LEN as u32,
                salt: salt.to_vec(),
            },
            mac: tag.to_vec(),
        },
    })
}

/// Open a document with `password`, returning the raw 32-byte private key.
pub fn decrypt(doc: &KeystoreDocument, password: &str) -> Result<Zeroizing<[u8; KEY_LEN]>, String> {
    if doc.version != KEYSTORE_VERSION {
        return Err(format!("unsupported keystore version: {}", doc.version));
    }
    let crypto = &doc.crypto;
    if crypto.cipher != CIPHER_NAME {
        return Err(format!("unsupported cipher: {}", crypto.cipher));
    }
    if crypto.kdf != KDF_NAME {
        return Err(format!("unsupported kdf: {}", crypto.kdf));
    }
    if crypto.kdfparams.dklen as usize != KEY_LEN {
        return Err(format!("unsupported dklen: {}", crypto.kdfparams.dklen));
    }
    if crypto.cipherparams.nonce.len() != NONCE_LEN {
        return Err("nonce must be 12 bytes".into());
    }
    if crypto.mac.len() != TAG_LEN {
        return Err("mac must be 16 bytes".into());
    }
    if crypto.ciphertext.len() != KEY_LEN {
        return Err(format!("invalid ciphertext length: {}", crypto.ciphertext.len()));
    }

    let address: Address = doc.address.parse()?;
    let params = KdfParams {
        m_cost: crypto.kdfparams.m_cost,
        t_cost: crypto.kdfparams.t_cost,
        p_cost: crypto.kdfparams.p_cost,
    };
    let derived = derive_key(password, &crypto.kdfparams.salt, params)?;
    let cipher = ChaCha20Poly1305::new(Key::from_slice(&derived[..]));

    let mut plaintext = Zeroizing::new([0u8; KEY_LEN]);
    plaintext.copy_from_slice(&crypto.ciphertext);
    cipher
        .decrypt_in_place_detached(
            Nonce::from_slice(&crypto.cipherparams.nonce),
            address.as_bytes(),
            &mut plaintext[..],
            Tag::from_slice(&crypto.mac),
        )
        .map_err(|_| "mac mismatch (wrong password or tampered document)".to_string())?;

    Ok(plaintext)
}

fn derive_key(
    password: &str,
    salt: &[u8],
    params: KdfParams,
) -> Result<Zeroizing<[u8; KEY_LEN]>, String> {
    let params = Params::new(params.m_cost, params.t_cost, params.p_cost, Some(KEY_LEN))
        .map_err(|e| format!("invalid argon2 params: {e}"))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut derived = Zeroizing::new([0u8; KEY_LEN]);
    argon2
        .hash_password_into(password.as_bytes(), salt, &mut derived[..])
        .map_err(|e| format!("argon2 failure: {e}"))?;
    Ok(derived)
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}

// ── tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn secret_from_hex(h: &str) -> SecretKey {
        SecretKey::from_slice(&hex::decode(h).unwrap()).unwrap()
    }

    #[test]
    fn address_matches_known_vector() {
        // Private key 0x…01 maps to the well-known generator-point address.
        let secret =
            secret_from_hex("0000000000000000000000000000000000000000000000000000000000000001");
        let addr = Address::from_secret(&secret);
        assert_eq!(addr.to_plain_hex(), "7e5f4552091a69125d5dfcb7b8c2659029395bdf");
        assert_eq!(addr.to_string(), "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf");
    }

    #[test]
    fn address_parses_with_and_without_prefix() {
        let a: Address = "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf".parse().unwrap();
        let b: Address = "7e5f4552091a69125d5dfcb7b8c2659029395bdf".parse().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn address_rejects_bad_input() {
        assert!("0x1234".parse::<Address>().is_err());
        assert!("zz5f4552091a69125d5dfcb7b8c2659029395bdf".parse::<Address>().is_err());
    }

    #[test]
    fn encrypt_then_decrypt_recovers_key() {
        let secret = SecretKey::random(&mut OsRng);
        let doc = encrypt(&secret, "correct horse", TEST_KDF).unwrap();
        let opened = decrypt(&doc, "correct horse").unwrap();
        assert_eq!(opened.as_slice(), secret.to_bytes().as_slice());
        assert_eq!(doc.address, Address::from_secret(&secret).to_plain_hex());
    }

    #[test]
    fn wrong_password_fails() {
        let secret = SecretKey::random(&mut OsRng);
        let doc = encrypt(&secret, "pw1", TEST_KDF).unwrap();
        let err = decrypt(&doc, "pw2").unwrap_err();
        assert!(err.contains("mac mismatch"));
    }

    #[test]
    fn edited_address_breaks_mac() {
        let secret = SecretKey::random(&mut OsRng);
        let mut doc = encrypt(&secret, "pw", TEST_KDF).unwrap();
        doc.address = "7e5f4552091a69125d5dfcb7b8c2659029395bdf".into();
        assert!(decrypt(&doc, "pw").is_err());
    }

    #[test]
    fn document_json_exposes_address_only_in_cleartext() {
        let secret = SecretKey::random(&mut OsRng);
        let doc = encrypt(&secret, "pw", TEST_KDF).unwrap();
        let json = serde_json::to_string_pretty(&doc).unwrap();

        assert!(!json.contains(&hex::encode(secret.to_bytes())));
        assert_eq!(parse_address(&json).unwrap(), Address::from_secret(&secret));

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["crypto"]["kdf"], "argon2id");
        assert_eq!(value["crypto"]["kdfparams"]["dklen"], 32);
    }

    #[test]
    fn parse_address_rejects_garbage() {
        assert!(parse_address("not json").is_err());
        assert!(parse_address(r#"{"version": 1}"#).is_err());
        assert!(parse_address(r#"{"address": "0x12"}"#).is_err());
    }
}
