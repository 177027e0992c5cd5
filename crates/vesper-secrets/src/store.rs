//! `SecretStore` — scoped acquisition of at-rest-encrypted key/value strings.
//!
//! The whole map is AES-256-GCM encrypted as one blob. The key is derived via
//! HKDF-SHA256 from the config directory path, matching this system's existing
//! convention of deriving process identity from its install location rather
//! than a separate keyring. That makes the store fragile across environments
//! where the config path can move (see design notes); a per-install random
//! machine key would be the sturdier fix but is not what's implemented here.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use hkdf::Hkdf;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::warn;

use crate::error::{Result, SecretError};

#[derive(Serialize, Deserialize)]
struct EncryptedBlob {
    nonce: String, // hex, 12 bytes
    ciphertext: String, // hex
}

pub struct SecretStore {
    path: PathBuf,
    key: [u8; 32],
    values: RwLock<HashMap<String, String>>,
}

impl SecretStore {
    /// Open (or create) the store at `config_dir/secrets.enc`. Decryption
    /// failure of an existing blob wipes the store and rebuilds it empty —
    /// the user must re-supply secrets, but the process never aborts.
    pub fn open(config_dir: &Path) -> Result<Self> {
        let key = derive_key(config_dir);
        let path = config_dir.join("secrets.enc");
        let values = if path.exists() {
            match std::fs::read(&path) {
                Ok(bytes) => match decrypt_blob(&bytes, &key) {
                    Ok(map) => map,
                    Err(e) => {
                        warn!(error = %e, "secret store decryption failed, rebuilding empty");
                        HashMap::new()
                    }
                },
                Err(e) => {
                    warn!(error = %e, "could not read secret store, rebuilding empty");
                    HashMap::new()
                }
            }
        } else {
            HashMap::new()
        };

        Ok(Self {
            path,
            key,
            values: RwLock::new(values),
        })
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.values.read().unwrap().get(key).cloned()
    }

    pub fn has(&self, key: &str) -> bool {
        self.values.read().unwrap().contains_key(key)
    }

    pub fn list(&self) -> Vec<String> {
        self.values.read().unwrap().keys().cloned().collect()
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .write()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        self.persist()
    }

    pub fn delete(&self, key: &str) -> Result<()> {
        self.values.write().unwrap().remove(key);
        self.persist()
    }

    /// Substitute `{{secrets.KEY}}` occurrences in `template`. A referenced
    /// but absent key leaves the token untouched and emits a warning, rather
    /// than failing the whole substitution.
    pub fn resolve(&self, template: &str) -> String {
        let values = self.values.read().unwrap();
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(start) = rest.find("{{secrets.") {
            out.push_str(&rest[..start]);
            let after = &rest[start + "{{secrets.".len()..];
            match after.find("}}") {
                Some(end) => {
                    let key = &after[..end];
                    match values.get(key) {
                        Some(v) => out.push_str(v),
                        None => {
                            warn!(key, "secret referenced but not set, leaving token");
                            out.push_str("{{secrets.");
                            out.push_str(key);
                            out.push_str("}}");
                        }
                    }
                    rest = &after[end + 2..];
                }
                None => {
                    out.push_str("{{secrets.");
                    rest = after;
                    break;
                }
            }
        }
        out.push_str(rest);
        out
    }

    fn persist(&self) -> Result<()> {
        let values = self.values.read().unwrap();
        let blob = encrypt_blob(&values, &self.key)?;
        let tmp = self.path.with_extension("enc.tmp");
        std::fs::write(&tmp, serde_json::to_vec(&blob)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

fn derive_key(config_dir: &Path) -> [u8; 32] {
    let ikm = config_dir.to_string_lossy();
    let hk = Hkdf::<Sha256>::new(None, ikm.as_bytes());
    let mut okm = [0u8; 32];
    hk.expand(b"vesper-secret-store-v1", &mut okm)
        .expect("32 bytes is a valid HKDF output length");
    okm
}

fn encrypt_blob(values: &HashMap<String, String>, key: &[u8; 32]) -> Result<EncryptedBlob> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let mut nonce_bytes = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);
    let plaintext = serde_json::to_vec(values)?;
    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_ref())
        .map_err(|_| SecretError::MissingKey("encryption failed".to_string()))?;
    Ok(EncryptedBlob {
        nonce: hex::encode(nonce_bytes),
        ciphertext: hex::encode(ciphertext),
    })
}

fn decrypt_blob(bytes: &[u8], key: &[u8; 32]) -> Result<HashMap<String, String>> {
    let blob: EncryptedBlob = serde_json::from_slice(bytes)?;
    let nonce_bytes = hex::decode(&blob.nonce).map_err(|_| SecretError::MissingKey("bad nonce".into()))?;
    let ciphertext = hex::decode(&blob.ciphertext).map_err(|_| SecretError::MissingKey("bad ciphertext".into()))?;
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce = Nonce::from_slice(&nonce_bytes);
    let plaintext = cipher
        .decrypt(nonce, ciphertext.as_ref())
        .map_err(|_| SecretError::MissingKey("decryption failed".to_string()))?;
    Ok(serde_json::from_slice(&plaintext)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = SecretStore::open(dir.path()).unwrap();
            store.set("ANTHROPIC_API_KEY", "sk-test-123").unwrap();
        }
        let store = SecretStore::open(dir.path()).unwrap();
        assert_eq!(store.get("ANTHROPIC_API_KEY").as_deref(), Some("sk-test-123"));
    }

    #[test]
    fn delete_removes_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = SecretStore::open(dir.path()).unwrap();
        store.set("FOO", "bar").unwrap();
        store.delete("FOO").unwrap();
        assert!(!store.has("FOO"));
    }

    #[test]
    fn resolve_substitutes_known_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = SecretStore::open(dir.path()).unwrap();
        store.set("TOKEN", "abc123").unwrap();
        let out = store.resolve("Authorization: Bearer {{secrets.TOKEN}}");
        assert_eq!(out, "Authorization: Bearer abc123");
    }

    #[test]
    fn resolve_leaves_missing_key_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let store = SecretStore::open(dir.path()).unwrap();
        let out = store.resolve("key={{secrets.MISSING}}");
        assert_eq!(out, "key={{secrets.MISSING}}");
    }

    #[test]
    fn corrupted_blob_rebuilds_empty_instead_of_failing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("secrets.enc"), b"not valid json").unwrap();
        let store = SecretStore::open(dir.path()).unwrap();
        assert!(store.list().is_empty());
    }

    #[test]
    fn list_never_exposes_values() {
        let dir = tempfile::tempdir().unwrap();
        let store = SecretStore::open(dir.path()).unwrap();
        store.set("SECRET", "shhh").unwrap();
        assert_eq!(store.list(), vec!["SECRET".to_string()]);
    }
}
