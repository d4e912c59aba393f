//! Durable client-side storage for the session token and cached profile.
//!
//! The store itself is a dumb key/value map. Everything that gives the
//! values meaning (the profile envelope, treating garbage as absent) lives
//! in the helper functions below.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::session::error::StoreError;
use crate::types::{SessionToken, UserProfile};

pub const TOKEN_KEY: &str = "token";
pub const USER_KEY: &str = "user";

/// Current version of the cached profile envelope.
pub const PROFILE_FORMAT_VERSION: u32 = 1;

/// Key/value persistence for session data.
pub trait TokenStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// In-process store; contents vanish with the process.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

/// Store backed by a JSON object file.
///
/// Every write rewrites the whole file through a sibling temp file and a
/// rename, so a crash never leaves a half-written file behind.
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> BTreeMap<String, String> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return BTreeMap::new(),
            Err(e) => {
                warn!("Could not read token store {}: {}", self.path.display(), e);
                return BTreeMap::new();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(
                    "Token store {} is not valid JSON, treating as empty: {}",
                    self.path.display(),
                    e
                );
                BTreeMap::new()
            }
        }
    }

    fn write_entries(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| StoreError::Io(e.to_string()))?;
        }

        let json =
            serde_json::to_string_pretty(entries).map_err(|e| StoreError::Serialize(e.to_string()))?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, json).map_err(|e| StoreError::Io(e.to_string()))?;
        fs::rename(&tmp, &self.path).map_err(|e| StoreError::Io(e.to_string()))?;
        Ok(())
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self, key: &str) -> Option<String> {
        self.read_entries().remove(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.read_entries();
        entries.insert(key.to_string(), value.to_string());
        self.write_entries(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.read_entries();
        if entries.remove(key).is_none() {
            return Ok(());
        }
        self.write_entries(&entries)
    }
}

#[derive(Serialize)]
struct ProfileEnvelopeRef<'a> {
    version: u32,
    user: &'a UserProfile,
}

#[derive(Deserialize)]
struct ProfileEnvelope {
    version: u32,
    user: UserProfile,
}

/// Serialize a profile into the versioned envelope.
pub fn encode_profile(profile: &UserProfile) -> Result<String, StoreError> {
    serde_json::to_string(&ProfileEnvelopeRef {
        version: PROFILE_FORMAT_VERSION,
        user: profile,
    })
    .map_err(|e| StoreError::Serialize(e.to_string()))
}

/// Parse a cached profile.
///
/// Accepts the current envelope and the unversioned bare profile object
/// (version 0). Anything else is `None`.
pub fn decode_profile(raw: &str) -> Option<UserProfile> {
    let value: serde_json::Value = serde_json::from_str(raw).ok()?;
    let object = value.as_object()?;

    if object.contains_key("version") {
        let envelope: ProfileEnvelope = serde_json::from_value(value).ok()?;
        if envelope.version != PROFILE_FORMAT_VERSION {
            debug!("Ignoring cached profile with version {}", envelope.version);
            return None;
        }
        return Some(envelope.user);
    }

    serde_json::from_value(value).ok()
}

pub fn load_token(store: &dyn TokenStore) -> Option<SessionToken> {
    store
        .get(TOKEN_KEY)
        .filter(|t| !t.is_empty())
        .map(SessionToken::new)
}

pub fn load_user_profile(store: &dyn TokenStore) -> Option<UserProfile> {
    let raw = store.get(USER_KEY)?;
    let profile = decode_profile(&raw);
    if profile.is_none() {
        warn!("Cached user profile is unreadable, ignoring it");
    }
    profile
}

pub fn save_user_profile(store: &dyn TokenStore, profile: &UserProfile) -> Result<(), StoreError> {
    store.set(USER_KEY, &encode_profile(profile)?)
}

pub fn save_session(
    store: &dyn TokenStore,
    token: &SessionToken,
    profile: &UserProfile,
) -> Result<(), StoreError> {
    let encoded = encode_profile(profile)?;
    store.set(TOKEN_KEY, token.as_str())?;
    store.set(USER_KEY, &encoded)
}

/// Remove both entries. Both removals are attempted even if the first fails.
pub fn clear_session(store: &dyn TokenStore) -> Result<(), StoreError> {
    let token = store.remove(TOKEN_KEY);
    let user = store.remove(USER_KEY);
    token.and(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Email, Role, UserId};

    fn profile(role: Role) -> UserProfile {
        UserProfile {
            id: UserId::new("1"),
            name: "A".to_string(),
            email: Email::new("a@b.com"),
            role,
        }
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryTokenStore::new();
        assert!(store.get(TOKEN_KEY).is_none());

        store.set(TOKEN_KEY, "T1").unwrap();
        assert_eq!(store.get(TOKEN_KEY), Some("T1".to_string()));

        store.remove(TOKEN_KEY).unwrap();
        assert!(store.get(TOKEN_KEY).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");

        let store = FileTokenStore::new(&path);
        store.set(TOKEN_KEY, "T1").unwrap();
        store.set(USER_KEY, "{}").unwrap();

        let reopened = FileTokenStore::new(&path);
        assert_eq!(reopened.get(TOKEN_KEY), Some("T1".to_string()));
        assert_eq!(reopened.get(USER_KEY), Some("{}".to_string()));

        reopened.remove(TOKEN_KEY).unwrap();
        assert!(store.get(TOKEN_KEY).is_none());
        assert!(store.get(USER_KEY).is_some());
    }

    #[test]
    fn test_file_store_missing_or_corrupt_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let store = FileTokenStore::new(&path);
        assert!(store.get(TOKEN_KEY).is_none());
        store.remove(TOKEN_KEY).unwrap();
        assert!(!path.exists());

        fs::write(&path, "not json at all").unwrap();
        assert!(store.get(TOKEN_KEY).is_none());

        // A write replaces the garbage with a valid document.
        store.set(TOKEN_KEY, "T2").unwrap();
        assert_eq!(store.get(TOKEN_KEY), Some("T2".to_string()));
    }

    #[test]
    fn test_profile_envelope_roundtrip() {
        let encoded = encode_profile(&profile(Role::Admin)).unwrap();
        assert!(encoded.contains("\"version\":1"));
        assert_eq!(decode_profile(&encoded), Some(profile(Role::Admin)));
    }

    #[test]
    fn test_decode_legacy_bare_profile() {
        let raw = r#"{"id":"1","name":"A","email":"a@b.com","role":"admin"}"#;
        assert_eq!(decode_profile(raw), Some(profile(Role::Admin)));
    }

    #[test]
    fn test_decode_rejects_garbage_and_unknown_versions() {
        assert!(decode_profile("{not json").is_none());
        assert!(decode_profile("\"just a string\"").is_none());
        assert!(decode_profile("[1,2,3]").is_none());
        assert!(decode_profile(r#"{"name":"A"}"#).is_none());

        let future = r#"{"version":7,"user":{"id":"1","name":"A","email":"a@b.com"}}"#;
        assert!(decode_profile(future).is_none());
    }

    #[test]
    fn test_load_user_profile_treats_corrupt_as_absent() {
        let store = MemoryTokenStore::new();
        store.set(USER_KEY, "undefined").unwrap();
        assert!(load_user_profile(&store).is_none());
    }

    #[test]
    fn test_load_token_ignores_empty() {
        let store = MemoryTokenStore::new();
        store.set(TOKEN_KEY, "").unwrap();
        assert!(load_token(&store).is_none());
    }

    #[test]
    fn test_save_and_clear_session() {
        let store = MemoryTokenStore::new();
        save_session(&store, &SessionToken::new("T1"), &profile(Role::User)).unwrap();

        assert_eq!(load_token(&store), Some(SessionToken::new("T1")));
        assert_eq!(load_user_profile(&store), Some(profile(Role::User)));

        clear_session(&store).unwrap();
        assert!(store.is_empty());

        // Clearing twice is harmless.
        clear_session(&store).unwrap();
        assert!(store.is_empty());
    }
}
