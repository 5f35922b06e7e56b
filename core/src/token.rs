//! Access/refresh token storage.
//!
//! # Design
//! `TokenStore` is the only place tokens live. It is injected into the
//! service rather than held in a global, so tests can swap in a
//! `MemoryTokenStore` and inspect it. `set` and `clear` are the only
//! mutators; writes are last-write-wins.
//!
//! `FileTokenStore` persists the pair as JSON so a session survives process
//! restarts. Disk failures are logged and swallowed: the in-memory copy stays
//! authoritative for the life of the process.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: Option<String>,
}

impl TokenPair {
    pub fn new(access: impl Into<String>, refresh: Option<String>) -> Self {
        Self {
            access: access.into(),
            refresh,
        }
    }

    /// Whether the access token is a JWT whose `exp` claim lies in the past.
    ///
    /// Opaque tokens and JWTs without `exp` are never considered expired;
    /// the server has the final word through a 401.
    pub fn access_expired(&self, now: SystemTime) -> bool {
        let Some(exp) = jwt_expiry(&self.access) else {
            return false;
        };
        let now = now
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        exp <= now
    }
}

#[derive(Deserialize)]
struct Claims {
    exp: Option<u64>,
}

fn jwt_expiry(token: &str) -> Option<u64> {
    let mut segments = token.split('.');
    let (_header, payload, _signature) = (segments.next()?, segments.next()?, segments.next()?);
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    serde_json::from_slice::<Claims>(&bytes).ok()?.exp
}

pub trait TokenStore: Send + Sync {
    fn get(&self) -> Option<TokenPair>;
    fn set(&self, pair: TokenPair);
    fn clear(&self);
}

#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    pair: Mutex<Option<TokenPair>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pair(pair: TokenPair) -> Self {
        Self {
            pair: Mutex::new(Some(pair)),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self) -> Option<TokenPair> {
        self.pair.lock().clone()
    }

    fn set(&self, pair: TokenPair) {
        *self.pair.lock() = Some(pair);
    }

    fn clear(&self) {
        *self.pair.lock() = None;
    }
}

#[derive(Debug)]
enum Slot {
    Unloaded,
    Loaded(Option<TokenPair>),
}

/// Token store backed by a JSON file, loaded on first use.
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    slot: Mutex<Slot>,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            slot: Mutex::new(Slot::Unloaded),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Option<TokenPair> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), err = %e, "failed to read token file");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(pair) => Some(pair),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), err = %e, "ignoring malformed token file");
                None
            }
        }
    }

    fn persist(&self, pair: &TokenPair) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec(pair)?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self) -> Option<TokenPair> {
        let mut slot = self.slot.lock();
        if let Slot::Unloaded = *slot {
            *slot = Slot::Loaded(self.load());
        }
        match &*slot {
            Slot::Loaded(pair) => pair.clone(),
            Slot::Unloaded => None,
        }
    }

    fn set(&self, pair: TokenPair) {
        let mut slot = self.slot.lock();
        if let Err(e) = self.persist(&pair) {
            tracing::warn!(path = %self.path.display(), err = %e, "failed to persist tokens");
        }
        *slot = Slot::Loaded(Some(pair));
    }

    fn clear(&self) {
        let mut slot = self.slot.lock();
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.path.display(), err = %e, "failed to remove token file");
            }
        }
        *slot = Slot::Loaded(None);
    }
}
