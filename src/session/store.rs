//! SP session store backed by redb embedded database.
//!
//! Sessions are written once at SSO time and read back by the post-login
//! hook. Live sessions are mirrored in memory; values are MessagePack.

use anyhow::{Context, Result};
use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};
use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;
use tracing::{debug, warn};

use super::types::{SessionId, SpSession};

/// Key: hex session id.
const SP_SESSIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("saml_sp_sessions");

const DEFAULT_MAX_CACHE_SIZE: usize = 10_000;

pub struct SessionStore {
    db: Database,
    cache: RwLock<HashMap<SessionId, SpSession>>,
    default_ttl_secs: u64,
    max_cache_size: usize,
}

impl SessionStore {
    /// Open the database at `path`, creating it and its parent directory
    /// when missing, and warm the cache with every live session.
    pub fn open(path: impl AsRef<Path>, default_ttl_secs: u64) -> Result<Self> {
        let path = path.as_ref();
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create session store directory {:?}", dir))?;
        }

        let db = Database::create(path)
            .with_context(|| format!("Failed to open session database {:?}", path))?;

        let txn = db.begin_write()?;
        txn.open_table(SP_SESSIONS)?;
        txn.commit()?;

        let store = Self {
            db,
            cache: RwLock::new(HashMap::new()),
            default_ttl_secs,
            max_cache_size: DEFAULT_MAX_CACHE_SIZE,
        };

        let live: Vec<SpSession> = store
            .scan()?
            .into_iter()
            .filter_map(|(_, decoded)| decoded.ok())
            .filter(|session| !session.is_expired())
            .collect();
        debug!(sessions = live.len(), "Warmed SP session cache");
        for session in live {
            store.cache_put(session);
        }

        Ok(store)
    }

    pub fn default_ttl_secs(&self) -> u64 {
        self.default_ttl_secs
    }

    pub fn create(&self, session: SpSession) -> Result<SessionId> {
        let id = session.id;
        self.write(&session)?;
        self.cache_put(session);

        debug!(session_id = %id, "SP session stored");
        Ok(id)
    }

    /// Fetch a live session and bump its access time.
    ///
    /// Expired rows read as `None`; the cleanup task removes them.
    pub fn get(&self, id: SessionId) -> Result<Option<SpSession>> {
        let cached = self
            .cache
            .read()
            .ok()
            .and_then(|cache| cache.get(&id).cloned());

        let session = match cached {
            Some(session) => Some(session),
            None => self.read(id)?,
        };

        let Some(mut session) = session.filter(|s| !s.is_expired()) else {
            self.cache_drop(id);
            return Ok(None);
        };

        session.touch();
        if let Err(e) = self.write(&session) {
            warn!(session_id = %id, error = %e, "Failed to record session access");
        }
        self.cache_put(session.clone());

        Ok(Some(session))
    }

    pub fn delete(&self, id: SessionId) -> Result<bool> {
        self.cache_drop(id);

        let txn = self.db.begin_write()?;
        let existed = txn
            .open_table(SP_SESSIONS)?
            .remove(id.to_hex().as_str())?
            .is_some();
        txn.commit()?;

        Ok(existed)
    }

    /// Remove expired and undecodable rows. Returns how many were removed.
    pub fn evict_expired(&self) -> Result<usize> {
        if let Ok(mut cache) = self.cache.write() {
            cache.retain(|_, session| !session.is_expired());
        }

        let doomed: Vec<String> = self
            .scan()?
            .into_iter()
            .filter_map(|(key, decoded)| match decoded {
                Ok(session) if !session.is_expired() => None,
                Ok(_) => Some(key),
                Err(e) => {
                    warn!(key = %key, error = %e, "Dropping undecodable SP session");
                    Some(key)
                }
            })
            .collect();

        if doomed.is_empty() {
            return Ok(0);
        }

        let txn = self.db.begin_write()?;
        let mut removed = 0;
        {
            let mut table = txn.open_table(SP_SESSIONS)?;
            for key in &doomed {
                if table.remove(key.as_str())?.is_some() {
                    removed += 1;
                }
            }
        }
        txn.commit()?;

        Ok(removed)
    }

    /// Stored rows, expired ones included.
    pub fn session_count(&self) -> Result<usize> {
        let txn = self.db.begin_read()?;
        let rows = txn.open_table(SP_SESSIONS)?.len()?;
        Ok(rows as usize)
    }

    fn read(&self, id: SessionId) -> Result<Option<SpSession>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(SP_SESSIONS)?;
        let key = id.to_hex();
        let row = table.get(key.as_str())?;
        let session = match row {
            Some(bytes) => Some(
                rmp_serde::from_slice(bytes.value())
                    .with_context(|| format!("Corrupt SP session {}", key))?,
            ),
            None => None,
        };
        Ok(session)
    }

    fn write(&self, session: &SpSession) -> Result<()> {
        let bytes = rmp_serde::to_vec(session).context("Failed to encode SP session")?;
        let txn = self.db.begin_write()?;
        txn.open_table(SP_SESSIONS)?
            .insert(session.id.to_hex().as_str(), bytes.as_slice())?;
        txn.commit()?;
        Ok(())
    }

    /// Every row with its decode result.
    fn scan(&self) -> Result<Vec<(String, Result<SpSession, rmp_serde::decode::Error>)>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(SP_SESSIONS)?;
        let mut rows = Vec::new();
        for entry in table.iter()? {
            let (key, value) = entry?;
            rows.push((key.value().to_string(), rmp_serde::from_slice(value.value())));
        }
        Ok(rows)
    }

    /// Insert into the cache, evicting the least recently accessed entry when full.
    fn cache_put(&self, session: SpSession) {
        let Ok(mut cache) = self.cache.write() else {
            return;
        };
        if cache.len() >= self.max_cache_size && !cache.contains_key(&session.id) {
            let stalest = cache
                .values()
                .min_by_key(|s| s.last_accessed)
                .map(|s| s.id);
            if let Some(stalest) = stalest {
                cache.remove(&stalest);
            }
        }
        cache.insert(session.id, session);
    }

    fn cache_drop(&self, id: SessionId) {
        if let Ok(mut cache) = self.cache.write() {
            cache.remove(&id);
        }
    }
}
