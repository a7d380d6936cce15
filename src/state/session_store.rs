use chrono::{DateTime, TimeDelta, Utc};
use fs2::FileExt;
use futures::stream::{self, BoxStream, StreamExt};
use poise::serenity_prelude::{GuildId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::clock::{SharedClock, SystemClock};
use crate::error::{BotError, Result};

const STORE_VERSION: u32 = 1;

/// Opaque session identifier, also embedded in the verification link
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One verification attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: UserId,
    pub guild_id: GuildId,

    /// Name captured when the session started, for logs only
    pub discord_name: String,

    pub created_at: DateTime<Utc>,

    /// Set by the web page once the emailed code is confirmed
    #[serde(default)]
    pub verified: bool,
}

impl Session {
    /// Whether the session's age at `now` exceeds `age`
    pub fn is_older_than(&self, now: DateTime<Utc>, age: Duration) -> bool {
        let threshold = TimeDelta::from_std(age).unwrap_or(TimeDelta::MAX);
        now.signed_duration_since(self.created_at) > threshold
    }
}

/// On-disk document
#[derive(Debug, Serialize, Deserialize)]
struct SessionFile {
    version: u32,
    sessions: HashMap<SessionId, Session>,
}

impl Default for SessionFile {
    fn default() -> Self {
        Self {
            version: STORE_VERSION,
            sessions: HashMap::new(),
        }
    }
}

/// Totals for the status command
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionCounts {
    pub pending: usize,
    pub verified: usize,
}

/// Point-in-time view over matching sessions, oldest first
pub type SessionStream = BoxStream<'static, (SessionId, Session)>;

/// Exclusive advisory lock on the store's sidecar `.lock` file, released on drop
struct StoreLock {
    file: File,
}

impl StoreLock {
    async fn acquire(path: PathBuf) -> std::io::Result<Self> {
        tokio::task::spawn_blocking(move || -> std::io::Result<Self> {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&path)?;
            FileExt::lock_exclusive(&file)?;
            Ok(Self { file })
        })
        .await
        .map_err(std::io::Error::other)?
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// Durable session store backed by a single JSON document.
///
/// Every call re-reads the document, so records updated by the verification
/// web page (a separate process) are picked up on the next scan.
///
/// Every read-modify-write holds an exclusive `flock` on `<store>.lock`, which
/// any other process writing the document must take as well. Inside one
/// process writers also queue on `write_lock`. Each write lands in a uniquely
/// named temp file that is synced and renamed over the store before the call
/// returns, so readers never need the lock.
pub struct SessionStore {
    path: PathBuf,
    lock_path: PathBuf,
    clock: SharedClock,
    write_lock: tokio::sync::Mutex<()>,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>, clock: SharedClock) -> Self {
        let path = path.into();
        Self {
            lock_path: lock_path_for(&path),
            path,
            clock,
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self::new(path, Arc::new(SystemClock))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sidecar file other writers must `flock` before touching the store
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Start a new unverified session and return its id
    pub async fn create(
        &self,
        user_id: UserId,
        guild_id: GuildId,
        display_name: &str,
    ) -> Result<SessionId> {
        let created_at = self.clock.now();
        let session_id = self
            .update(|file| {
                let mut session_id = SessionId::generate();
                while file.sessions.contains_key(&session_id) {
                    session_id = SessionId::generate();
                }
                file.sessions.insert(
                    session_id.clone(),
                    Session {
                        user_id,
                        guild_id,
                        discord_name: display_name.to_string(),
                        created_at,
                        verified: false,
                    },
                );
                (session_id, true)
            })
            .await?;

        debug!(session_id = %session_id, user_id = %user_id, "Created session");
        Ok(session_id)
    }

    pub async fn get(&self, session_id: &SessionId) -> Result<Option<Session>> {
        let mut file = self.load().await?;
        Ok(file.sessions.remove(session_id))
    }

    /// Flag a session as verified. Returns false if it does not exist.
    pub async fn mark_verified(&self, session_id: &SessionId) -> Result<bool> {
        self.update(|file| match file.sessions.get_mut(session_id) {
            Some(session) => {
                session.verified = true;
                (true, true)
            }
            None => (false, false),
        })
        .await
    }

    /// Remove a session. Deleting an unknown id is not an error.
    pub async fn delete(&self, session_id: &SessionId) -> Result<()> {
        let removed = self
            .update(|file| {
                let removed = file.sessions.remove(session_id).is_some();
                (removed, removed)
            })
            .await?;

        if removed {
            debug!(session_id = %session_id, "Deleted session");
        }
        Ok(())
    }

    /// All sessions older than `age`, verified or not
    pub async fn scan_older_than(&self, age: Duration) -> Result<SessionStream> {
        let now = self.clock.now();
        self.scan_where(move |s| s.is_older_than(now, age)).await
    }

    /// Verified sessions older than `age`
    pub async fn scan_verified_older_than(&self, age: Duration) -> Result<SessionStream> {
        let now = self.clock.now();
        self.scan_where(move |s| s.verified && s.is_older_than(now, age))
            .await
    }

    /// Every verified session regardless of age
    pub async fn scan_verified(&self) -> Result<SessionStream> {
        self.scan_where(|s| s.verified).await
    }

    pub async fn counts(&self) -> Result<SessionCounts> {
        let file = self.load().await?;
        let verified = file.sessions.values().filter(|s| s.verified).count();
        Ok(SessionCounts {
            pending: file.sessions.len() - verified,
            verified,
        })
    }

    async fn scan_where<F>(&self, keep: F) -> Result<SessionStream>
    where
        F: Fn(&Session) -> bool,
    {
        let file = self.load().await?;
        let mut snapshot: Vec<(SessionId, Session)> = file
            .sessions
            .into_iter()
            .filter(|(_, session)| keep(session))
            .collect();
        snapshot.sort_by(|a, b| a.1.created_at.cmp(&b.1.created_at).then_with(|| a.0.cmp(&b.0)));

        Ok(stream::iter(snapshot).boxed())
    }

    /// Locked read-modify-write. `change` returns its result and whether the
    /// document was modified; unmodified documents are not rewritten.
    async fn update<T, F>(&self, change: F) -> Result<T>
    where
        F: FnOnce(&mut SessionFile) -> (T, bool),
    {
        let _guard = self.write_lock.lock().await;
        self.ensure_parent().await?;
        let _lock = StoreLock::acquire(self.lock_path.clone())
            .await
            .map_err(|source| BotError::StorageWrite {
                path: self.lock_path.display().to_string(),
                source,
            })?;

        let mut file = self.load().await?;
        let (result, changed) = change(&mut file);
        if changed {
            self.save(&file).await?;
        }
        Ok(result)
    }

    async fn ensure_parent(&self) -> Result<()> {
        tokio::fs::create_dir_all(parent_dir(&self.path))
            .await
            .map_err(|source| BotError::StorageWrite {
                path: self.path.display().to_string(),
                source,
            })
    }

    async fn load(&self) -> Result<SessionFile> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(SessionFile::default()),
            Err(e) => {
                return Err(BotError::StorageRead {
                    path: self.path.display().to_string(),
                    source: e,
                })
            }
        };

        serde_json::from_str(&content).map_err(|e| BotError::StorageCorrupt {
            path: self.path.display().to_string(),
            source: e,
        })
    }

    async fn save(&self, file: &SessionFile) -> Result<()> {
        let content = serde_json::to_vec_pretty(file)?;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || replace_file(&path, &content))
            .await
            .map_err(std::io::Error::other)
            .and_then(|written| written)
            .map_err(|source| BotError::StorageWrite {
                path: self.path.display().to_string(),
                source,
            })
    }
}

/// Write to a fresh temp file next to `path`, sync it, then rename it over `path`
fn replace_file(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut temp = tempfile::NamedTempFile::new_in(parent_dir(path))?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn parent_dir(path: &Path) -> &Path {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

fn lock_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| "sessions".into());
    name.push(".lock");
    path.with_file_name(name)
}

pub type SharedSessionStore = Arc<SessionStore>;

pub fn create_shared_session_store(store: SessionStore) -> SharedSessionStore {
    Arc::new(store)
}
