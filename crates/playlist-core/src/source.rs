//! Collaborators at the edge of the pipeline
//!
//! Where bytes come from ([`SourceResolver`]), where finished output goes
//! ([`ByteSink`]), and the auth [`Session`] handed to both. Remote
//! implementations live outside this crate; the file-backed ones here serve
//! the CLI and tests.

use crate::error::PlaylistError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Opaque identifier of a playlist document (cloud file id or local name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Access token with an expiry, passed explicitly to every collaborator call.
#[derive(Clone)]
pub struct Session {
    token: String,
    expires_at: DateTime<Utc>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl Session {
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    /// Session valid for `ttl` from now.
    pub fn with_ttl(token: impl Into<String>, ttl: Duration) -> Self {
        Self::new(token, Utc::now() + ttl)
    }

    /// Session for purely local work that never expires.
    pub fn offline() -> Self {
        Self::new(String::new(), DateTime::<Utc>::MAX_UTC)
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// The token, if the session is still valid at `now`.
    pub fn token_at(&self, now: DateTime<Utc>) -> Result<&str, PlaylistError> {
        if self.is_expired_at(now) {
            return Err(PlaylistError::SessionExpired(self.expires_at));
        }
        Ok(&self.token)
    }

    pub fn token(&self) -> Result<&str, PlaylistError> {
        self.token_at(Utc::now())
    }
}

/// What to do with a finished export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportDecision {
    Cancel,
    Download,
    Upload,
}

#[async_trait]
pub trait SourceResolver: Send + Sync {
    /// Bytes of `id`, from a local store, a cache, or a remote fetch.
    async fn resolve(&self, id: &DocumentId, session: &Session) -> Result<Vec<u8>, PlaylistError>;
}

#[async_trait]
pub trait ByteSink: Send + Sync {
    async fn download(&self, name: &str, bytes: &[u8]) -> Result<(), PlaylistError>;

    async fn upload(
        &self,
        name: &str,
        bytes: &[u8],
        session: &Session,
    ) -> Result<(), PlaylistError>;
}

/// Resolves ids as file names relative to a root directory.
#[derive(Debug, Clone)]
pub struct FileResolver {
    root: PathBuf,
}

impl FileResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl SourceResolver for FileResolver {
    async fn resolve(&self, id: &DocumentId, _session: &Session) -> Result<Vec<u8>, PlaylistError> {
        let path = contained_path(&self.root, id.as_str())?;
        tracing::debug!(path = %path.display(), "reading source");
        Ok(tokio::fs::read(&path).await?)
    }
}

/// Writes downloads into `root` and uploads into `root/uploads`.
#[derive(Debug, Clone)]
pub struct LocalFileSink {
    root: PathBuf,
}

impl LocalFileSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    async fn write(&self, dir: &Path, name: &str, bytes: &[u8]) -> Result<(), PlaylistError> {
        let path = contained_path(dir, name)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        tracing::info!(path = %path.display(), bytes = bytes.len(), "wrote output");
        Ok(())
    }
}

#[async_trait]
impl ByteSink for LocalFileSink {
    async fn download(&self, name: &str, bytes: &[u8]) -> Result<(), PlaylistError> {
        self.write(&self.root, name, bytes).await
    }

    async fn upload(
        &self,
        name: &str,
        bytes: &[u8],
        session: &Session,
    ) -> Result<(), PlaylistError> {
        session.token()?;
        self.write(&self.root.join("uploads"), name, bytes).await
    }
}

/// Join `name` onto `root`, refusing absolute paths and `..` components.
fn contained_path(root: &Path, name: &str) -> Result<PathBuf, PlaylistError> {
    let relative = Path::new(name);
    let escapes = relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if name.is_empty() || escapes {
        return Err(PlaylistError::SinkError(format!("Invalid file name: {}", name)));
    }
    Ok(root.join(relative))
}
