//! JSON file persistence for chat history and the admin credential.
//!
//! History is a single pretty-printed JSON array rewritten wholesale on every
//! change. Writes happen while the relay holds its state lock, so they never
//! race each other.

use rand::Rng;
use rand::distr::Alphanumeric;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use hearth_core::ChatEvent;
use hearth_core::Credential;
use hearth_core::credential::InvalidCredential;

/// Length of a generated admin password.
const GENERATED_PASSWORD_LEN: usize = 16;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("io error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Credential(#[from] InvalidCredential),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
    move |source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// The append-only event log, in memory and on disk.
#[derive(Debug)]
pub struct HistoryLog {
    path: PathBuf,
    events: Vec<ChatEvent>,
}

impl HistoryLog {
    /// Load history from `path`. A missing file is an empty log; an unreadable
    /// or corrupt one is logged and also treated as empty.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let events = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<Vec<ChatEvent>>(&bytes) {
                Ok(events) => events,
                Err(e) => {
                    warn!("History file {} is corrupt, starting empty: {e}", path.display());
                    Vec::new()
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                warn!("Could not read history file {}: {e}", path.display());
                Vec::new()
            }
        };
        if !events.is_empty() {
            info!("Loaded {} messages from {}", events.len(), path.display());
        }
        Self { path, events }
    }

    pub fn events(&self) -> &[ChatEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Append in memory, then rewrite the file. The in-memory append stands
    /// even if the write fails.
    pub async fn append(&mut self, event: ChatEvent) -> Result<(), StorageError> {
        self.events.push(event);
        self.persist().await
    }

    /// Truncate to empty, in memory and on disk.
    pub async fn clear(&mut self) -> Result<(), StorageError> {
        self.events.clear();
        self.persist().await
    }

    async fn persist(&self) -> Result<(), StorageError> {
        let json = serde_json::to_vec_pretty(&self.events)?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(io_error(&self.path))
    }
}

/// The obfuscated admin secret, stored as one line of base64.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub async fn load(&self) -> Result<Option<Credential>, StorageError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => Ok(Some(Credential::from_encoded(&text)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&self.path)(e)),
        }
    }

    pub async fn save(&self, credential: &Credential) -> Result<(), StorageError> {
        tokio::fs::write(&self.path, format!("{}\n", credential.encoded()))
            .await
            .map_err(io_error(&self.path))
    }

    /// Resolve the admin credential at startup.
    ///
    /// A stored credential wins. Otherwise the configured password is stored;
    /// failing that, a random one is generated, logged once and stored.
    pub async fn bootstrap(&self, configured: Option<&str>) -> Result<Credential, StorageError> {
        if let Some(stored) = self.load().await? {
            info!("Loaded admin credential from {}", self.path.display());
            return Ok(stored);
        }
        let credential = match configured {
            Some(password) => Credential::from_secret(password),
            None => {
                let password: String = rand::rng()
                    .sample_iter(&Alphanumeric)
                    .take(GENERATED_PASSWORD_LEN)
                    .map(char::from)
                    .collect();
                warn!("No admin password configured. Generated one: {password}");
                Credential::from_secret(&password)
            }
        };
        self.save(&credential).await?;
        info!("Stored admin credential in {}", self.path.display());
        Ok(credential)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(text: &str) -> ChatEvent {
        ChatEvent {
            author: "Bob".to_string(),
            text: text.to_string(),
            color: "#ff0000".to_string(),
            avatar: "B".to_string(),
            timestamp: 1_700_000_000_000,
        }
    }

    #[tokio::test]
    async fn missing_history_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = HistoryLog::load(dir.path().join("none.json")).await;
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn corrupt_history_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        tokio::fs::write(&path, b"{ not json").await.unwrap();
        let log = HistoryLog::load(&path).await;
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn append_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        let mut log = HistoryLog::load(&path).await;
        log.append(event("one")).await.unwrap();
        log.append(event("two")).await.unwrap();

        let reloaded = HistoryLog::load(&path).await;
        assert_eq!(reloaded.events(), &[event("one"), event("two")]);
    }

    #[tokio::test]
    async fn clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        let mut log = HistoryLog::load(&path).await;
        log.append(event("one")).await.unwrap();

        log.clear().await.unwrap();
        log.clear().await.unwrap();
        assert!(log.is_empty());
        assert!(HistoryLog::load(&path).await.is_empty());
        let on_disk = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(on_disk.trim(), "[]");
    }

    #[tokio::test]
    async fn failed_write_keeps_memory_copy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("history.json");
        let mut log = HistoryLog::load(&path).await;
        let err = log.append(event("kept")).await.unwrap_err();
        assert!(matches!(err, StorageError::Io { .. }));
        assert_eq!(log.len(), 1);
    }

    #[tokio::test]
    async fn stored_credential_wins() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("admin.credential"));
        store.save(&Credential::from_secret("stored")).await.unwrap();

        let credential = store.bootstrap(Some("configured")).await.unwrap();
        assert!(credential.matches("stored"));
    }

    #[tokio::test]
    async fn configured_password_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("admin.credential");
        let store = CredentialStore::new(&path);
        let credential = store.bootstrap(Some("configured")).await.unwrap();
        assert!(credential.matches("configured"));

        let on_disk = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(!on_disk.contains("configured"));
        assert_eq!(store.load().await.unwrap(), Some(credential));
    }

    #[tokio::test]
    async fn generated_password_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("admin.credential"));
        let credential = store.bootstrap(None).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(credential));
    }

    #[tokio::test]
    async fn garbage_credential_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("admin.credential");
        tokio::fs::write(&path, "%%%").await.unwrap();
        let err = CredentialStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, StorageError::Credential(_)));
    }
}
