//! Stream credentials.
//!
//! Credentials live in a JSON file keyed by secret name:
//!
//! ```json
//! { "rtspauth": { "username": "admin", "password": "changeme" } }
//! ```
//!
//! The file is watched with `notify`; every reload runs the registered update
//! callbacks so stream URIs can be re-derived.

use async_trait::async_trait;
use futures::future::BoxFuture;
use notify::{Event, EventKind, RecursiveMode, Watcher};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Delay between a change event and the reload, so editors finish writing.
const RELOAD_DEBOUNCE: Duration = Duration::from_millis(500);

/// A username and password pair.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("failed to read secrets: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse secrets: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Source of named credentials.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Credentials stored under `secret_name`, `None` when not configured.
    async fn credentials(&self, secret_name: &str) -> Result<Option<Credentials>, SecretError>;
}

/// Callback run after the secrets changed.
pub type UpdateCallback = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// JSON file backed secret store.
pub struct FileSecretStore {
    path: PathBuf,
    cache: RwLock<HashMap<String, Credentials>>,
    callbacks: Mutex<Vec<UpdateCallback>>,
}

impl FileSecretStore {
    /// Open the store. A missing file is an empty store.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SecretError> {
        let store = Self {
            path: path.as_ref().to_path_buf(),
            cache: RwLock::new(HashMap::new()),
            callbacks: Mutex::new(Vec::new()),
        };
        store.reload()?;
        Ok(store)
    }

    /// Re-read the file into the cache.
    pub fn reload(&self) -> Result<(), SecretError> {
        let secrets = match std::fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => HashMap::new(),
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No secrets file at {}", self.path.display());
                HashMap::new()
            }
            Err(e) => return Err(e.into()),
        };
        info!("Loaded {} secret(s) from {}", secrets.len(), self.path.display());
        *self.cache.write() = secrets;
        Ok(())
    }

    /// Register a callback run after every reload.
    pub fn on_update(&self, callback: UpdateCallback) {
        self.callbacks.lock().push(callback);
    }

    /// Run all update callbacks in registration order.
    pub async fn notify_updated(&self) {
        let callbacks: Vec<UpdateCallback> = self.callbacks.lock().clone();
        for callback in callbacks {
            callback().await;
        }
    }

    /// Watch the secrets file and reload it on change.
    pub fn watch(self: &Arc<Self>) -> anyhow::Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();
        std::fs::create_dir_all(&dir)?;

        info!("Watching secrets file for changes: {}", self.path.display());

        // std::thread::spawn doesn't carry tokio context.
        let rt = tokio::runtime::Handle::current();
        let store = self.clone();
        std::thread::spawn(move || {
            if let Err(e) = store.run_watcher(&dir, rt) {
                error!("Secrets watcher exited with error: {}", e);
            }
        });
        Ok(())
    }

    fn run_watcher(self: Arc<Self>, dir: &Path, rt: tokio::runtime::Handle) -> anyhow::Result<()> {
        let (tx, rx) = mpsc::channel::<notify::Result<Event>>();
        let mut watcher = notify::recommended_watcher(tx)?;
        watcher.watch(dir, RecursiveMode::NonRecursive)?;

        let file_name = self.path.file_name().map(|n| n.to_os_string());

        loop {
            match rx.recv() {
                Ok(Ok(event)) => {
                    let relevant = matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_));
                    let ours = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                    if !(relevant && ours) {
                        continue;
                    }

                    std::thread::sleep(RELOAD_DEBOUNCE);
                    while rx.try_recv().is_ok() {}

                    match self.reload() {
                        Ok(()) => {
                            let store = self.clone();
                            rt.spawn(async move { store.notify_updated().await });
                        }
                        Err(e) => warn!("Failed to reload secrets (keeping old values): {}", e),
                    }
                }
                Ok(Err(e)) => warn!("Secrets watcher error: {}", e),
                Err(e) => {
                    error!("Secrets watcher channel closed: {}", e);
                    break;
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl SecretStore for FileSecretStore {
    async fn credentials(&self, secret_name: &str) -> Result<Option<Credentials>, SecretError> {
        Ok(self.cache.read().get(secret_name).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = FileSecretStore::open(dir.path().join("secrets.json")).unwrap();
        assert_eq!(store.credentials("rtspauth").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_reload_and_callbacks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("secrets.json");
        std::fs::write(&path, r#"{"rtspauth":{"username":"alice","password":"one"}}"#).unwrap();

        let store = FileSecretStore::open(&path).unwrap();
        assert_eq!(
            store.credentials("rtspauth").await.unwrap(),
            Some(Credentials::new("alice", "one"))
        );

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        store.on_update(Arc::new(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
            .boxed()
        }));

        std::fs::write(&path, r#"{"rtspauth":{"username":"alice","password":"two"}}"#).unwrap();
        store.reload().unwrap();
        store.notify_updated().await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            store.credentials("rtspauth").await.unwrap().unwrap().password,
            "two"
        );
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("secrets.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            FileSecretStore::open(&path),
            Err(SecretError::Parse(_))
        ));
    }

    #[test]
    fn test_debug_hides_password() {
        let creds = Credentials::new("alice", "secret");
        assert!(!format!("{:?}", creds).contains("secret"));
    }
}
