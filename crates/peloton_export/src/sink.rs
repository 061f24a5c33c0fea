//! Destinations for finished TCX documents.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::ExportError;
use crate::filename::sanitize;

/// Where exported documents end up.
///
/// Implementations are shared across concurrent workers and must be safe for
/// concurrent use.
#[async_trait]
pub trait Sink: Send + Sync + 'static {
    async fn write(&self, name: &str, content: &[u8]) -> Result<(), ExportError>;

    /// Human-readable location, e.g. a directory or `gs://bucket/prefix`.
    fn location(&self) -> String;
}

/// Names must be a single path component.
pub(crate) fn check_name(name: &str) -> Result<(), ExportError> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(ExportError::Write(format!("invalid object name: {name:?}")));
    }
    Ok(())
}

/// Directory component for a user, derived from their login.
pub fn user_component(user: &str) -> String {
    let cleaned = sanitize(user.replace('"', "").trim());
    match cleaned.as_str() {
        "" | "." | ".." => "default".to_string(),
        _ => cleaned,
    }
}

/// Writes each document to `<dir>/<name>`.
#[derive(Clone, Debug)]
pub struct LocalDirSink {
    dir: PathBuf,
}

impl LocalDirSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Per-user directory below `base`.
    pub fn for_user(base: impl AsRef<Path>, user: &str) -> Self {
        Self::new(base.as_ref().join(user_component(user)))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl Sink for LocalDirSink {
    async fn write(&self, name: &str, content: &[u8]) -> Result<(), ExportError> {
        check_name(name)?;
        let io_err = |e: std::io::Error| ExportError::Write(format!("{}: {e}", self.dir.display()));

        tokio::fs::create_dir_all(&self.dir).await.map_err(io_err)?;
        let target = self.dir.join(name);
        // write then rename so readers never observe a partial file
        let partial = self.dir.join(format!(".{name}.partial"));
        let mut file = tokio::fs::File::create(&partial).await.map_err(io_err)?;
        file.write_all(content).await.map_err(io_err)?;
        file.sync_all().await.map_err(io_err)?;
        drop(file);
        tokio::fs::rename(&partial, &target).await.map_err(io_err)?;

        tracing::debug!(path = %target.display(), bytes = content.len(), "wrote file");
        Ok(())
    }

    fn location(&self) -> String {
        self.dir.display().to_string()
    }
}

/// Keeps documents in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, name: &str) -> Option<Vec<u8>> {
        self.files.lock().await.get(name).cloned()
    }

    pub async fn len(&self) -> usize {
        self.files.lock().await.len()
    }
}

#[async_trait]
impl Sink for MemorySink {
    async fn write(&self, name: &str, content: &[u8]) -> Result<(), ExportError> {
        check_name(name)?;
        self.files
            .lock()
            .await
            .insert(name.to_string(), content.to_vec());
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}
