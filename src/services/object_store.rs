//! Object store access.
//!
//! The engine only needs to list objects under a prefix and, for persisted
//! reports, write one small object. `FsObjectStore` keeps a bucket as a
//! directory tree beneath `base_path/{bucket}/{key}`.

use crate::{
    config::AppConfig,
    errors::{ReconcileError, ReconcileResult},
    models::archive::StoredObject,
};
use async_trait::async_trait;
use bytes::Bytes;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    time::UNIX_EPOCH,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

const MAX_OBJECT_KEY_LEN: usize = 1024;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Bucket or namespace name, used in locators and reports.
    fn bucket(&self) -> &str;

    /// List every entry whose key starts with `prefix`, markers included.
    async fn list(&self, prefix: &str) -> ReconcileResult<Vec<StoredObject>>;

    /// Create or overwrite the object at `key`.
    async fn put(&self, key: &str, body: Bytes) -> ReconcileResult<()>;
}

/// Bucket stored as a plain directory tree.
#[derive(Clone, Debug)]
pub struct FsObjectStore {
    bucket: String,
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(cfg: &AppConfig) -> Self {
        Self {
            bucket: cfg.bucket.clone(),
            root: cfg.storage_dir.join(&cfg.bucket),
        }
    }

    /// Directory holding this bucket's objects.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &str) -> PathBuf {
        let mut path = self.root.clone();
        path.extend(key.split('/'));
        path
    }

    /// Convert a filesystem path under the root back into an object key.
    fn key_for(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let parts = rel
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<Vec<_>>>()?;
        Some(parts.join("/"))
    }
}

/// Rejects keys that could escape the bucket root.
fn ensure_key_safe(key: &str) -> ReconcileResult<()> {
    let bad = key.is_empty()
        || key.len() > MAX_OBJECT_KEY_LEN
        || key.starts_with('/')
        || key.ends_with('/')
        || key.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..")
        || key.bytes().any(|b| b.is_ascii_control() || b == b'\\');
    if bad {
        return Err(ReconcileError::Store(io::Error::new(
            ErrorKind::InvalidInput,
            format!("invalid object key `{key}`"),
        )));
    }
    Ok(())
}

/// Modification time in nanoseconds, used as the generation token.
fn generation_token(meta: &std::fs::Metadata) -> Option<String> {
    let modified = meta.modified().ok()?;
    let nanos = modified.duration_since(UNIX_EPOCH).ok()?.as_nanos();
    Some(nanos.to_string())
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn list(&self, prefix: &str) -> ReconcileResult<Vec<StoredObject>> {
        let mut found = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    debug!("directory {} vanished during listing", dir.display());
                    continue;
                }
                Err(err) => return Err(err.into()),
            };

            let mut saw_child = false;
            while let Some(entry) = entries.next_entry().await? {
                saw_child = true;
                let path = entry.path();
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    pending.push(path);
                    continue;
                }
                if !file_type.is_file() {
                    continue;
                }
                let Some(key) = self.key_for(&path) else {
                    debug!("skipping non-UTF-8 path {}", path.display());
                    continue;
                };
                if !key.starts_with(prefix) || is_temp_file(&key) {
                    continue;
                }
                let generation = entry.metadata().await.ok().and_then(|m| generation_token(&m));
                found.push(StoredObject {
                    path: key,
                    generation,
                    is_marker: false,
                });
            }

            // An empty directory is the on-disk form of a folder marker.
            if !saw_child && dir != self.root {
                if let Some(key) = self.key_for(&dir) {
                    let marker = format!("{key}/");
                    if marker.starts_with(prefix) {
                        found.push(StoredObject {
                            path: marker,
                            generation: None,
                            is_marker: true,
                        });
                    }
                }
            }
        }

        found.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(found)
    }

    async fn put(&self, key: &str, body: Bytes) -> ReconcileResult<()> {
        ensure_key_safe(key)?;
        let file_path = self.object_path(key);
        let parent = file_path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| io::Error::other("object path missing parent directory"))?;
        fs::create_dir_all(&parent).await?;

        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let written = async {
            let mut file = File::create(&tmp_path).await?;
            file.write_all(&body).await?;
            file.flush().await?;
            file.sync_all().await?;
            fs::rename(&tmp_path, &file_path).await
        }
        .await;

        if let Err(err) = written {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(err.into());
        }
        debug!("wrote {} bytes to {}", body.len(), file_path.display());
        Ok(())
    }
}

fn is_temp_file(key: &str) -> bool {
    key.rsplit('/')
        .next()
        .is_some_and(|name| name.starts_with(".tmp-"))
}
