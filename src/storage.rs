use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use tokio::{fs, io::AsyncWriteExt};
use tracing::{debug, warn};

/// Raw blob persistence. Keys are flat file names; policy lives in
/// [`crate::artifacts`].
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Writes `body` under `key` unless the key is already taken.
    /// Returns `false` when it is.
    async fn put_new(&self, key: &str, body: Bytes) -> anyhow::Result<bool>;
    async fn get(&self, key: &str) -> anyhow::Result<Option<Bytes>>;
    async fn list(&self) -> anyhow::Result<Vec<String>>;
    async fn delete(&self, key: &str) -> anyhow::Result<()>;
}

#[derive(Clone, Debug)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    pub async fn new(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .await
            .with_context(|| format!("create upload dir {}", root.display()))?;
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> Option<PathBuf> {
        if !is_safe_key(key) {
            warn!(key, "rejecting unsafe storage key");
            return None;
        }
        Some(self.root.join(key))
    }
}

async fn write_synced(path: &Path, body: &[u8]) -> anyhow::Result<()> {
    let mut file = fs::File::create(path)
        .await
        .with_context(|| format!("create {}", path.display()))?;
    file.write_all(body).await.context("write upload")?;
    file.sync_all().await.context("fsync upload")?;
    Ok(())
}

fn is_safe_key(key: &str) -> bool {
    !key.is_empty()
        && !key.starts_with('.')
        && !key.contains(|c: char| matches!(c, '/' | '\\' | '\0'))
}

#[async_trait]
impl StorageClient for FsStorage {
    async fn put_new(&self, key: &str, body: Bytes) -> anyhow::Result<bool> {
        let target = self
            .path_for(key)
            .ok_or_else(|| anyhow::anyhow!("unsafe storage key {key:?}"))?;
        let partial = self.root.join(format!(".{key}.part"));

        if let Err(e) = write_synced(&partial, &body).await {
            if let Err(rm) = fs::remove_file(&partial).await {
                if rm.kind() != std::io::ErrorKind::NotFound {
                    warn!(error = %rm, path = %partial.display(), "partial upload left behind");
                }
            }
            return Err(e);
        }

        // hard_link refuses to replace an existing name, unlike rename
        let linked = match fs::hard_link(&partial, &target).await {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => false,
            Err(e) => {
                let _ = fs::remove_file(&partial).await;
                return Err(e).with_context(|| format!("link {}", target.display()));
            }
        };
        fs::remove_file(&partial)
            .await
            .with_context(|| format!("remove {}", partial.display()))?;

        debug!(key, size = body.len(), linked, "storage put_new");
        Ok(linked)
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<Bytes>> {
        let Some(path) = self.path_for(key) else {
            return Ok(None);
        };
        match fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("read {}", path.display())),
        }
    }

    async fn list(&self) -> anyhow::Result<Vec<String>> {
        let mut out = Vec::new();
        let mut entries = fs::read_dir(&self.root)
            .await
            .with_context(|| format!("read_dir {}", self.root.display()))?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if is_safe_key(name) {
                    out.push(name.to_string());
                }
            }
        }
        out.sort();
        Ok(out)
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        let Some(path) = self.path_for(key) else {
            return Ok(());
        };
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("remove {}", path.display())),
        }
    }
}
