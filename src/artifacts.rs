use std::{path::Path, sync::Arc};

use anyhow::Context;
use bytes::Bytes;
use rand::Rng;
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::{error::AppError, storage::StorageClient};

pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
pub const ALLOWED_EXTENSIONS: [&str; 3] = ["pdf", "doc", "docx"];

/// Bounded retries when a generated name is already taken.
const NAME_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredReference {
    pub stored_name: String,
    pub original_name: String,
}

/// Validated document store on top of a [`StorageClient`].
#[derive(Clone)]
pub struct ArtifactStore {
    client: Arc<dyn StorageClient>,
}

impl ArtifactStore {
    pub fn new(client: Arc<dyn StorageClient>) -> Self {
        Self { client }
    }

    /// Checks type and size before touching storage, then writes the bytes
    /// under a fresh name.
    pub async fn accept(
        &self,
        body: Bytes,
        original_name: &str,
    ) -> Result<StoredReference, AppError> {
        let ext = allowed_extension(original_name).ok_or(AppError::UnsupportedType)?;
        if body.len() > MAX_UPLOAD_BYTES {
            return Err(AppError::TooLarge);
        }

        for _ in 0..NAME_ATTEMPTS {
            let stored_name = generate_stored_name(ext);
            let written = self
                .client
                .put_new(&stored_name, body.clone())
                .await
                .with_context(|| format!("store {}", stored_name))?;
            if written {
                debug!(%stored_name, size = body.len(), "document stored");
                return Ok(StoredReference {
                    stored_name,
                    original_name: original_name.to_string(),
                });
            }
            warn!(%stored_name, "generated name collided, retrying");
        }
        Err(anyhow::anyhow!("could not allocate a unique stored name").into())
    }

    pub async fn retrieve(&self, stored_name: &str) -> Result<Bytes, AppError> {
        self.client
            .get(stored_name)
            .await
            .with_context(|| format!("read {}", stored_name))?
            .ok_or(AppError::NotFound("File missing on server"))
    }

    pub async fn list(&self) -> Result<Vec<String>, AppError> {
        Ok(self.client.list().await.context("list documents")?)
    }

    pub async fn remove(&self, stored_name: &str) -> Result<(), AppError> {
        self.client
            .delete(stored_name)
            .await
            .with_context(|| format!("remove {}", stored_name))?;
        Ok(())
    }
}

/// Returns the extension as written in `name` when it is on the allow-list.
fn allowed_extension(name: &str) -> Option<&str> {
    let ext = Path::new(name).extension()?.to_str()?;
    ALLOWED_EXTENSIONS
        .iter()
        .any(|allowed| ext.eq_ignore_ascii_case(allowed))
        .then_some(ext)
}

/// `<unix millis>-<random>.<ext>`
fn generate_stored_name(ext: &str) -> String {
    let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000_000);
    format!("{}-{}.{}", millis, suffix, ext)
}

pub fn content_type_for(stored_name: &str) -> &'static str {
    let ext = Path::new(stored_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("pdf") => "application/pdf",
        Some("doc") => "application/msword",
        Some("docx") => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        _ => "application/octet-stream",
    }
}
