use std::path::{Component, Path, PathBuf};

use chattrix_shared::constants::{
    FOLDER_CHAT_AUDIOS, FOLDER_CHAT_DOCUMENTS, FOLDER_CHAT_IMAGES, FOLDER_CHAT_VIDEOS,
    FOLDER_STATUS,
};
use chattrix_shared::AttachmentKind;
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::ServerError;

const FOLDERS: [&str; 5] = [
    FOLDER_CHAT_IMAGES,
    FOLDER_CHAT_VIDEOS,
    FOLDER_CHAT_AUDIOS,
    FOLDER_CHAT_DOCUMENTS,
    FOLDER_STATUS,
];

/// Verify that a resolved path stays within the expected base directory.
/// Prevents path traversal attacks.
fn ensure_within(base: &Path, target: &Path) -> Result<PathBuf, ServerError> {
    let canonical_base = base.canonicalize().unwrap_or_else(|_| base.to_path_buf());
    let mut resolved = canonical_base.clone();
    for component in target
        .strip_prefix(base)
        .unwrap_or(target)
        .components()
    {
        match component {
            Component::Normal(c) => resolved.push(c),
            Component::ParentDir => {
                return Err(ServerError::InvalidOperation(
                    "Path traversal detected".to_string(),
                ));
            }
            _ => {}
        }
    }
    if !resolved.starts_with(&canonical_base) {
        return Err(ServerError::InvalidOperation(
            "Path traversal detected".to_string(),
        ));
    }
    Ok(resolved)
}

/// Filesystem blob store for chat attachments and status media.
///
/// Blobs live at `<base>/<folder>/<uuid>.<kind>` and are addressed by the URL
/// `<public_base_url>/blob/<folder>/<uuid>.<kind>`.
#[derive(Debug, Clone)]
pub struct BlobStore {
    base_path: PathBuf,
    public_base_url: String,
    max_size: usize,
}

impl BlobStore {
    pub async fn new(
        base_path: PathBuf,
        public_base_url: impl Into<String>,
        max_size: usize,
    ) -> Result<Self, ServerError> {
        for folder in FOLDERS {
            let dir = base_path.join(folder);
            fs::create_dir_all(&dir).await.map_err(|e| {
                ServerError::BlobStorage(format!(
                    "Failed to create blob directory '{}': {}",
                    dir.display(),
                    e
                ))
            })?;
        }

        info!(path = %base_path.display(), "Blob store initialized");

        Ok(Self {
            base_path,
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
            max_size,
        })
    }

    /// Store `data` under `folder` and return its public URL.
    pub async fn upload(
        &self,
        data: &[u8],
        kind: AttachmentKind,
        folder: &str,
    ) -> Result<String, ServerError> {
        if data.is_empty() {
            return Err(ServerError::InvalidOperation("Empty blob".to_string()));
        }
        if data.len() > self.max_size {
            return Err(ServerError::BlobTooLarge {
                size: data.len(),
                max: self.max_size,
            });
        }

        let name = format!("{}.{}", Uuid::new_v4(), kind.as_str());
        let path = self.safe_path(folder, &name)?;

        fs::write(&path, data).await.map_err(|e| {
            ServerError::BlobStorage(format!("Failed to write blob {folder}/{name}: {e}"))
        })?;

        debug!(folder, name = %name, size = data.len(), "Stored blob");
        Ok(format!("{}/blob/{}/{}", self.public_base_url, folder, name))
    }

    pub async fn get(&self, folder: &str, name: &str) -> Result<Vec<u8>, ServerError> {
        let path = self.safe_path(folder, name)?;

        if !path.exists() {
            return Err(ServerError::NotFound(format!("Blob {folder}/{name}")));
        }

        let data = fs::read(&path).await.map_err(|e| {
            ServerError::BlobStorage(format!("Failed to read blob {folder}/{name}: {e}"))
        })?;

        debug!(folder, name, size = data.len(), "Retrieved blob");
        Ok(data)
    }

    /// Delete the blob a URL points to. Callers treat failure as advisory.
    pub async fn delete(&self, url: &str, kind: AttachmentKind) -> Result<(), ServerError> {
        let (folder, name) = self.locate(url)?;
        if !name.ends_with(&format!(".{}", kind.as_str())) {
            return Err(ServerError::InvalidOperation(format!(
                "Blob {name} is not of kind {}",
                kind.as_str()
            )));
        }

        let path = self.safe_path(folder, name)?;
        if !path.exists() {
            return Err(ServerError::NotFound(format!("Blob {folder}/{name}")));
        }

        fs::remove_file(&path).await.map_err(|e| {
            ServerError::BlobStorage(format!("Failed to delete blob {folder}/{name}: {e}"))
        })?;

        debug!(folder, name, "Deleted blob");
        Ok(())
    }

    /// Split one of our URLs into `(folder, name)`.
    fn locate<'a>(&self, url: &'a str) -> Result<(&'a str, &'a str), ServerError> {
        let foreign = || ServerError::InvalidOperation(format!("Not a blob URL: {url}"));

        let rest = url
            .strip_prefix(self.public_base_url.as_str())
            .and_then(|rest| rest.strip_prefix("/blob/"))
            .ok_or_else(foreign)?;
        rest.split_once('/').ok_or_else(foreign)
    }

    /// Safe blob path that validates both segments against traversal.
    fn safe_path(&self, folder: &str, name: &str) -> Result<PathBuf, ServerError> {
        if !FOLDERS.contains(&folder) {
            return Err(ServerError::NotFound(format!("Blob folder {folder}")));
        }
        if name.is_empty() || name.contains('/') || name.contains('\\') || name.contains("..") {
            return Err(ServerError::InvalidOperation(
                "Path traversal detected".to_string(),
            ));
        }
        let target = self.base_path.join(folder).join(name);
        ensure_within(&self.base_path, &target)
    }
}
