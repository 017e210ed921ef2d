use crate::models::{AssetBlob, StoredAsset};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum AssetError {
    #[error("Asset not found: {0}")]
    NotFound(String),
    #[error("Invalid asset id: {0}")]
    InvalidId(String),
    #[error("Refusing to store an empty asset")]
    Empty,
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Asset host unavailable: {0}")]
    Unavailable(String),
}

/// The media host that keeps image bytes outside the record store.
///
/// An asset id is opaque to callers; it is only ever handed back to the same
/// store for `fetch` or `delete`.
#[async_trait]
pub trait AssetStore: Send + Sync {
    async fn upload(&self, data: Vec<u8>) -> Result<StoredAsset, AssetError>;

    async fn fetch(&self, asset_id: &str) -> Result<AssetBlob, AssetError>;

    /// Fails with `AssetError::NotFound` when nothing is stored under the id.
    async fn delete(&self, asset_id: &str) -> Result<(), AssetError>;
}

/// Guesses the image type from its leading bytes.
///
/// Returns `(mime_type, extension)`.
pub fn sniff_image(data: &[u8]) -> (&'static str, &'static str) {
    match data {
        [0xFF, 0xD8, 0xFF, ..] => ("image/jpeg", "jpg"),
        [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, ..] => ("image/png", "png"),
        [b'G', b'I', b'F', b'8', b'7' | b'9', b'a', ..] => ("image/gif", "gif"),
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => ("image/webp", "webp"),
        [b'B', b'M', ..] => ("image/bmp", "bmp"),
        _ => ("application/octet-stream", "bin"),
    }
}

pub fn mime_for_extension(extension: &str) -> &'static str {
    match extension.to_lowercase().as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        _ => "application/octet-stream",
    }
}

pub fn etag_for(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Filesystem-backed media host.
///
/// Each upload lands in `root` as `<uuid>.<ext>`; that file name is also the
/// asset id, and the asset is reachable at `<public_url>/assets/<asset id>`.
pub struct LocalAssetStore {
    pub root: PathBuf,
    pub public_url: String,
}

impl LocalAssetStore {
    pub fn new(root: impl Into<PathBuf>, public_url: impl Into<String>) -> Result<Self, AssetError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(LocalAssetStore {
            root,
            public_url: public_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn url_for(&self, asset_id: &str) -> String {
        format!("{}/assets/{}", self.public_url, asset_id)
    }

    /// Maps an asset id to its file, rejecting anything this store could not
    /// have issued.
    fn path_for(&self, asset_id: &str) -> Result<PathBuf, AssetError> {
        let invalid = || AssetError::InvalidId(asset_id.to_string());

        let (stem, extension) = asset_id.split_once('.').ok_or_else(invalid)?;
        Uuid::parse_str(stem).map_err(|_| invalid())?;
        if extension.is_empty() || !extension.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(invalid());
        }

        Ok(self.root.join(asset_id))
    }
}

fn not_found_or(asset_id: &str, err: std::io::Error) -> AssetError {
    if err.kind() == ErrorKind::NotFound {
        AssetError::NotFound(asset_id.to_string())
    } else {
        AssetError::IoError(err)
    }
}

#[async_trait]
impl AssetStore for LocalAssetStore {
    async fn upload(&self, data: Vec<u8>) -> Result<StoredAsset, AssetError> {
        if data.is_empty() {
            return Err(AssetError::Empty);
        }

        let (mime_type, extension) = sniff_image(&data);
        let id = format!("{}.{}", Uuid::new_v4(), extension);
        let dest_path = self.root.join(&id);

        let etag = etag_for(&data);
        let size = data.len();
        if let Err(e) = fs::write(&dest_path, data).await {
            // Don't leave a truncated file behind.
            let _ = fs::remove_file(&dest_path).await;
            return Err(e.into());
        }

        tracing::debug!(asset_id = %id, size, mime_type, "stored asset");

        Ok(StoredAsset {
            url: self.url_for(&id),
            id,
            mime_type: mime_type.to_string(),
            etag,
            size,
        })
    }

    async fn fetch(&self, asset_id: &str) -> Result<AssetBlob, AssetError> {
        let path = self.path_for(asset_id)?;
        let data = fs::read(&path)
            .await
            .map_err(|e| not_found_or(asset_id, e))?;

        let extension = Path::new(asset_id)
            .extension()
            .unwrap_or_default()
            .to_string_lossy();

        Ok(AssetBlob {
            mime_type: mime_for_extension(&extension).to_string(),
            etag: etag_for(&data),
            data,
        })
    }

    async fn delete(&self, asset_id: &str) -> Result<(), AssetError> {
        let path = self.path_for(asset_id)?;
        fs::remove_file(&path)
            .await
            .map_err(|e| not_found_or(asset_id, e))?;

        tracing::debug!(asset_id, "deleted asset");
        Ok(())
    }
}
