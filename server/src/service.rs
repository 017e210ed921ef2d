use crate::assets::{AssetError, AssetStore};
use crate::database::{RecordError, RecordStore};
use crate::models::{NewPhoto, Photo, PhotoChanges, PhotoUpdate};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Error, Debug)]
pub enum PhotoError {
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
    #[error("Photo not found: {0}")]
    NotFound(String),
    #[error("Image upload failed: {0}")]
    UploadFailed(#[source] AssetError),
    #[error("Image delete failed: {0}")]
    AssetDeleteFailed(#[source] AssetError),
    #[error("Saving photo failed: {0}")]
    PersistFailed(#[source] RecordError),
    #[error("Reading photos failed: {0}")]
    StoreFailed(#[source] RecordError),
}

#[derive(Default)]
struct RecordLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl RecordLocks {
    async fn acquire(&self, id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            // Entries nobody else holds are stale.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(id.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

pub struct PhotoService {
    records: Arc<dyn RecordStore>,
    assets: Arc<dyn AssetStore>,
    locks: RecordLocks,
}

fn required_title(title: &str) -> Result<String, PhotoError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(PhotoError::ValidationFailed("title must not be empty".into()));
    }
    Ok(title.to_string())
}

fn required_image(image: &[u8]) -> Result<(), PhotoError> {
    if image.is_empty() {
        return Err(PhotoError::ValidationFailed("photo must not be empty".into()));
    }
    Ok(())
}

impl PhotoService {
    pub fn new(records: Arc<dyn RecordStore>, assets: Arc<dyn AssetStore>) -> Self {
        PhotoService {
            records,
            assets,
            locks: RecordLocks::default(),
        }
    }

    pub fn assets(&self) -> &Arc<dyn AssetStore> {
        &self.assets
    }

    // Upload, then insert. A failed insert orphans the new asset.
    pub async fn create(&self, title: &str, image: Vec<u8>) -> Result<Photo, PhotoError> {
        let title = required_title(title)?;
        required_image(&image)?;

        let asset = self
            .assets
            .upload(image)
            .await
            .map_err(PhotoError::UploadFailed)?;

        match self.records.insert(NewPhoto::new(title, &asset)).await {
            Ok(photo) => {
                tracing::info!(photo_id = %photo.id, asset_id = %asset.id, "created photo");
                Ok(photo)
            }
            Err(e) => {
                tracing::warn!(
                    asset_id = %asset.id,
                    error = %e,
                    "photo insert failed after upload; asset is orphaned"
                );
                Err(PhotoError::PersistFailed(e))
            }
        }
    }

    pub async fn list(&self) -> Result<Vec<Photo>, PhotoError> {
        self.records.list().await.map_err(PhotoError::StoreFailed)
    }

    pub async fn get(&self, id: &str) -> Result<Photo, PhotoError> {
        self.records
            .find(id)
            .await
            .map_err(PhotoError::StoreFailed)?
            .ok_or_else(|| PhotoError::NotFound(id.to_string()))
    }

    // Delete the old asset, upload the new one, then write the record. A failed
    // upload leaves the record on a deleted asset; a failed write also orphans
    // the new asset.
    pub async fn update(&self, id: &str, update: PhotoUpdate) -> Result<Photo, PhotoError> {
        let _guard = self.locks.acquire(id).await;
        let photo = self.get(id).await?;

        let title = update.title.as_deref().map(required_title).transpose()?;
        if let Some(image) = &update.image {
            required_image(image)?;
        }

        let Some(image) = update.image else {
            let changes = PhotoChanges { title, asset: None };
            if changes.is_empty() {
                return Ok(photo);
            }
            return self.persist(&photo.id, changes).await;
        };

        self.remove_asset(&photo.asset_id)
            .await
            .map_err(PhotoError::AssetDeleteFailed)?;

        let asset = match self.assets.upload(image).await {
            Ok(asset) => asset,
            Err(e) => {
                tracing::warn!(
                    photo_id = %photo.id,
                    asset_id = %photo.asset_id,
                    error = %e,
                    "replacement upload failed after old asset was deleted; record points at a deleted asset"
                );
                return Err(PhotoError::UploadFailed(e));
            }
        };

        let changes = PhotoChanges {
            title,
            asset: Some(asset.to_ref()),
        };
        match self.persist(&photo.id, changes).await {
            Ok(updated) => {
                tracing::info!(photo_id = %updated.id, asset_id = %asset.id, "replaced photo image");
                Ok(updated)
            }
            Err(e) => {
                tracing::warn!(
                    photo_id = %photo.id,
                    old_asset_id = %photo.asset_id,
                    new_asset_id = %asset.id,
                    "photo update failed after replacing image; new asset is orphaned"
                );
                Err(e)
            }
        }
    }

    // Asset first, then the record. A failed record delete leaves a record
    // whose asset is gone.
    pub async fn delete(&self, id: &str) -> Result<(), PhotoError> {
        let _guard = self.locks.acquire(id).await;
        let photo = self.get(id).await?;

        self.remove_asset(&photo.asset_id)
            .await
            .map_err(PhotoError::AssetDeleteFailed)?;

        match self.records.delete(&photo.id).await {
            Ok(true) => {
                tracing::info!(photo_id = %photo.id, asset_id = %photo.asset_id, "deleted photo");
                Ok(())
            }
            Ok(false) => Err(PhotoError::NotFound(photo.id)),
            Err(e) => {
                tracing::warn!(
                    photo_id = %photo.id,
                    asset_id = %photo.asset_id,
                    error = %e,
                    "photo delete failed after its asset was removed; record is orphaned"
                );
                Err(PhotoError::PersistFailed(e))
            }
        }
    }

    async fn persist(&self, id: &str, changes: PhotoChanges) -> Result<Photo, PhotoError> {
        self.records
            .update(id, changes)
            .await
            .map_err(PhotoError::PersistFailed)?
            .ok_or_else(|| PhotoError::NotFound(id.to_string()))
    }

    async fn remove_asset(&self, asset_id: &str) -> Result<(), AssetError> {
        // Already gone counts as deleted, so a retry after an ambiguous failure converges.
        match self.assets.delete(asset_id).await {
            Err(AssetError::NotFound(_)) => {
                tracing::debug!(asset_id, "asset already absent");
                Ok(())
            }
            other => other,
        }
    }
}
