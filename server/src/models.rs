use chrono::{DateTime, Utc};
use serde::Serialize;

/// A stored photo: metadata plus a pointer to its hosted image.
///
/// Serializes to the dashboard's wire shape, `{ _id, title, imageUrl,
/// createdAt, updatedAt }`. The asset handle stays server-side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Photo {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub image_url: String,
    #[serde(skip)]
    pub asset_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for a record that does not exist yet. The store assigns the id and
/// timestamps.
#[derive(Debug, Clone)]
pub struct NewPhoto {
    pub title: String,
    pub image_url: String,
    pub asset_id: String,
}

impl NewPhoto {
    pub fn new(title: impl Into<String>, asset: &StoredAsset) -> Self {
        NewPhoto {
            title: title.into(),
            image_url: asset.url.clone(),
            asset_id: asset.id.clone(),
        }
    }
}

/// A partial update applied by the record store in one write.
///
/// `asset` replaces `image_url` and `asset_id` together.
#[derive(Debug, Clone, Default)]
pub struct PhotoChanges {
    pub title: Option<String>,
    pub asset: Option<AssetRef>,
}

impl PhotoChanges {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.asset.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRef {
    pub id: String,
    pub url: String,
}

/// What the media host reports back after an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAsset {
    pub id: String,
    pub url: String,
    pub mime_type: String,
    pub etag: String,
    pub size: usize,
}

impl StoredAsset {
    pub fn to_ref(&self) -> AssetRef {
        AssetRef {
            id: self.id.clone(),
            url: self.url.clone(),
        }
    }
}

/// Raw asset content as served back to clients.
#[derive(Debug, Clone)]
pub struct AssetBlob {
    pub data: Vec<u8>,
    pub mime_type: String,
    pub etag: String,
}

/// Input to an update. Either field may be absent.
#[derive(Debug, Clone, Default)]
pub struct PhotoUpdate {
    pub title: Option<String>,
    pub image: Option<Vec<u8>>,
}

#[derive(Debug, Serialize)]
pub struct DeletedPhoto {
    pub message: String,
    #[serde(rename = "_id")]
    pub id: String,
}
