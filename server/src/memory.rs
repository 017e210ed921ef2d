use crate::assets::{etag_for, sniff_image, AssetError, AssetStore};
use crate::database::{RecordError, RecordStore};
use crate::models::{AssetBlob, NewPhoto, Photo, PhotoChanges, StoredAsset};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;

#[derive(Default)]
struct FailSwitch(AtomicBool);

impl FailSwitch {
    fn set(&self, fail: bool) {
        self.0.store(fail, Ordering::SeqCst);
    }

    fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

struct StoredRecord {
    seq: u64,
    photo: Photo,
}

// Ids are handed out as p1, p2, ...
#[derive(Default)]
pub struct InMemoryRecordStore {
    records: RwLock<HashMap<String, StoredRecord>>,
    seq: AtomicU64,
    fail_reads: FailSwitch,
    fail_inserts: FailSwitch,
    fail_updates: FailSwitch,
    fail_deletes: FailSwitch,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.set(fail);
    }

    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.set(fail);
    }

    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.set(fail);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.set(fail);
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Bypasses injected failures.
    pub fn get(&self, id: &str) -> Option<Photo> {
        self.records
            .read()
            .ok()
            .and_then(|r| r.get(id).map(|stored| stored.photo.clone()))
    }
}

fn injected(op: &str) -> RecordError {
    RecordError::Unavailable(format!("injected {op} failure"))
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn insert(&self, photo: NewPhoto) -> Result<Photo, RecordError> {
        if self.fail_inserts.is_set() {
            return Err(injected("insert"));
        }

        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let now = Utc::now();
        let stored = Photo {
            id: format!("p{seq}"),
            title: photo.title,
            image_url: photo.image_url,
            asset_id: photo.asset_id,
            created_at: now,
            updated_at: now,
        };

        let mut records = self.records.write().map_err(|_| RecordError::LockPoisoned)?;
        records.insert(
            stored.id.clone(),
            StoredRecord {
                seq,
                photo: stored.clone(),
            },
        );
        Ok(stored)
    }

    async fn find(&self, id: &str) -> Result<Option<Photo>, RecordError> {
        if self.fail_reads.is_set() {
            return Err(injected("read"));
        }
        let records = self.records.read().map_err(|_| RecordError::LockPoisoned)?;
        Ok(records.get(id).map(|stored| stored.photo.clone()))
    }

    async fn list(&self) -> Result<Vec<Photo>, RecordError> {
        if self.fail_reads.is_set() {
            return Err(injected("read"));
        }
        let records = self.records.read().map_err(|_| RecordError::LockPoisoned)?;

        let mut stored: Vec<&StoredRecord> = records.values().collect();
        stored.sort_by(|a, b| {
            b.photo
                .created_at
                .cmp(&a.photo.created_at)
                .then(b.seq.cmp(&a.seq))
        });
        Ok(stored.into_iter().map(|s| s.photo.clone()).collect())
    }

    async fn update(&self, id: &str, changes: PhotoChanges) -> Result<Option<Photo>, RecordError> {
        if self.fail_updates.is_set() {
            return Err(injected("update"));
        }
        let mut records = self.records.write().map_err(|_| RecordError::LockPoisoned)?;

        let Some(stored) = records.get_mut(id) else {
            return Ok(None);
        };
        let photo = &mut stored.photo;
        if let Some(title) = changes.title {
            photo.title = title;
        }
        if let Some(asset) = changes.asset {
            photo.asset_id = asset.id;
            photo.image_url = asset.url;
        }
        photo.updated_at = Utc::now();
        Ok(Some(photo.clone()))
    }

    async fn delete(&self, id: &str) -> Result<bool, RecordError> {
        if self.fail_deletes.is_set() {
            return Err(injected("delete"));
        }
        let mut records = self.records.write().map_err(|_| RecordError::LockPoisoned)?;
        Ok(records.remove(id).is_some())
    }
}

// Assets get ids a1.<ext>, a2.<ext>, ... served under base_url.
pub struct InMemoryAssetStore {
    base_url: String,
    assets: RwLock<HashMap<String, AssetBlob>>,
    seq: AtomicU64,
    fail_uploads: FailSwitch,
    fail_deletes: FailSwitch,
}

impl Default for InMemoryAssetStore {
    fn default() -> Self {
        Self::new("https://host")
    }
}

impl InMemoryAssetStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        InMemoryAssetStore {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            assets: RwLock::new(HashMap::new()),
            seq: AtomicU64::new(0),
            fail_uploads: FailSwitch::default(),
            fail_deletes: FailSwitch::default(),
        }
    }

    pub fn fail_uploads(&self, fail: bool) {
        self.fail_uploads.set(fail);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.set(fail);
    }

    pub fn contains(&self, asset_id: &str) -> bool {
        self.assets
            .read()
            .map(|a| a.contains_key(asset_id))
            .unwrap_or(false)
    }

    pub fn serves(&self, url: &str) -> bool {
        url.strip_prefix(&format!("{}/", self.base_url))
            .is_some_and(|asset_id| self.contains(asset_id))
    }

    pub fn len(&self) -> usize {
        self.assets.read().map(|a| a.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn evict(&self, asset_id: &str) -> bool {
        self.assets
            .write()
            .map(|mut a| a.remove(asset_id).is_some())
            .unwrap_or(false)
    }
}

#[async_trait]
impl AssetStore for InMemoryAssetStore {
    async fn upload(&self, data: Vec<u8>) -> Result<StoredAsset, AssetError> {
        if self.fail_uploads.is_set() {
            return Err(AssetError::Unavailable("injected upload failure".into()));
        }
        if data.is_empty() {
            return Err(AssetError::Empty);
        }

        let (mime_type, extension) = sniff_image(&data);
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("a{seq}.{extension}");
        let blob = AssetBlob {
            mime_type: mime_type.to_string(),
            etag: etag_for(&data),
            data,
        };
        let asset = StoredAsset {
            url: format!("{}/{}", self.base_url, id),
            id: id.clone(),
            mime_type: blob.mime_type.clone(),
            etag: blob.etag.clone(),
            size: blob.data.len(),
        };

        let mut assets = self
            .assets
            .write()
            .map_err(|_| AssetError::Unavailable("lock poisoned".into()))?;
        assets.insert(id, blob);
        Ok(asset)
    }

    async fn fetch(&self, asset_id: &str) -> Result<AssetBlob, AssetError> {
        let assets = self
            .assets
            .read()
            .map_err(|_| AssetError::Unavailable("lock poisoned".into()))?;
        assets
            .get(asset_id)
            .cloned()
            .ok_or_else(|| AssetError::NotFound(asset_id.to_string()))
    }

    async fn delete(&self, asset_id: &str) -> Result<(), AssetError> {
        if self.fail_deletes.is_set() {
            return Err(AssetError::Unavailable("injected delete failure".into()));
        }
        let mut assets = self
            .assets
            .write()
            .map_err(|_| AssetError::Unavailable("lock poisoned".into()))?;
        assets
            .remove(asset_id)
            .map(|_| ())
            .ok_or_else(|| AssetError::NotFound(asset_id.to_string()))
    }
}
