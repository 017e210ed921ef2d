#![allow(dead_code)]

use std::sync::Arc;

use photo_vault_lib::memory::{InMemoryAssetStore, InMemoryRecordStore};
use photo_vault_lib::service::PhotoService;

pub const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00];
pub const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D];

/// A service wired to in-memory stores, with handles kept for inspection
/// and failure injection.
pub struct Harness {
    pub records: Arc<InMemoryRecordStore>,
    pub assets: Arc<InMemoryAssetStore>,
    pub service: PhotoService,
}

pub fn harness() -> Harness {
    let records = Arc::new(InMemoryRecordStore::new());
    let assets = Arc::new(InMemoryAssetStore::new("https://host"));
    let service = PhotoService::new(records.clone(), assets.clone());
    Harness {
        records,
        assets,
        service,
    }
}
