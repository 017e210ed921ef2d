//! Create/update/delete behaviour of `PhotoService`, including what each
//! partial failure leaves behind in the two stores.

mod support;

use photo_vault_lib::assets::AssetStore;
use photo_vault_lib::models::PhotoUpdate;
use photo_vault_lib::service::PhotoError;

use support::{harness, JPEG, PNG};

// ============================================================================
// Happy paths
// ============================================================================

#[tokio::test]
async fn create_then_read_returns_stored_photo() {
    let h = harness();

    let photo = h.service.create("sunset", JPEG.to_vec()).await.unwrap();
    let read = h.service.get(&photo.id).await.unwrap();

    assert_eq!(read.title, "sunset");
    assert_eq!(read.image_url, photo.image_url);
    assert!(h.assets.serves(&read.image_url));
    assert_eq!(h.assets.fetch(&read.asset_id).await.unwrap().data, JPEG);
}

#[tokio::test]
async fn list_is_empty_for_empty_store() {
    let h = harness();
    assert!(h.service.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn read_unknown_id_is_not_found() {
    let h = harness();
    let err = h.service.get("missing").await.unwrap_err();
    assert!(matches!(err, PhotoError::NotFound(id) if id == "missing"));
}

#[tokio::test]
async fn delete_removes_record_and_asset() {
    let h = harness();
    let photo = h.service.create("sunset", JPEG.to_vec()).await.unwrap();

    h.service.delete(&photo.id).await.unwrap();

    assert!(matches!(
        h.service.get(&photo.id).await,
        Err(PhotoError::NotFound(_))
    ));
    assert!(!h.assets.contains(&photo.asset_id));
    assert!(h.assets.is_empty());
}

#[tokio::test]
async fn delete_twice_reports_not_found_second_time() {
    let h = harness();
    let photo = h.service.create("sunset", JPEG.to_vec()).await.unwrap();

    h.service.delete(&photo.id).await.unwrap();
    let err = h.service.delete(&photo.id).await.unwrap_err();

    assert!(matches!(err, PhotoError::NotFound(_)));
    assert!(h.records.get(&photo.id).is_none());
}

#[tokio::test]
async fn title_only_update_keeps_asset() {
    let h = harness();
    let photo = h.service.create("sunset", JPEG.to_vec()).await.unwrap();

    let update = PhotoUpdate {
        title: Some("sunset2".into()),
        image: None,
    };
    let updated = h.service.update(&photo.id, update).await.unwrap();

    assert_eq!(updated.id, photo.id);
    assert_eq!(updated.title, "sunset2");
    assert_eq!(updated.image_url, photo.image_url);
    assert_eq!(updated.asset_id, photo.asset_id);
    assert!(h.assets.contains(&photo.asset_id));
    assert_eq!(h.assets.len(), 1);
}

#[tokio::test]
async fn image_update_replaces_asset_without_orphans() {
    let h = harness();
    let photo = h.service.create("sunset", JPEG.to_vec()).await.unwrap();

    let update = PhotoUpdate {
        title: None,
        image: Some(PNG.to_vec()),
    };
    let updated = h.service.update(&photo.id, update).await.unwrap();

    assert_eq!(updated.title, "sunset");
    assert_ne!(updated.image_url, photo.image_url);
    assert_ne!(updated.asset_id, photo.asset_id);
    assert!(!h.assets.contains(&photo.asset_id));
    assert!(h.assets.serves(&updated.image_url));
    assert_eq!(h.assets.len(), 1);
    assert_eq!(h.records.get(&photo.id).unwrap(), updated);
}

#[tokio::test]
async fn update_with_title_and_image_applies_both() {
    let h = harness();
    let photo = h.service.create("sunset", JPEG.to_vec()).await.unwrap();

    let update = PhotoUpdate {
        title: Some("dusk".into()),
        image: Some(PNG.to_vec()),
    };
    let updated = h.service.update(&photo.id, update).await.unwrap();

    assert_eq!(updated.title, "dusk");
    assert!(updated.image_url.ends_with(".png"));
}

#[tokio::test]
async fn empty_update_returns_record_unchanged() {
    let h = harness();
    let photo = h.service.create("sunset", JPEG.to_vec()).await.unwrap();

    let same = h
        .service
        .update(&photo.id, PhotoUpdate::default())
        .await
        .unwrap();
    assert_eq!(same, photo);
}

#[tokio::test]
async fn update_unknown_id_is_not_found() {
    let h = harness();
    let update = PhotoUpdate {
        title: Some("x".into()),
        image: Some(JPEG.to_vec()),
    };
    let err = h.service.update("missing", update).await.unwrap_err();

    assert!(matches!(err, PhotoError::NotFound(_)));
    assert!(h.assets.is_empty());
}

#[tokio::test]
async fn update_unknown_id_with_invalid_fields_is_not_found() {
    let h = harness();

    let blank = PhotoUpdate {
        title: Some("  ".into()),
        image: None,
    };
    assert!(matches!(
        h.service.update("missing", blank).await,
        Err(PhotoError::NotFound(_))
    ));

    let empty = PhotoUpdate {
        title: None,
        image: Some(Vec::new()),
    };
    assert!(matches!(
        h.service.update("missing", empty).await,
        Err(PhotoError::NotFound(_))
    ));
}

#[tokio::test]
async fn update_rejects_blank_title_and_empty_image() {
    let h = harness();
    let photo = h.service.create("sunset", JPEG.to_vec()).await.unwrap();

    let blank = PhotoUpdate {
        title: Some("  ".into()),
        image: None,
    };
    assert!(matches!(
        h.service.update(&photo.id, blank).await,
        Err(PhotoError::ValidationFailed(_))
    ));

    let empty = PhotoUpdate {
        title: None,
        image: Some(Vec::new()),
    };
    assert!(matches!(
        h.service.update(&photo.id, empty).await,
        Err(PhotoError::ValidationFailed(_))
    ));
    assert!(h.assets.contains(&photo.asset_id));
}

#[tokio::test]
async fn sunset_scenario() {
    let h = harness();

    let photo = h.service.create("sunset", JPEG.to_vec()).await.unwrap();
    assert_eq!(photo.id, "p1");
    assert_eq!(photo.title, "sunset");
    assert_eq!(photo.image_url, "https://host/a1.jpg");

    let listed = h.service.list().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, "p1");

    let update = PhotoUpdate {
        title: Some("sunset2".into()),
        image: None,
    };
    let updated = h.service.update("p1", update).await.unwrap();
    assert_eq!(updated.id, "p1");
    assert_eq!(updated.title, "sunset2");
    assert_eq!(updated.image_url, "https://host/a1.jpg");

    h.service.delete("p1").await.unwrap();
    assert!(matches!(
        h.service.get("p1").await,
        Err(PhotoError::NotFound(_))
    ));
}

// ============================================================================
// Failure windows
// ============================================================================

#[tokio::test]
async fn failed_upload_on_create_leaves_no_record() {
    let h = harness();
    h.assets.fail_uploads(true);

    let err = h.service.create("sunset", JPEG.to_vec()).await.unwrap_err();

    assert!(matches!(err, PhotoError::UploadFailed(_)));
    assert!(h.records.is_empty());
    assert!(h.assets.is_empty());
}

#[tokio::test]
async fn failed_insert_on_create_orphans_the_upload() {
    let h = harness();
    h.records.fail_inserts(true);

    let err = h.service.create("sunset", JPEG.to_vec()).await.unwrap_err();

    assert!(matches!(err, PhotoError::PersistFailed(_)));
    assert!(h.records.is_empty());
    // No rollback: the uploaded asset stays behind, unreferenced.
    assert_eq!(h.assets.len(), 1);
    assert!(h.assets.contains("a1.jpg"));
}

#[tokio::test]
async fn failed_old_asset_delete_aborts_update() {
    let h = harness();
    let photo = h.service.create("sunset", JPEG.to_vec()).await.unwrap();
    h.assets.fail_deletes(true);

    let update = PhotoUpdate {
        title: Some("dusk".into()),
        image: Some(PNG.to_vec()),
    };
    let err = h.service.update(&photo.id, update).await.unwrap_err();

    assert!(matches!(err, PhotoError::AssetDeleteFailed(_)));
    assert_eq!(h.records.get(&photo.id).unwrap(), photo);
    assert!(h.assets.contains(&photo.asset_id));
    assert_eq!(h.assets.len(), 1);
}

#[tokio::test]
async fn failed_replacement_upload_leaves_record_on_deleted_asset() {
    let h = harness();
    let photo = h.service.create("sunset", JPEG.to_vec()).await.unwrap();
    h.assets.fail_uploads(true);

    let update = PhotoUpdate {
        title: None,
        image: Some(PNG.to_vec()),
    };
    let err = h.service.update(&photo.id, update).await.unwrap_err();

    assert!(matches!(err, PhotoError::UploadFailed(_)));
    let stored = h.records.get(&photo.id).unwrap();
    assert_eq!(stored.asset_id, photo.asset_id);
    assert!(!h.assets.contains(&stored.asset_id));
}

#[tokio::test]
async fn failed_persist_after_replacement_orphans_new_asset() {
    let h = harness();
    let photo = h.service.create("sunset", JPEG.to_vec()).await.unwrap();
    h.records.fail_updates(true);

    let update = PhotoUpdate {
        title: None,
        image: Some(PNG.to_vec()),
    };
    let err = h.service.update(&photo.id, update).await.unwrap_err();

    assert!(matches!(err, PhotoError::PersistFailed(_)));
    let stored = h.records.get(&photo.id).unwrap();
    assert_eq!(stored.asset_id, photo.asset_id);
    assert!(!h.assets.contains(&photo.asset_id));
    assert!(h.assets.contains("a2.png"));
}

#[tokio::test]
async fn failed_asset_delete_keeps_record() {
    let h = harness();
    let photo = h.service.create("sunset", JPEG.to_vec()).await.unwrap();
    h.assets.fail_deletes(true);

    let err = h.service.delete(&photo.id).await.unwrap_err();

    assert!(matches!(err, PhotoError::AssetDeleteFailed(_)));
    assert!(h.records.get(&photo.id).is_some());
    assert!(h.assets.contains(&photo.asset_id));
}

#[tokio::test]
async fn failed_record_delete_orphans_the_record() {
    let h = harness();
    let photo = h.service.create("sunset", JPEG.to_vec()).await.unwrap();
    h.records.fail_deletes(true);

    let err = h.service.delete(&photo.id).await.unwrap_err();

    assert!(matches!(err, PhotoError::PersistFailed(_)));
    assert!(h.records.get(&photo.id).is_some());
    assert!(!h.assets.contains(&photo.asset_id));

    // Retrying once the store recovers converges on the deleted state.
    h.records.fail_deletes(false);
    h.service.delete(&photo.id).await.unwrap();
    assert!(h.records.get(&photo.id).is_none());
}

#[tokio::test]
async fn asset_missing_on_delete_counts_as_deleted() {
    let h = harness();
    let photo = h.service.create("sunset", JPEG.to_vec()).await.unwrap();
    assert!(h.assets.evict(&photo.asset_id));

    h.service.delete(&photo.id).await.unwrap();
    assert!(h.records.is_empty());
}

#[tokio::test]
async fn read_failures_surface_as_store_errors() {
    let h = harness();
    h.records.fail_reads(true);

    assert!(matches!(
        h.service.list().await,
        Err(PhotoError::StoreFailed(_))
    ));
    assert!(matches!(
        h.service.get("p1").await,
        Err(PhotoError::StoreFailed(_))
    ));
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_deletes_of_one_photo_have_one_winner() {
    let h = std::sync::Arc::new(harness());
    let photo = h.service.create("sunset", JPEG.to_vec()).await.unwrap();

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let h = h.clone();
        let id = photo.id.clone();
        tasks.push(tokio::spawn(async move { h.service.delete(&id).await }));
    }

    let mut deleted = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(()) => deleted += 1,
            Err(PhotoError::NotFound(_)) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(deleted, 1);
    assert!(h.records.is_empty());
    assert!(h.assets.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_image_updates_leave_exactly_one_asset() {
    let h = std::sync::Arc::new(harness());
    let photo = h.service.create("sunset", JPEG.to_vec()).await.unwrap();

    let mut tasks = Vec::new();
    for i in 0..8 {
        let h = h.clone();
        let id = photo.id.clone();
        tasks.push(tokio::spawn(async move {
            let update = PhotoUpdate {
                title: Some(format!("take {i}")),
                image: Some(PNG.to_vec()),
            };
            h.service.update(&id, update).await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let stored = h.records.get(&photo.id).unwrap();
    assert_eq!(h.assets.len(), 1);
    assert!(h.assets.contains(&stored.asset_id));
}
