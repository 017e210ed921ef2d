use crate::models::{NewPhoto, Photo, PhotoChanges};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Database error: {0}")]
    DbError(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Record store lock poisoned")]
    LockPoisoned,
    #[error("Record store unavailable: {0}")]
    Unavailable(String),
}

/// Persistence for photo metadata.
///
/// Implementations own id and timestamp assignment. `update` and `delete`
/// report a missing record through their return value, not an error.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert(&self, photo: NewPhoto) -> Result<Photo, RecordError>;

    async fn find(&self, id: &str) -> Result<Option<Photo>, RecordError>;

    /// All records, newest first.
    async fn list(&self) -> Result<Vec<Photo>, RecordError>;

    async fn update(&self, id: &str, changes: PhotoChanges) -> Result<Option<Photo>, RecordError>;

    async fn delete(&self, id: &str) -> Result<bool, RecordError>;
}

const SELECT_COLUMNS: &str = "id, title, image_url, asset_id, created_at, updated_at";

pub struct SqliteRecordStore {
    pub db_path: Option<PathBuf>,
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRecordStore {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, RecordError> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)?;

        // Optimize for local performance
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        init_schema(&conn)?;

        Ok(SqliteRecordStore {
            db_path: Some(db_path.to_path_buf()),
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Throwaway store for tests and local experiments.
    pub fn in_memory() -> Result<Self, RecordError> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(SqliteRecordStore {
            db_path: None,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Round-trips a trivial query so a broken database fails at startup
    /// rather than on the first request.
    pub fn ping(&self) -> Result<(), RecordError> {
        let conn = self.lock()?;
        conn.query_row("SELECT count(*) FROM photos", [], |_| Ok(()))?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, RecordError> {
        self.conn.lock().map_err(|_| RecordError::LockPoisoned)
    }
}

fn init_schema(conn: &Connection) -> Result<(), RecordError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS photos (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            image_url TEXT NOT NULL,
            asset_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;
    Ok(())
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn photo_from_row(row: &Row<'_>) -> rusqlite::Result<Photo> {
    Ok(Photo {
        id: row.get(0)?,
        title: row.get(1)?,
        image_url: row.get(2)?,
        asset_id: row.get(3)?,
        created_at: parse_timestamp(row, 4)?,
        updated_at: parse_timestamp(row, 5)?,
    })
}

fn find_photo(conn: &Connection, id: &str) -> Result<Option<Photo>, RecordError> {
    let photo = conn
        .query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM photos WHERE id = ?1"),
            [id],
            photo_from_row,
        )
        .optional()?;
    Ok(photo)
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn insert(&self, photo: NewPhoto) -> Result<Photo, RecordError> {
        let conn = self.lock()?;

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let stamp = timestamp(now);

        conn.execute(
            "INSERT INTO photos (id, title, image_url, asset_id, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![&id, &photo.title, &photo.image_url, &photo.asset_id, &stamp],
        )?;

        // Read back so the returned timestamps match their stored precision.
        find_photo(&conn, &id)?.ok_or(RecordError::DbError(rusqlite::Error::QueryReturnedNoRows))
    }

    async fn find(&self, id: &str) -> Result<Option<Photo>, RecordError> {
        let conn = self.lock()?;
        find_photo(&conn, id)
    }

    async fn list(&self) -> Result<Vec<Photo>, RecordError> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM photos ORDER BY created_at DESC, rowid DESC"
        ))?;
        let photo_iter = stmt.query_map([], photo_from_row)?;

        let mut photos = Vec::new();
        for photo in photo_iter {
            photos.push(photo?);
        }
        Ok(photos)
    }

    async fn update(&self, id: &str, changes: PhotoChanges) -> Result<Option<Photo>, RecordError> {
        let conn = self.lock()?;

        let (asset_id, image_url) = match changes.asset {
            Some(asset) => (Some(asset.id), Some(asset.url)),
            None => (None, None),
        };
        let stamp = timestamp(Utc::now());

        // One statement keeps image_url and asset_id from ever disagreeing.
        let updated = conn.execute(
            "UPDATE photos SET
                title = COALESCE(?1, title),
                image_url = COALESCE(?2, image_url),
                asset_id = COALESCE(?3, asset_id),
                updated_at = ?4
             WHERE id = ?5",
            params![changes.title, image_url, asset_id, stamp, id],
        )?;

        if updated == 0 {
            return Ok(None);
        }
        find_photo(&conn, id)
    }

    async fn delete(&self, id: &str) -> Result<bool, RecordError> {
        let conn = self.lock()?;
        let deleted = conn.execute("DELETE FROM photos WHERE id = ?1", [id])?;
        Ok(deleted > 0)
    }
}
