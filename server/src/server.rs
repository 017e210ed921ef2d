use crate::assets::AssetError;
use crate::models::{DeletedPhoto, Photo, PhotoUpdate};
use crate::service::PhotoError;
use crate::state::AppState;
use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection}, DefaultBodyLimit, Multipart,
        Path, State,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub fn router(app_state: AppState, max_upload_bytes: usize) -> Router {
    let photos = Router::new()
        .route("/", get(list_photos).post(create_photo))
        .route(
            "/:id",
            get(get_photo).put(update_photo).delete(delete_photo),
        );

    Router::new()
        .nest("/api/photos", photos)
        .route("/assets/:asset_id", get(get_asset))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}

/// Binds `addr` and serves in a background task. Returns the bound address,
/// which matters when `addr` asks for port 0.
pub async fn start_server(
    app_state: AppState,
    addr: SocketAddr,
    max_upload_bytes: usize,
) -> Result<SocketAddr, std::io::Error> {
    let app = router(app_state, max_upload_bytes);

    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(%local_addr, "photo server listening");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "photo server stopped");
        }
    });

    Ok(local_addr)
}

#[derive(Debug)]
pub enum ApiError {
    Photo(PhotoError),
    Multipart(MultipartError),
    NotMultipart(MultipartRejection),
}

impl From<PhotoError> for ApiError {
    fn from(err: PhotoError) -> Self {
        ApiError::Photo(err)
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::Multipart(err)
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(err: MultipartRejection) -> Self {
        ApiError::NotMultipart(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Photo(err) => {
                let status = match err {
                    PhotoError::ValidationFailed(_) => StatusCode::BAD_REQUEST,
                    PhotoError::NotFound(_) => StatusCode::NOT_FOUND,
                    PhotoError::UploadFailed(_)
                    | PhotoError::AssetDeleteFailed(_)
                    | PhotoError::PersistFailed(_)
                    | PhotoError::StoreFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, err.to_string())
            }
            ApiError::Multipart(err) => (err.status(), err.body_text()),
            ApiError::NotMultipart(err) => (err.status(), err.body_text()),
        };

        if status.is_server_error() {
            tracing::error!(%status, %message, "request failed");
        }

        (status, Json(json!({ "message": message }))).into_response()
    }
}

/// Fields of the multipart photo form. Unknown fields are ignored.
#[derive(Debug, Default)]
struct PhotoForm {
    title: Option<String>,
    photo: Option<Vec<u8>>,
}

async fn read_photo_form(mut multipart: Multipart) -> Result<PhotoForm, ApiError> {
    let mut form = PhotoForm::default();
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "title" => form.title = Some(field.text().await?),
            "photo" => form.photo = Some(field.bytes().await?.to_vec()),
            _ => {}
        }
    }
    Ok(form)
}

async fn create_photo(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<Photo>), ApiError> {
    let form = read_photo_form(multipart?).await?;
    let photo = state
        .photos
        .create(
            form.title.as_deref().unwrap_or_default(),
            form.photo.unwrap_or_default(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(photo)))
}

async fn list_photos(State(state): State<AppState>) -> Result<Json<Vec<Photo>>, ApiError> {
    Ok(Json(state.photos.list().await?))
}

async fn get_photo(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Photo>, ApiError> {
    Ok(Json(state.photos.get(&id).await?))
}

async fn update_photo(
    State(state): State<AppState>,
    Path(id): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Photo>, ApiError> {
    let multipart = match multipart {
        Ok(multipart) => multipart,
        Err(rejection) => {
            // An unknown id outranks a malformed body.
            state.photos.get(&id).await?;
            return Err(rejection.into());
        }
    };
    let form = read_photo_form(multipart).await?;

    // Browsers send empty fields for untouched inputs; those mean "keep".
    let update = PhotoUpdate {
        title: form.title.filter(|t| !t.trim().is_empty()),
        image: form.photo.filter(|p| !p.is_empty()),
    };
    Ok(Json(state.photos.update(&id, update).await?))
}

async fn delete_photo(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeletedPhoto>, ApiError> {
    state.photos.delete(&id).await?;
    Ok(Json(DeletedPhoto {
        message: "Photo deleted".to_string(),
        id,
    }))
}

#[derive(Debug, PartialEq, Eq)]
enum ByteRange {
    Full,
    Partial { start: usize, end: usize },
    Unsatisfiable,
}

/// Interprets a single `bytes=` range against a body of `total_len` bytes.
/// Anything this parser does not understand falls back to the full body.
fn parse_range(range: Option<&str>, total_len: usize) -> ByteRange {
    let Some(bounds) = range.and_then(|r| r.strip_prefix("bytes=")) else {
        return ByteRange::Full;
    };
    if bounds.contains(',') {
        return ByteRange::Full;
    }
    let Some((start_s, end_s)) = bounds.trim().split_once('-') else {
        return ByteRange::Full;
    };
    let last = total_len.saturating_sub(1);

    let (start, end) = if start_s.is_empty() {
        // Suffix form: the final N bytes.
        let Ok(suffix) = end_s.parse::<usize>() else {
            return ByteRange::Full;
        };
        if suffix == 0 || total_len == 0 {
            return ByteRange::Unsatisfiable;
        }
        (total_len.saturating_sub(suffix), last)
    } else {
        let Ok(start) = start_s.parse::<usize>() else {
            return ByteRange::Full;
        };
        let end = if end_s.is_empty() {
            last
        } else {
            match end_s.parse::<usize>() {
                Ok(end) => end.min(last),
                Err(_) => return ByteRange::Full,
            }
        };
        (start, end)
    };

    if total_len == 0 || start >= total_len || start > end {
        ByteRange::Unsatisfiable
    } else {
        ByteRange::Partial { start, end }
    }
}

async fn get_asset(
    State(state): State<AppState>,
    Path(asset_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let blob = match state.photos.assets().fetch(&asset_id).await {
        Ok(blob) => blob,
        Err(AssetError::NotFound(_)) | Err(AssetError::InvalidId(_)) => {
            return (StatusCode::NOT_FOUND, "Asset not found").into_response()
        }
        Err(e) => {
            tracing::error!(%asset_id, error = %e, "failed to read asset");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to read asset").into_response();
        }
    };

    let etag = format!("\"{}\"", blob.etag);
    let if_none_match = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok());
    if if_none_match == Some(etag.as_str()) {
        return (StatusCode::NOT_MODIFIED, [(header::ETAG, etag)]).into_response();
    }

    let total_len = blob.data.len();
    let range = headers.get(header::RANGE).and_then(|v| v.to_str().ok());

    match parse_range(range, total_len) {
        ByteRange::Full => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, blob.mime_type),
                (header::ETAG, etag),
                (header::ACCEPT_RANGES, "bytes".to_string()),
            ],
            blob.data,
        )
            .into_response(),
        ByteRange::Partial { start, end } => {
            let chunk = blob.data[start..=end].to_vec();
            (
                StatusCode::PARTIAL_CONTENT,
                [
                    (header::CONTENT_TYPE, blob.mime_type),
                    (header::ETAG, etag),
                    (header::ACCEPT_RANGES, "bytes".to_string()),
                    (
                        header::CONTENT_RANGE,
                        format!("bytes {}-{}/{}", start, end, total_len),
                    ),
                ],
                chunk,
            )
                .into_response()
        }
        ByteRange::Unsatisfiable => (
            StatusCode::RANGE_NOT_SATISFIABLE,
            [(header::CONTENT_RANGE, format!("bytes */{}", total_len))],
        )
            .into_response(),
    }
}
