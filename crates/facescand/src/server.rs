//! HTTP surface: `POST /profile` accepts a multipart upload in the `avatar` field.

use crate::engine::{EngineError, EngineHandle};
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use facescan_core::decode::{self, ImageError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::Instrument;
use uuid::Uuid;

/// Multipart field carrying the image.
const UPLOAD_FIELD: &str = "avatar";

pub struct AppState {
    pub engine: EngineHandle,
    pub upload_dir: PathBuf,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("expected multipart/form-data: {0}")]
    NotMultipart(#[from] MultipartRejection),
    #[error("malformed upload: {0}")]
    Multipart(#[from] MultipartError),
    #[error("no file in field \"avatar\"")]
    MissingFile,
    #[error("failed to store upload {path}: {source}")]
    Store {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Image(#[from] ImageError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("decoder task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotMultipart(rejection) => rejection.status(),
            ApiError::Multipart(err) => err.status(),
            ApiError::MissingFile | ApiError::Image(_) => StatusCode::BAD_REQUEST,
            ApiError::Store { .. } | ApiError::Engine(_) | ApiError::Join(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    /// Errors keep the success shape: a JSON array of strings.
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::warn!(error = %self, "request rejected");
        }
        (status, Json(vec![self.to_string()])).into_response()
    }
}

pub fn router(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/profile", post(upload_profile))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "labels": state.engine.labels(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Store the upload, analyze it, and answer with
/// `[description_1, match_1, description_2, match_2, ...]`.
async fn upload_profile(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Vec<String>>, ApiError> {
    let span = tracing::info_span!("profile", request_id = %Uuid::new_v4());
    async move {
        let (file_name, bytes) = read_upload(multipart?).await?;
        tracing::info!(file = %file_name, bytes = bytes.len(), "upload received");

        store_upload(&state.upload_dir, &file_name, &bytes).await?;

        let image = tokio::task::spawn_blocking(move || decode::decode_rgb(&bytes)).await??;
        let reports = state.engine.analyze(image).await?;
        tracing::info!(faces = reports.len(), "upload analyzed");

        Ok(Json(
            reports
                .into_iter()
                .flat_map(|r| [r.description, r.best_match.to_string()])
                .collect(),
        ))
    }
    .instrument(span)
    .await
}

/// Pull the first file from the upload field; other fields are ignored.
async fn read_upload(mut multipart: Multipart) -> Result<(String, Vec<u8>), ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let file_name = sanitize_file_name(field.file_name());
        let bytes = field.bytes().await?;
        return Ok((file_name, bytes.to_vec()));
    }
    Err(ApiError::MissingFile)
}

async fn store_upload(dir: &Path, file_name: &str, bytes: &[u8]) -> Result<PathBuf, ApiError> {
    let path = dir.join(file_name);
    let store_err = |source| ApiError::Store { path: path.clone(), source };

    tokio::fs::create_dir_all(dir).await.map_err(store_err)?;
    tokio::fs::write(&path, bytes).await.map_err(store_err)?;
    tracing::debug!(path = %path.display(), "upload stored");
    Ok(path)
}

/// Keep only the final path component of a client-supplied name.
fn sanitize_file_name(name: Option<&str>) -> String {
    name.map(|n| n.replace('\\', "/"))
        .and_then(|n| {
            Path::new(&n)
                .file_name()
                .map(|f| f.to_string_lossy().into_owned())
        })
        .filter(|n| !n.is_empty() && !n.starts_with('.'))
        .unwrap_or_else(|| format!("upload-{}", Uuid::new_v4()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::spawn_engine;
    use crate::engine::tests::{stub_matcher, StubPipeline};
    use axum::body::Body;
    use axum::http::{header, Request};
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use tower::ServiceExt;

    const BOUNDARY: &str = "facescan-test-boundary";

    fn app(upload_dir: &Path) -> Router {
        app_with_limit(upload_dir, 1024 * 1024)
    }

    fn app_with_limit(upload_dir: &Path, max_upload_bytes: usize) -> Router {
        let engine = spawn_engine(Box::new(StubPipeline), stub_matcher()).unwrap();
        let state = Arc::new(AppState { engine, upload_dir: upload_dir.to_path_buf() });
        router(state, max_upload_bytes)
    }

    fn png(pixels: &[[u8; 3]]) -> Vec<u8> {
        let mut img = RgbImage::new(pixels.len() as u32, 1);
        for (x, px) in pixels.iter().enumerate() {
            img.put_pixel(x as u32, 0, Rgb(*px));
        }
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    fn multipart_body(field: &str, file_name: &str, content: &[u8]) -> Vec<u8> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nhello\r\n\
             --{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload_request(body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/profile")
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_strings(response: Response) -> Vec<String> {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_profile_describes_and_matches_each_face() {
        let dir = tempfile::tempdir().unwrap();
        let body = multipart_body("avatar", "me.png", &png(&[[255, 0, 0], [0, 0, 0], [0, 255, 0]]));

        let response = app(dir.path()).oneshot(upload_request(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let strings = json_strings(response).await;
        assert_eq!(strings.len(), 4);
        assert!(strings[0].starts_with("Detection confidence: 99% Gender: 75% female Age: 40"));
        assert_eq!(strings[1], "red (0)");
        assert!(strings[2].ends_with("Box: 2,0,1,1"));
        assert_eq!(strings[3], "unknown (1.41)");

        assert!(dir.path().join("me.png").is_file());
    }

    #[tokio::test]
    async fn test_profile_without_faces_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let body = multipart_body("avatar", "empty.png", &png(&[[0, 0, 0]]));
        let response = app(dir.path()).oneshot(upload_request(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(json_strings(response).await.is_empty());
    }

    #[tokio::test]
    async fn test_profile_missing_field() {
        let dir = tempfile::tempdir().unwrap();
        let body = multipart_body("photo", "me.png", &png(&[[255, 0, 0]]));
        let response = app(dir.path()).oneshot(upload_request(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let strings = json_strings(response).await;
        assert_eq!(strings, ["no file in field \"avatar\""]);
    }

    #[tokio::test]
    async fn test_profile_undecodable_image() {
        let dir = tempfile::tempdir().unwrap();
        let body = multipart_body("avatar", "junk.jpg", b"not really a jpeg");
        let response = app(dir.path()).oneshot(upload_request(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let strings = json_strings(response).await;
        assert_eq!(strings.len(), 1);
        assert!(strings[0].starts_with("undecodable image"));
        // Stored even though it could not be decoded.
        assert!(dir.path().join("junk.jpg").is_file());
    }

    #[tokio::test]
    async fn test_profile_over_body_limit() {
        let dir = tempfile::tempdir().unwrap();
        let body = multipart_body("avatar", "big.png", &vec![0xAB; 8 * 1024]);
        let response = app_with_limit(dir.path(), 1024).oneshot(upload_request(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(json_strings(response).await.len(), 1);
        assert!(!dir.path().join("big.png").exists());
    }

    #[tokio::test]
    async fn test_profile_store_failure() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let body = multipart_body("avatar", "me.png", &png(&[[255, 0, 0]]));
        let response = app(&blocker.join("uploads")).oneshot(upload_request(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let strings = json_strings(response).await;
        assert_eq!(strings.len(), 1);
        assert!(strings[0].starts_with("failed to store upload"));
    }

    #[tokio::test]
    async fn test_profile_not_multipart() {
        let dir = tempfile::tempdir().unwrap();
        let request = Request::builder()
            .method("POST")
            .uri("/profile")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap();
        let response = app(dir.path()).oneshot(request).await.unwrap();
        assert!(response.status().is_client_error());
        assert_eq!(json_strings(response).await.len(), 1);
    }

    #[tokio::test]
    async fn test_health_reports_labels() {
        let dir = tempfile::tempdir().unwrap();
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = app(dir.path()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["labels"], 2);
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name(Some("me.png")), "me.png");
        assert_eq!(sanitize_file_name(Some("../../etc/passwd")), "passwd");
        assert_eq!(sanitize_file_name(Some("C:\\Users\\me\\face.jpg")), "face.jpg");
        assert!(sanitize_file_name(Some("..")).starts_with("upload-"));
        assert!(sanitize_file_name(Some(".htaccess")).starts_with("upload-"));
        assert!(sanitize_file_name(None).starts_with("upload-"));
    }
}
