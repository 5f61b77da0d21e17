use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use bytes::{Bytes, BytesMut};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{instrument, warn};

use super::dto::{
    ProfileResponse, SearchQuery, SummaryResponse, UpdateProfileRequest, UploadResponse,
};
use super::services;
use crate::{
    artifacts::{content_type_for, MAX_UPLOAD_BYTES},
    error::AppError,
    extract::{AppJson, AppMultipart, AppPath, AppQuery},
    state::AppState,
};

/// Multipart framing headroom on top of the document ceiling.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(search_users))
        .route("/users/:id", get(get_profile).patch(update_profile))
        .route(
            "/users/:id/resume",
            get(download_resume).post(upload_resume).layer(DefaultBodyLimit::max(
                MAX_UPLOAD_BYTES + MULTIPART_OVERHEAD,
            )),
        )
}

#[instrument(skip(state))]
pub async fn get_profile(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
) -> Result<Json<ProfileResponse>, AppError> {
    let profile = services::get_profile(&state, id).await?;
    Ok(Json(profile.into()))
}

#[instrument(skip(state, payload))]
pub async fn update_profile(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
    AppJson(payload): AppJson<UpdateProfileRequest>,
) -> Result<Json<ProfileResponse>, AppError> {
    let profile = services::update_profile(
        &state,
        id,
        payload.title.as_deref(),
        payload.bio.as_deref(),
    )
    .await?;
    Ok(Json(profile.into()))
}

#[instrument(skip(state))]
pub async fn search_users(
    State(state): State<AppState>,
    AppQuery(params): AppQuery<SearchQuery>,
) -> Result<Json<Vec<SummaryResponse>>, AppError> {
    let rows = services::search(&state, &params.q).await?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

/// POST /users/:id/resume, multipart field `resume`.
#[instrument(skip(state, mp))]
pub async fn upload_resume(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
    AppMultipart(mut mp): AppMultipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut upload: Option<(String, Bytes)> = None;
    while let Some(mut field) = mp.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("resume") {
            continue;
        }
        let original = field.file_name().unwrap_or_default().to_string();
        let mut buf = BytesMut::new();
        while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
            buf.extend_from_slice(&chunk);
            // enough to be rejected as too large; stop buffering
            if buf.len() > MAX_UPLOAD_BYTES {
                break;
            }
        }
        upload = Some((original, buf.freeze()));
        break;
    }

    let (original, body) = upload.ok_or_else(|| AppError::validation("No file uploaded"))?;
    let stored = services::upload_attachment(&state, id, body, &original).await?;
    Ok(Json(UploadResponse {
        ok: true,
        filename: stored.stored_name,
        original: stored.original_name,
    }))
}

#[instrument(skip(state))]
pub async fn download_resume(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
) -> Result<Response, AppError> {
    let (body, original) = services::download_attachment(&state, id).await?;
    let disposition = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"",
        header_safe_filename(&original)
    ))
    .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(content_type_for(&original))),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return AppError::TooLarge;
    }
    warn!(error = %e, "malformed multipart body");
    AppError::validation(e.body_text())
}

fn header_safe_filename(name: &str) -> String {
    lazy_static! {
        static ref UNSAFE: Regex = Regex::new(r#"[\x00-\x1f\x7f"\\]"#).unwrap();
    }
    let cleaned = UNSAFE.replace_all(name, "");
    if cleaned.is_empty() {
        "resume".to_string()
    } else {
        cleaned.into_owned()
    }
}
