use axum::{extract::State, routing::post, Json, Router};
use tracing::instrument;

use crate::{
    accounts::services::{self, Registration},
    auth::dto::{LoginRequest, LoginResponse, RegisterRequest, RegisterResponse},
    error::AppError,
    extract::AppJson,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    AppJson(payload): AppJson<RegisterRequest>,
) -> Result<Json<RegisterResponse>, AppError> {
    let profile = services::register(
        &state,
        Registration {
            name: payload.name.unwrap_or_default(),
            email: payload.email.unwrap_or_default(),
            password: payload.password.unwrap_or_default(),
            title: payload.title,
            bio: payload.bio,
        },
    )
    .await?;
    Ok(Json(profile.into()))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    AppJson(payload): AppJson<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let email = payload.email.unwrap_or_default();
    let password = payload.password.unwrap_or_default();
    let profile = services::login(&state, &email, &password).await?;
    Ok(Json(LoginResponse {
        token: services::session_token(&profile),
        user: profile.into(),
    }))
}
