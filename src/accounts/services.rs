use std::collections::HashSet;

use anyhow::Context;
use bytes::Bytes;
use tracing::{debug, info, warn};

use super::repo::{self, NewAccount, SEARCH_LIMIT};
use super::repo_types::{AccountSummary, Profile};
use crate::{
    artifacts::StoredReference,
    auth::password::{burn_verification, hash_password, verify_password},
    error::AppError,
    state::AppState,
};

pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
    pub title: Option<String>,
    pub bio: Option<String>,
}

/// The caller-facing identifier for an account. It is the decimal account id:
/// whoever presents it is trusted to act as that account.
pub fn session_token(profile: &Profile) -> String {
    profile.id.to_string()
}

pub async fn register(st: &AppState, reg: Registration) -> Result<Profile, AppError> {
    if [&reg.name, &reg.email, &reg.password]
        .iter()
        .any(|v| v.is_empty())
    {
        return Err(AppError::validation("missing fields"));
    }

    let password = reg.password;
    let hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .context("join hash task")??;

    let profile = repo::create(
        &st.db,
        NewAccount {
            name: &reg.name,
            email: &reg.email,
            password_hash: &hash,
            title: reg.title.as_deref().unwrap_or(""),
            bio: reg.bio.as_deref().unwrap_or(""),
        },
    )
    .await?;

    info!(user_id = profile.id, "account registered");
    Ok(profile)
}

/// Unknown email and wrong password both come back as `InvalidCredentials`.
pub async fn login(st: &AppState, email: &str, password: &str) -> Result<Profile, AppError> {
    let account = repo::find_by_email(&st.db, email).await?;
    let password = password.to_string();

    let (profile, ok) = match account {
        Some(account) => {
            let hash = account.password_hash;
            let ok = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
                .await
                .context("join verify task")??;
            (Some(account.profile), ok)
        }
        None => {
            tokio::task::spawn_blocking(move || burn_verification(&password))
                .await
                .context("join verify task")?;
            (None, false)
        }
    };

    match profile {
        Some(profile) if ok => {
            info!(user_id = profile.id, "user logged in");
            Ok(profile)
        }
        _ => {
            warn!("login rejected");
            Err(AppError::InvalidCredentials)
        }
    }
}

pub async fn get_profile(st: &AppState, id: i64) -> Result<Profile, AppError> {
    repo::find_by_id(&st.db, id)
        .await?
        .ok_or(AppError::NotFound("User not found"))
}

pub async fn update_profile(
    st: &AppState,
    id: i64,
    title: Option<&str>,
    bio: Option<&str>,
) -> Result<Profile, AppError> {
    repo::update_profile(&st.db, id, title, bio).await
}

/// Bytes are stored before the pointer is written, so a failed pointer update
/// can leave an orphaned document but never a dangling pointer.
pub async fn upload_attachment(
    st: &AppState,
    id: i64,
    body: Bytes,
    original_name: &str,
) -> Result<StoredReference, AppError> {
    get_profile(st, id).await?;

    let stored = st.artifacts.accept(body, original_name).await?;
    repo::update_attachment(&st.db, id, &stored.stored_name, &stored.original_name).await?;

    info!(user_id = id, stored_name = %stored.stored_name, "attachment replaced");
    Ok(stored)
}

/// Returns the document bytes and the name it was uploaded under.
pub async fn download_attachment(st: &AppState, id: i64) -> Result<(Bytes, String), AppError> {
    let attachment = repo::find_by_id(&st.db, id)
        .await?
        .and_then(|p| p.attachment)
        .ok_or(AppError::NotFound("Resume not found"))?;
    let body = st.artifacts.retrieve(&attachment.stored_name).await?;
    Ok((body, attachment.original_name))
}

pub async fn search(st: &AppState, query: &str) -> Result<Vec<AccountSummary>, AppError> {
    repo::search(&st.db, query, SEARCH_LIMIT).await
}

/// Deletes stored documents no account points at. Must not run while uploads
/// are in flight: a document between store and pointer update looks orphaned.
pub async fn sweep_orphans(st: &AppState) -> Result<usize, AppError> {
    let referenced: HashSet<String> = repo::referenced_documents(&st.db)
        .await?
        .into_iter()
        .collect();

    let mut removed = 0;
    for name in st.artifacts.list().await? {
        if referenced.contains(&name) {
            continue;
        }
        st.artifacts.remove(&name).await?;
        debug!(stored_name = %name, "orphan removed");
        removed += 1;
    }
    info!(removed, kept = referenced.len(), "orphan sweep finished");
    Ok(removed)
}
