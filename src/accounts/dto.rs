use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::repo_types::{AccountSummary, Profile};

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub title: String,
    pub bio: String,
    pub resume_filename: Option<String>,
    pub resume_original_name: Option<String>,
    #[serde(rename = "hasAttachment")]
    pub has_attachment: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<Profile> for ProfileResponse {
    fn from(p: Profile) -> Self {
        let (resume_filename, resume_original_name) = match p.attachment {
            Some(a) => (Some(a.stored_name), Some(a.original_name)),
            None => (None, None),
        };
        Self {
            has_attachment: resume_filename.is_some(),
            id: p.id,
            name: p.name,
            email: p.email,
            title: p.title,
            bio: p.bio,
            resume_filename,
            resume_original_name,
            created_at: p.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub id: i64,
    pub name: String,
    pub title: String,
    pub bio: String,
    #[serde(rename = "hasAttachment")]
    pub has_attachment: bool,
}

impl From<AccountSummary> for SummaryResponse {
    fn from(s: AccountSummary) -> Self {
        Self {
            id: s.id,
            name: s.name,
            title: s.title,
            bio: s.bio,
            has_attachment: s.has_attachment,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub title: Option<String>,
    pub bio: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub ok: bool,
    pub filename: String,
    pub original: String,
}
