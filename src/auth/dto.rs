use serde::{Deserialize, Serialize};

use crate::accounts::repo_types::Profile;

/// Request body for account registration. Absent and `null` fields both
/// come through as `None` so the service can report them as missing.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub title: Option<String>,
    pub bio: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub id: i64,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// `token` is the account id the client sends back on later calls.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: PublicUser,
}

#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub title: String,
    pub bio: String,
    #[serde(rename = "hasAttachment")]
    pub has_attachment: bool,
}

impl From<Profile> for PublicUser {
    fn from(p: Profile) -> Self {
        Self {
            has_attachment: p.attachment.is_some(),
            id: p.id,
            name: p.name,
            email: p.email,
            title: p.title,
            bio: p.bio,
        }
    }
}

impl From<Profile> for RegisterResponse {
    fn from(p: Profile) -> Self {
        Self {
            id: p.id,
            name: p.name,
            email: p.email,
        }
    }
}
