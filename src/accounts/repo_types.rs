use sqlx::FromRow;
use time::OffsetDateTime;

/// Row shape of the `accounts` table. `password_hash` is only selected on the
/// login path.
#[derive(Debug, Clone, FromRow)]
pub struct AccountRow {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[sqlx(default)]
    pub password_hash: Option<String>,
    pub title: String,
    pub bio: String,
    pub resume_filename: Option<String>,
    pub resume_original_name: Option<String>,
    pub created_at: i64, // unix millis
}

/// Stored document pointer, written as a pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub stored_name: String,
    pub original_name: String,
}

/// Account as seen by everyone except the login check.
#[derive(Debug, Clone)]
pub struct Profile {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub title: String,
    pub bio: String,
    pub attachment: Option<Attachment>,
    pub created_at: OffsetDateTime,
}

/// Profile plus the password hash.
#[derive(Debug, Clone)]
pub struct Account {
    pub profile: Profile,
    pub password_hash: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct AccountSummary {
    pub id: i64,
    pub name: String,
    pub title: String,
    pub bio: String,
    pub has_attachment: bool,
}

impl From<AccountRow> for Profile {
    fn from(row: AccountRow) -> Self {
        let attachment = match (row.resume_filename, row.resume_original_name) {
            (Some(stored_name), original) => Some(Attachment {
                original_name: original.unwrap_or_else(|| stored_name.clone()),
                stored_name,
            }),
            (None, _) => None,
        };
        Profile {
            id: row.id,
            name: row.name,
            email: row.email,
            title: row.title,
            bio: row.bio,
            attachment,
            created_at: from_millis(row.created_at),
        }
    }
}

impl TryFrom<AccountRow> for Account {
    type Error = anyhow::Error;

    fn try_from(mut row: AccountRow) -> Result<Self, Self::Error> {
        let password_hash = row
            .password_hash
            .take()
            .ok_or_else(|| anyhow::anyhow!("password_hash not selected"))?;
        Ok(Account {
            profile: row.into(),
            password_hash,
        })
    }
}

pub(crate) fn from_millis(ms: i64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp_nanos(ms as i128 * 1_000_000)
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

pub(crate) fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}
