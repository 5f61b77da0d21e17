use anyhow::Context;
use sqlx::SqlitePool;

use super::repo_types::{now_millis, Account, AccountRow, AccountSummary, Profile};
use crate::error::AppError;

pub const SEARCH_LIMIT: i64 = 200;

const PROFILE_COLUMNS: &str =
    "id, name, email, title, bio, resume_filename, resume_original_name, created_at";

// Single-row lookups and RETURNING writes go through `fetch_all` so the
// SQLite statement always runs to completion and releases its transaction.

pub struct NewAccount<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub title: &'a str,
    pub bio: &'a str,
}

/// Insert a new account. Email uniqueness is decided by the UNIQUE constraint,
/// so two racing inserts cannot both succeed.
pub async fn create(db: &SqlitePool, new: NewAccount<'_>) -> Result<Profile, AppError> {
    let mut tx = db.begin().await.context("begin tx")?;
    let res = sqlx::query_as::<_, AccountRow>(&format!(
        r#"
        INSERT INTO accounts (name, email, password_hash, title, bio, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        RETURNING {PROFILE_COLUMNS}
        "#
    ))
    .bind(new.name)
    .bind(new.email)
    .bind(new.password_hash)
    .bind(new.title)
    .bind(new.bio)
    .bind(now_millis())
    .fetch_all(&mut *tx)
    .await;

    let row = match res {
        Ok(rows) => rows
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("insert returned no row"))?,
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            return Err(AppError::DuplicateIdentity);
        }
        Err(e) => return Err(anyhow::Error::new(e).context("insert account").into()),
    };
    tx.commit().await.context("commit tx")?;
    Ok(row.into())
}

/// Full record including the password hash; login only.
pub async fn find_by_email(db: &SqlitePool, email: &str) -> Result<Option<Account>, AppError> {
    let row = sqlx::query_as::<_, AccountRow>(&format!(
        "SELECT {PROFILE_COLUMNS}, password_hash FROM accounts WHERE email = ?1"
    ))
    .bind(email)
    .fetch_all(db)
    .await
    .context("find account by email")?
    .into_iter()
    .next();
    Ok(row.map(Account::try_from).transpose()?)
}

pub async fn find_by_id(db: &SqlitePool, id: i64) -> Result<Option<Profile>, AppError> {
    let row = sqlx::query_as::<_, AccountRow>(&format!(
        "SELECT {PROFILE_COLUMNS} FROM accounts WHERE id = ?1"
    ))
    .bind(id)
    .fetch_all(db)
    .await
    .context("find account by id")?
    .into_iter()
    .next();
    Ok(row.map(Profile::from))
}

/// Both columns change in one statement; last writer wins.
pub async fn update_attachment(
    db: &SqlitePool,
    id: i64,
    stored_name: &str,
    original_name: &str,
) -> Result<(), AppError> {
    let res = sqlx::query(
        r#"
        UPDATE accounts
           SET resume_filename = ?1, resume_original_name = ?2
         WHERE id = ?3
        "#,
    )
    .bind(stored_name)
    .bind(original_name)
    .bind(id)
    .execute(db)
    .await
    .context("update attachment")?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound("User not found"));
    }
    Ok(())
}

/// `None` leaves a field as it is.
pub async fn update_profile(
    db: &SqlitePool,
    id: i64,
    title: Option<&str>,
    bio: Option<&str>,
) -> Result<Profile, AppError> {
    let mut tx = db.begin().await.context("begin tx")?;
    let row = sqlx::query_as::<_, AccountRow>(&format!(
        r#"
        UPDATE accounts
           SET title = COALESCE(?1, title), bio = COALESCE(?2, bio)
         WHERE id = ?3
        RETURNING {PROFILE_COLUMNS}
        "#
    ))
    .bind(title)
    .bind(bio)
    .bind(id)
    .fetch_all(&mut *tx)
    .await
    .context("update profile")?
    .into_iter()
    .next()
    .ok_or(AppError::NotFound("User not found"))?;
    tx.commit().await.context("commit tx")?;
    Ok(row.into())
}

/// Case-insensitive (ASCII) substring match on name, newest first.
pub async fn search(
    db: &SqlitePool,
    query: &str,
    limit: i64,
) -> Result<Vec<AccountSummary>, AppError> {
    let pattern = format!("%{}%", escape_like(query));
    let rows = sqlx::query_as::<_, AccountSummary>(
        r#"
        SELECT id, name, title, bio, resume_filename IS NOT NULL AS has_attachment
          FROM accounts
         WHERE name LIKE ?1 ESCAPE '\'
         ORDER BY created_at DESC, id DESC
         LIMIT ?2
        "#,
    )
    .bind(pattern)
    .bind(limit)
    .fetch_all(db)
    .await
    .context("search accounts")?;
    Ok(rows)
}

pub async fn referenced_documents(db: &SqlitePool) -> Result<Vec<String>, AppError> {
    let names = sqlx::query_scalar::<_, String>(
        "SELECT resume_filename FROM accounts WHERE resume_filename IS NOT NULL",
    )
    .fetch_all(db)
    .await
    .context("list referenced documents")?;
    Ok(names)
}

fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
