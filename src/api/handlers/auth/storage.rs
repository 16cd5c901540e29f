//! Database helpers for users, verification codes, and TOTP enrollments.

use anyhow::{Context, Result};
use sqlx::{PgPool, Row};
use tracing::Instrument;

use crate::api::email::enqueue_verification_email;
use crate::db::is_unique_violation;
use crate::store::repo::TreeRepo;

/// Name of the root directory created for every new user.
const ENTRY_DIRECTORY_NAME: &str = "entry";

/// Fields needed for login and entry-directory lookup.
pub(crate) struct UserRecord {
    pub(crate) password_hash: String,
    pub(crate) entry_directory_id: i64,
}

/// A pre-registration verification or enrollment gate.
pub(super) struct CodeRecord {
    pub(super) code: String,
    pub(super) verified: bool,
}

pub(super) struct EnrollmentRecord {
    pub(super) secret: String,
    pub(super) verified: bool,
}

/// Outcome of attempting to create the user row.
#[derive(Debug)]
pub(super) enum CreateUserOutcome {
    Created,
    Conflict,
}

pub(crate) async fn get_user(pool: &PgPool, username: &str) -> Result<Option<UserRecord>> {
    let query = "SELECT password_hash, entry_directory_id FROM users WHERE username = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(username)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user")?;

    Ok(row.map(|row| UserRecord {
        password_hash: row.get("password_hash"),
        entry_directory_id: row.get("entry_directory_id"),
    }))
}

pub(super) async fn user_exists(pool: &PgPool, username: &str) -> Result<bool> {
    let query = "SELECT 1 AS present FROM users WHERE username = $1 LIMIT 1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(username)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to check for existing user")?;
    Ok(row.is_some())
}

/// Record (or overwrite) the verification code and enqueue the mail in one
/// transaction.
pub(super) async fn record_verification_code(
    pool: &PgPool,
    username: &str,
    code: &str,
) -> Result<()> {
    let mut tx = pool
        .begin()
        .await
        .context("failed to start verification transaction")?;

    let query = r"
        INSERT INTO verification_codes (username, code)
        VALUES ($1, $2)
        ON CONFLICT (username) DO UPDATE
        SET code = $2
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(username)
        .bind(code)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to record verification code")?;

    enqueue_verification_email(&mut tx, username, code).await?;

    tx.commit()
        .await
        .context("failed to commit verification transaction")?;
    Ok(())
}

pub(super) async fn get_verification_code(
    pool: &PgPool,
    username: &str,
) -> Result<Option<CodeRecord>> {
    let query = "SELECT code, verified FROM verification_codes WHERE username = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(username)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup verification code")?;
    Ok(row.map(|row| CodeRecord {
        code: row.get("code"),
        verified: row.get("verified"),
    }))
}

pub(super) async fn mark_verification_confirmed(pool: &PgPool, username: &str) -> Result<()> {
    let query = "UPDATE verification_codes SET verified = TRUE WHERE username = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(username)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to mark verification code confirmed")?;
    Ok(())
}

pub(super) async fn get_enrollment(
    pool: &PgPool,
    username: &str,
) -> Result<Option<EnrollmentRecord>> {
    let query = "SELECT secret, verified FROM totp_enrollments WHERE username = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(username)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup totp enrollment")?;
    Ok(row.map(|row| EnrollmentRecord {
        secret: row.get("secret"),
        verified: row.get("verified"),
    }))
}

/// Persist a fresh enrollment secret. The secret is generated exactly once;
/// later provisioning requests reuse the stored value.
pub(super) async fn insert_enrollment(pool: &PgPool, username: &str, secret: &str) -> Result<()> {
    let query = r"
        INSERT INTO totp_enrollments (username, secret)
        VALUES ($1, $2)
        ON CONFLICT (username) DO NOTHING
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(username)
        .bind(secret)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to insert totp enrollment")?;
    Ok(())
}

pub(super) async fn mark_enrollment_confirmed(pool: &PgPool, username: &str) -> Result<()> {
    let query = "UPDATE totp_enrollments SET verified = TRUE WHERE username = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(username)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to mark totp enrollment confirmed")?;
    Ok(())
}

/// Create the user row with its entry directory.
///
/// The entry directory is inserted first; if concurrent signup attempts
/// raced and left extras, all but the oldest are deleted before the user
/// row is written referencing the survivor.
pub(super) async fn create_user(
    pool: &PgPool,
    username: &str,
    password_hash: &str,
    security_question: &str,
    security_answer: &str,
    secret: &str,
) -> Result<CreateUserOutcome> {
    TreeRepo::insert_directory(pool, None, ENTRY_DIRECTORY_NAME, username)
        .await
        .context("failed to create entry directory")?;

    let directories = TreeRepo::list_directories_for_user(pool, username).await?;
    let extra_ids: Vec<i64> = directories.iter().skip(1).map(|d| d.id).collect();
    if !extra_ids.is_empty() {
        TreeRepo::delete_directories(pool, &extra_ids).await?;
    }
    let entry_directory_id = directories
        .first()
        .map(|directory| directory.id)
        .context("entry directory missing after insert")?;

    let query = r"
        INSERT INTO users
            (username, password_hash, security_question, security_answer, secret, entry_directory_id)
        VALUES ($1, $2, $3, $4, $5, $6)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(username)
        .bind(password_hash)
        .bind(security_question)
        .bind(security_answer)
        .bind(secret)
        .bind(entry_directory_id)
        .execute(pool)
        .instrument(span)
        .await;

    match result {
        Ok(_) => Ok(CreateUserOutcome::Created),
        Err(err) if is_unique_violation(&err) => Ok(CreateUserOutcome::Conflict),
        Err(err) => Err(err).context("failed to insert user"),
    }
}

#[cfg(test)]
mod tests {
    use super::CreateUserOutcome;

    #[test]
    fn create_user_outcome_debug_names() {
        assert_eq!(format!("{:?}", CreateUserOutcome::Created), "Created");
        assert_eq!(format!("{:?}", CreateUserOutcome::Conflict), "Conflict");
    }
}
