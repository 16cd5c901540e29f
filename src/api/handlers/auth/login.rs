//! Password and two-factor login endpoints.

use axum::{Json, extract::Extension};
use chrono::Utc;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;

use super::storage;
use super::types::{PasswordLoginRequest, TwoFactorLoginRequest};
use super::utils::verify_password;
use crate::api::error::ApiError;
use crate::api::handlers::{AccessGuard, Ack, ErrorBody, require_fields};
use crate::session::TwoFactorAttempt;
use crate::totp::Totp;

/// First factor: check the password and bind (or rebind) the login process
/// to the caller's window.
#[utoipa::path(
    post,
    path = "/v1/auth/password",
    request_body = PasswordLoginRequest,
    responses(
        (status = 200, description = "Password accepted", body = Ack),
        (status = 400, description = "Missing input", body = ErrorBody),
        (status = 401, description = "Invalid credentials", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn password_login(
    pool: Extension<PgPool>,
    guard: Extension<Arc<AccessGuard>>,
    payload: Option<Json<PasswordLoginRequest>>,
) -> Result<Json<Ack>, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::Validation("missing payload".to_string()));
    };
    require_fields(&[
        ("username", &request.username),
        ("password", &request.password),
        ("windowId", &request.window_id),
    ])?;

    // User absence and hash mismatch answer identically so login cannot be
    // used to enumerate accounts.
    let Some(user) = storage::get_user(&pool, &request.username).await? else {
        return Err(ApiError::Auth("invalid credentials".to_string()));
    };
    if !verify_password(&request.password, &user.password_hash) {
        return Err(ApiError::Auth("invalid credentials".to_string()));
    }

    guard
        .gate()
        .password_verified(&request.username, &request.window_id, Utc::now())
        .await?;
    Ok(Json(Ack::new("password accepted")))
}

/// Second factor: check the TOTP code against the enrollment secret and
/// mark the login process verified.
#[utoipa::path(
    post,
    path = "/v1/auth/two-factor",
    request_body = TwoFactorLoginRequest,
    responses(
        (status = 200, description = "Two-factor verified", body = Ack),
        (status = 400, description = "Missing input or invalid code", body = ErrorBody),
        (status = 401, description = "No session or session expired", body = ErrorBody),
        (status = 404, description = "No enrollment for the user", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn two_factor_login(
    pool: Extension<PgPool>,
    guard: Extension<Arc<AccessGuard>>,
    totp: Extension<Arc<Totp>>,
    payload: Option<Json<TwoFactorLoginRequest>>,
) -> Result<Json<Ack>, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::Validation("missing payload".to_string()));
    };
    require_fields(&[
        ("username", &request.username),
        ("code", &request.code),
        ("windowId", &request.window_id),
    ])?;

    let Some(enrollment) = storage::get_enrollment(&pool, &request.username).await? else {
        return Err(ApiError::NotFound(
            "no two-factor enrollment found".to_string(),
        ));
    };

    match guard
        .gate()
        .two_factor_attempt(&request.username, &request.window_id, Utc::now())
        .await?
    {
        TwoFactorAttempt::NoSession => {
            return Err(ApiError::Auth("no login session".to_string()));
        }
        TwoFactorAttempt::Expired => {
            return Err(ApiError::Auth("login session expired".to_string()));
        }
        TwoFactorAttempt::AlreadyVerified => {
            return Ok(Json(Ack::new("two-factor already verified")));
        }
        TwoFactorAttempt::Ready => {}
    }

    if !totp.verify(&enrollment.secret, &request.code)? {
        return Err(ApiError::Validation("invalid two-factor code".to_string()));
    }

    guard.gate().confirm_two_factor(&request.username).await?;
    info!(username = %request.username, "two-factor verified");
    Ok(Json(Ack::new("two-factor verified")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::AccessGuard;
    use crate::session::{PgSessionStore, SessionGate, SessionPolicy};
    use anyhow::Result;
    use axum::response::IntoResponse;
    use axum::http::StatusCode;
    use sqlx::postgres::PgPoolOptions;

    fn lazy_pool() -> Result<PgPool> {
        Ok(PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?)
    }

    fn guard(pool: &PgPool) -> Arc<AccessGuard> {
        let gate = SessionGate::new(PgSessionStore::new(pool.clone()), SessionPolicy::new());
        Arc::new(AccessGuard::new(gate, false))
    }

    #[tokio::test]
    async fn password_login_missing_payload() -> Result<()> {
        let pool = lazy_pool()?;
        let guard = guard(&pool);
        let response = password_login(Extension(pool), Extension(guard), None)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn password_login_blank_window() -> Result<()> {
        let pool = lazy_pool()?;
        let guard = guard(&pool);
        let response = password_login(
            Extension(pool),
            Extension(guard),
            Some(Json(PasswordLoginRequest {
                username: "alice@example.com".to_string(),
                password: "hunter2hunter2".to_string(),
                window_id: " ".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn two_factor_login_missing_payload() -> Result<()> {
        let pool = lazy_pool()?;
        let guard = guard(&pool);
        let totp = Arc::new(Totp::new("Kesto"));
        let response = two_factor_login(Extension(pool), Extension(guard), Extension(totp), None)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }
}
