//! Registration pipeline: username availability, email verification, TOTP
//! enrollment, and final user creation.

use axum::{
    Json,
    extract::{Extension, Query},
    http::header::CONTENT_TYPE,
    response::{IntoResponse, Response},
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;

use super::storage::{self, CreateUserOutcome};
use super::types::{
    ConfirmCodeRequest, CreateUserRequest, CreateUserResponse, SendVerificationRequest,
    UsernameQuery,
};
use super::utils::{
    generate_application_secret, generate_verification_code, hash_password, valid_username,
};
use crate::api::error::ApiError;
use crate::api::handlers::{Ack, ErrorBody, require_fields};
use crate::totp::Totp;

/// Pre-signup probe so clients can reject taken usernames early.
#[utoipa::path(
    get,
    path = "/v1/auth/username-available",
    params(
        ("username" = String, Query, description = "Candidate username")
    ),
    responses(
        (status = 200, description = "Username is usable", body = Ack),
        (status = 409, description = "User already exists", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn username_available(
    pool: Extension<PgPool>,
    Query(query): Query<UsernameQuery>,
) -> Result<Json<Ack>, ApiError> {
    require_fields(&[("username", &query.username)])?;
    if storage::user_exists(&pool, &query.username).await? {
        return Err(ApiError::Conflict("user already exists".to_string()));
    }
    Ok(Json(Ack::new("username usable")))
}

/// Generate a 6-digit code, overwrite any previous one, and queue the
/// verification mail.
#[utoipa::path(
    post,
    path = "/v1/auth/verification/send",
    request_body = SendVerificationRequest,
    responses(
        (status = 200, description = "Verification email queued", body = Ack),
        (status = 400, description = "Missing or invalid username", body = ErrorBody),
        (status = 409, description = "User already exists", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn send_verification(
    pool: Extension<PgPool>,
    payload: Option<Json<SendVerificationRequest>>,
) -> Result<Json<Ack>, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::Validation("missing payload".to_string()));
    };
    require_fields(&[("username", &request.username)])?;
    if !valid_username(&request.username) {
        return Err(ApiError::Validation("invalid username".to_string()));
    }
    if storage::user_exists(&pool, &request.username).await? {
        return Err(ApiError::Conflict("user already exists".to_string()));
    }

    let code = generate_verification_code();
    storage::record_verification_code(&pool, &request.username, &code).await?;
    Ok(Json(Ack::new("verification email queued")))
}

#[utoipa::path(
    post,
    path = "/v1/auth/verification/confirm",
    request_body = ConfirmCodeRequest,
    responses(
        (status = 200, description = "Email verified", body = Ack),
        (status = 400, description = "Invalid verification code", body = ErrorBody),
        (status = 404, description = "No verification code found", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn confirm_verification(
    pool: Extension<PgPool>,
    payload: Option<Json<ConfirmCodeRequest>>,
) -> Result<Json<Ack>, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::Validation("missing payload".to_string()));
    };
    require_fields(&[("username", &request.username), ("code", &request.code)])?;

    let Some(record) = storage::get_verification_code(&pool, &request.username).await? else {
        return Err(ApiError::NotFound("no verification code found".to_string()));
    };
    if record.code != request.code {
        return Err(ApiError::Validation(
            "invalid verification code".to_string(),
        ));
    }
    storage::mark_verification_confirmed(&pool, &request.username).await?;
    Ok(Json(Ack::new("email verified")))
}

/// Provisioning image for the authenticator app.
///
/// The first request generates and persists the secret; every later
/// request re-renders the image from the stored secret.
#[utoipa::path(
    get,
    path = "/v1/auth/totp/provision",
    params(
        ("username" = String, Query, description = "Enrolling username")
    ),
    responses(
        (status = 200, description = "Provisioning QR image", content_type = "image/png"),
        (status = 409, description = "User already exists", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn totp_provision(
    pool: Extension<PgPool>,
    totp: Extension<Arc<Totp>>,
    Query(query): Query<UsernameQuery>,
) -> Result<Response, ApiError> {
    require_fields(&[("username", &query.username)])?;
    if storage::user_exists(&pool, &query.username).await? {
        return Err(ApiError::Conflict("user already exists".to_string()));
    }

    let secret = match storage::get_enrollment(&pool, &query.username).await? {
        Some(enrollment) => enrollment.secret,
        None => {
            let secret = Totp::generate_secret();
            storage::insert_enrollment(&pool, &query.username, &secret).await?;
            secret
        }
    };

    let png = totp.provisioning_png(&secret, &query.username)?;
    Ok(([(CONTENT_TYPE, "image/png")], png).into_response())
}

#[utoipa::path(
    post,
    path = "/v1/auth/totp/confirm",
    request_body = ConfirmCodeRequest,
    responses(
        (status = 200, description = "Two-factor enrollment verified", body = Ack),
        (status = 400, description = "Invalid two-factor code", body = ErrorBody),
        (status = 404, description = "No enrollment found", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn confirm_totp(
    pool: Extension<PgPool>,
    totp: Extension<Arc<Totp>>,
    payload: Option<Json<ConfirmCodeRequest>>,
) -> Result<Json<Ack>, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::Validation("missing payload".to_string()));
    };
    require_fields(&[("username", &request.username), ("code", &request.code)])?;

    let Some(enrollment) = storage::get_enrollment(&pool, &request.username).await? else {
        return Err(ApiError::NotFound(
            "no two-factor enrollment found".to_string(),
        ));
    };
    if !totp.verify(&enrollment.secret, &request.code)? {
        return Err(ApiError::Validation("invalid two-factor code".to_string()));
    }
    storage::mark_enrollment_confirmed(&pool, &request.username).await?;
    Ok(Json(Ack::new("two-factor enrollment verified")))
}

/// Final gate of the pipeline. Requires both verification rows to be
/// confirmed and no existing user; creates the entry directory and the
/// user row, and returns the generated application secret.
#[utoipa::path(
    post,
    path = "/v1/users",
    request_body = CreateUserRequest,
    responses(
        (status = 200, description = "User created", body = CreateUserResponse),
        (status = 400, description = "Preconditions unmet", body = ErrorBody),
        (status = 409, description = "User already exists", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn create_user(
    pool: Extension<PgPool>,
    payload: Option<Json<CreateUserRequest>>,
) -> Result<Json<CreateUserResponse>, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::Validation("missing payload".to_string()));
    };
    require_fields(&[
        ("username", &request.username),
        ("password", &request.password),
        ("securityQuestion", &request.security_question),
        ("securityAnswer", &request.security_answer),
    ])?;

    let verification = storage::get_verification_code(&pool, &request.username).await?;
    if !verification.is_some_and(|record| record.verified) {
        return Err(ApiError::Validation(
            "email verification incomplete".to_string(),
        ));
    }
    let enrollment = storage::get_enrollment(&pool, &request.username).await?;
    if !enrollment.is_some_and(|record| record.verified) {
        return Err(ApiError::Validation(
            "two-factor setup incomplete".to_string(),
        ));
    }
    if storage::user_exists(&pool, &request.username).await? {
        return Err(ApiError::Conflict("user already exists".to_string()));
    }

    let secret = generate_application_secret()?;
    let password_hash = hash_password(&request.password)?;
    match storage::create_user(
        &pool,
        &request.username,
        &password_hash,
        &request.security_question,
        &request.security_answer,
        &secret,
    )
    .await?
    {
        CreateUserOutcome::Created => {
            info!(username = %request.username, "user created");
            Ok(Json(CreateUserResponse {
                secret,
                success_message: "user created".to_string(),
            }))
        }
        CreateUserOutcome::Conflict => Err(ApiError::Conflict("user already exists".to_string())),
    }
}
