//! Request/response types for auth endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PasswordLoginRequest {
    pub username: String,
    pub password: String,
    pub window_id: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct TwoFactorLoginRequest {
    pub username: String,
    pub code: String,
    pub window_id: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UsernameQuery {
    pub username: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SendVerificationRequest {
    pub username: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmCodeRequest {
    pub username: String,
    pub code: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    pub security_question: String,
    pub security_answer: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserResponse {
    /// Application secret generated at signup, distinct from the TOTP
    /// secret.
    pub secret: String,
    pub success_message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn password_login_request_uses_camel_case() -> Result<()> {
        let request: PasswordLoginRequest = serde_json::from_value(serde_json::json!({
            "username": "alice@example.com",
            "password": "hunter2hunter2",
            "windowId": "window-1",
        }))?;
        assert_eq!(request.window_id, "window-1");
        Ok(())
    }

    #[test]
    fn create_user_response_round_trips() -> Result<()> {
        let response = CreateUserResponse {
            secret: "KESTO-ABC".to_string(),
            success_message: "user created".to_string(),
        };
        let value = serde_json::to_value(&response)?;
        assert_eq!(value["successMessage"], "user created");
        let decoded: CreateUserResponse = serde_json::from_value(value)?;
        assert_eq!(decoded.secret, "KESTO-ABC");
        Ok(())
    }
}
