//! Runtime configuration assembled from CLI flags and environment.

use secrecy::SecretString;

/// S3-compatible gateway holding file payloads.
#[derive(Debug, Clone)]
pub struct BlobGatewayConfig {
    pub endpoint: String,
    pub bucket: String,
    pub token: SecretString,
}

/// Transactional mail API account for verification codes.
#[derive(Debug, Clone)]
pub struct MailAccountConfig {
    pub endpoint: String,
    pub from: String,
    pub token: SecretString,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub dsn: String,
    /// `None` falls back to the in-memory blob store (development only).
    pub blob: Option<BlobGatewayConfig>,
    /// `None` falls back to the logging mail sender (development only).
    pub mail: Option<MailAccountConfig>,
    /// Skip session validation on protected routes. Development switch,
    /// never a silent default.
    pub bypass_sessions: bool,
    /// Demand the reserved biometric factor during session validation.
    pub require_biometric: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn secrets_are_redacted_in_debug_output() {
        let config = BlobGatewayConfig {
            endpoint: "https://blobs.internal:9000".to_string(),
            bucket: "kesto".to_string(),
            token: SecretString::from("super-secret"),
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
        assert_eq!(config.token.expose_secret(), "super-secret");
    }
}
