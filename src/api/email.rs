//! Verification-mail outbox and delivery abstractions.
//!
//! Registration enqueues rows in `email_outbox` inside the same
//! transaction that records the verification code. A background task polls
//! that table, locks a batch via `FOR UPDATE SKIP LOCKED`, and hands each
//! row to an [`EmailSender`]; rows move to `sent` on success and are
//! retried with exponential backoff and jitter until a max attempt
//! threshold, then marked `failed`.
//!
//! The default sender for local dev is [`LogEmailSender`], which logs and
//! returns `Ok(())`. [`HttpEmailSender`] posts to a transactional mail API
//! with the configured account credentials.

use anyhow::{Context, Result, anyhow};
use rand::Rng;
use reqwest::{Client, header::AUTHORIZATION};
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use sqlx::{PgPool, Row};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{Instrument, error, info, info_span};

const VERIFICATION_SUBJECT: &str = "Verify your account";

#[derive(Clone, Debug)]
pub struct EmailMessage {
    pub to_address: String,
    pub subject: String,
    pub body: String,
}

/// Delivery abstraction used by the outbox worker.
#[allow(async_fn_in_trait)]
pub trait EmailSender: Send + Sync {
    /// Deliver a message or return an error to schedule a retry.
    async fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Local dev sender that logs the payload instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

impl EmailSender for LogEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            to_address = %message.to_address,
            subject = %message.subject,
            "email outbox send stub"
        );
        Ok(())
    }
}

/// Sender backed by a transactional mail HTTP API.
pub struct HttpEmailSender {
    client: Client,
    endpoint: String,
    from: String,
    token: SecretString,
}

impl HttpEmailSender {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(endpoint: &str, from: &str, token: SecretString) -> Result<Self> {
        let client = Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .build()
            .context("failed to build mail HTTP client")?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            from: from.to_string(),
            token,
        })
    }
}

impl EmailSender for HttpEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        let span = info_span!(
            "mail.send",
            http.method = "POST",
            url = %self.endpoint,
            to_address = %message.to_address
        );
        let response = self
            .client
            .post(&self.endpoint)
            .header(
                AUTHORIZATION,
                format!("Bearer {}", self.token.expose_secret()),
            )
            .json(&json!({
                "from": self.from,
                "to": message.to_address,
                "subject": message.subject,
                "body": message.body,
            }))
            .send()
            .instrument(span)
            .await
            .context("mail API request failed")?;

        if !response.status().is_success() {
            return Err(anyhow!("mail API rejected message: {}", response.status()));
        }
        Ok(())
    }
}

/// Runtime-selected mail backend.
pub enum EmailBackend {
    Log(LogEmailSender),
    Http(HttpEmailSender),
}

impl EmailSender for EmailBackend {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        match self {
            Self::Log(sender) => sender.send(message).await,
            Self::Http(sender) => sender.send(message).await,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct EmailWorkerConfig {
    poll_interval: Duration,
    batch_size: usize,
    max_attempts: u32,
    backoff_base: Duration,
    backoff_max: Duration,
}

impl EmailWorkerConfig {
    /// 5s poll interval, 10 messages per batch, 5 attempts, 5s->5m backoff.
    #[must_use]
    pub fn new() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            batch_size: 10,
            max_attempts: 5,
            backoff_base: Duration::from_secs(5),
            backoff_max: Duration::from_secs(300),
        }
    }
}

impl Default for EmailWorkerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Enqueue the verification mail inside the caller's transaction, so code
/// row and outbox row land together or not at all.
///
/// # Errors
/// Returns an error if the insertion fails.
pub(crate) async fn enqueue_verification_email(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    to_address: &str,
    code: &str,
) -> Result<()> {
    let query = r"
        INSERT INTO email_outbox (to_address, subject, body)
        VALUES ($1, $2, $3)
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(to_address)
        .bind(VERIFICATION_SUBJECT)
        .bind(format!("Your verification code is {code}"))
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to enqueue verification email")?;
    Ok(())
}

/// Spawn the background task that drains the outbox.
pub fn spawn_outbox_worker(
    pool: PgPool,
    sender: EmailBackend,
    config: EmailWorkerConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if let Err(err) = process_outbox_batch(&pool, &sender, &config).await {
                error!("email outbox batch failed: {err:#}");
            }
            sleep(config.poll_interval).await;
        }
    })
}

async fn process_outbox_batch(
    pool: &PgPool,
    sender: &EmailBackend,
    config: &EmailWorkerConfig,
) -> Result<usize> {
    let mut tx = pool
        .begin()
        .await
        .context("failed to start email outbox transaction")?;

    // Lock the batch so multiple workers never double-send a row.
    let query = r"
        SELECT id, to_address, subject, body, attempts
        FROM email_outbox
        WHERE status = 'pending'
          AND next_attempt_at <= NOW()
        ORDER BY next_attempt_at ASC, created_at ASC
        LIMIT $1
        FOR UPDATE SKIP LOCKED
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(i64::try_from(config.batch_size).unwrap_or(0))
        .fetch_all(&mut *tx)
        .instrument(span)
        .await
        .context("failed to load email outbox batch")?;

    if rows.is_empty() {
        tx.commit()
            .await
            .context("failed to commit empty outbox batch")?;
        return Ok(0);
    }

    let row_count = rows.len();
    for row in rows {
        let id: i64 = row.get("id");
        let attempts: i32 = row.get("attempts");
        let attempts = u32::try_from(attempts).unwrap_or(0);
        let message = EmailMessage {
            to_address: row.get("to_address"),
            subject: row.get("subject"),
            body: row.get("body"),
        };

        let send_result = sender.send(&message).await;
        update_outbox_status(&mut tx, id, attempts, send_result, config).await?;
    }

    tx.commit()
        .await
        .context("failed to commit email outbox batch")?;

    Ok(row_count)
}

async fn update_outbox_status(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: i64,
    attempts: u32,
    send_result: Result<()>,
    config: &EmailWorkerConfig,
) -> Result<()> {
    let next_attempt = attempts.saturating_add(1);
    let next_attempt_i32 = i32::try_from(next_attempt).unwrap_or(i32::MAX);
    match send_result {
        Ok(()) => {
            let query = r"
                UPDATE email_outbox
                SET status = 'sent',
                    attempts = $2,
                    last_error = NULL,
                    sent_at = NOW()
                WHERE id = $1
            ";
            sqlx::query(query)
                .bind(id)
                .bind(next_attempt_i32)
                .execute(&mut **tx)
                .await
                .context("failed to mark outbox row sent")?;
        }
        Err(err) if next_attempt >= config.max_attempts => {
            let query = r"
                UPDATE email_outbox
                SET status = 'failed',
                    attempts = $2,
                    last_error = $3
                WHERE id = $1
            ";
            sqlx::query(query)
                .bind(id)
                .bind(next_attempt_i32)
                .bind(err.to_string())
                .execute(&mut **tx)
                .await
                .context("failed to mark outbox row failed")?;
        }
        Err(err) => {
            let delay = backoff_delay(next_attempt, config.backoff_base, config.backoff_max);
            let delay_ms = i64::try_from(delay.as_millis()).unwrap_or(i64::MAX);
            let query = r"
                UPDATE email_outbox
                SET status = 'pending',
                    attempts = $2,
                    last_error = $3,
                    next_attempt_at = NOW() + ($4 * INTERVAL '1 millisecond')
                WHERE id = $1
            ";
            sqlx::query(query)
                .bind(id)
                .bind(next_attempt_i32)
                .bind(err.to_string())
                .bind(delay_ms)
                .execute(&mut **tx)
                .await
                .context("failed to schedule outbox retry")?;
        }
    }
    Ok(())
}

/// Exponential backoff capped at `max`, with half the delay randomized to
/// spread retries out.
fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let shift = attempt.saturating_sub(1).min(31);
    let capped = base.checked_mul(1 << shift).unwrap_or(max).min(max);
    let millis = u64::try_from(capped.as_millis()).unwrap_or(u64::MAX);
    if millis < 2 {
        return capped;
    }
    let half = millis / 2;
    Duration::from_millis(half + rand::thread_rng().gen_range(0..=half))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn log_sender_accepts_messages() -> Result<()> {
        let sender = LogEmailSender;
        sender
            .send(&EmailMessage {
                to_address: "alice@example.com".to_string(),
                subject: VERIFICATION_SUBJECT.to_string(),
                body: "Your verification code is 123456".to_string(),
            })
            .await
    }

    #[test]
    fn backoff_grows_and_caps() {
        let base = Duration::from_secs(5);
        let max = Duration::from_secs(300);

        let first = backoff_delay(1, base, max);
        assert!(first >= base / 2);
        assert!(first <= base);

        let late = backoff_delay(30, base, max);
        assert!(late >= max / 2);
        assert!(late <= max);
    }

    #[test]
    fn backoff_handles_tiny_bases() {
        let delay = backoff_delay(1, Duration::from_millis(1), Duration::from_millis(1));
        assert_eq!(delay, Duration::from_millis(1));
    }

    #[test]
    fn worker_config_defaults() {
        let config = EmailWorkerConfig::new();
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.max_attempts, 5);
        assert!(config.backoff_base <= config.backoff_max);
    }
}
