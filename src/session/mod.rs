//! Login session state machine.
//!
//! Each user has at most one [`LoginProcess`], keyed by username and bound
//! to a client-chosen window identifier. The flow is
//! `NoSession → PasswordVerified → TwoFactorVerified`; a reserved biometric
//! flag acts as an optional third gate behind
//! [`SessionPolicy::require_biometric`].
//!
//! Two rules shape everything here:
//!
//! - **Replace on conflict.** A password login from a different window
//!   rebinds the session to that window and clears all verification flags,
//!   invalidating any in-progress verification elsewhere.
//! - **Reset on failed validation.** When an existing session fails the
//!   authorization gate (window mismatch, expiry, unverified factor), it is
//!   reset and rebound to the *presented* window id. A single bad probe
//!   therefore invalidates a legitimate in-flight session; callers depend
//!   on this behavior and it must not be relaxed here.
//!
//! The two-factor submission window (600s) and the validation window
//! (6000s) are deliberately separate policy knobs.

mod store;

pub use store::{MemorySessionStore, PgSessionStore, SessionStore};

use anyhow::Result;
use chrono::{DateTime, Utc};

const DEFAULT_TWO_FACTOR_TIMEOUT_SECONDS: i64 = 600;
const DEFAULT_VALIDATE_TIMEOUT_SECONDS: i64 = 6000;

/// The per-user authentication attempt record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoginProcess {
    pub username: String,
    pub window_id: String,
    pub two_factor_verified: bool,
    pub biometric_verified: bool,
    pub created_at: DateTime<Utc>,
}

impl LoginProcess {
    #[must_use]
    pub fn new(username: &str, window_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            username: username.to_string(),
            window_id: window_id.to_string(),
            two_factor_verified: false,
            biometric_verified: false,
            created_at: now,
        }
    }

    /// Rebind to a window id and drop all verification progress.
    pub fn reset(&mut self, window_id: &str, now: DateTime<Utc>) {
        self.window_id = window_id.to_string();
        self.two_factor_verified = false;
        self.biometric_verified = false;
        self.created_at = now;
    }

    fn age_seconds(&self, now: DateTime<Utc>) -> i64 {
        now.signed_duration_since(self.created_at).num_seconds()
    }
}

/// Expiry windows and the optional third verification gate.
#[derive(Clone, Copy, Debug)]
pub struct SessionPolicy {
    two_factor_timeout_seconds: i64,
    validate_timeout_seconds: i64,
    require_biometric: bool,
}

impl SessionPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self {
            two_factor_timeout_seconds: DEFAULT_TWO_FACTOR_TIMEOUT_SECONDS,
            validate_timeout_seconds: DEFAULT_VALIDATE_TIMEOUT_SECONDS,
            require_biometric: false,
        }
    }

    #[must_use]
    pub fn with_two_factor_timeout_seconds(mut self, seconds: i64) -> Self {
        self.two_factor_timeout_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_validate_timeout_seconds(mut self, seconds: i64) -> Self {
        self.validate_timeout_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_require_biometric(mut self, required: bool) -> Self {
        self.require_biometric = required;
        self
    }

    #[must_use]
    pub fn two_factor_timeout_seconds(&self) -> i64 {
        self.two_factor_timeout_seconds
    }

    #[must_use]
    pub fn validate_timeout_seconds(&self) -> i64 {
        self.validate_timeout_seconds
    }

    #[must_use]
    pub fn require_biometric(&self) -> bool {
        self.require_biometric
    }
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of presenting a two-factor code for an ongoing login.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TwoFactorAttempt {
    /// No login process exists for the user.
    NoSession,
    /// The login process outlived the two-factor window and was reset.
    Expired,
    /// The flag is already set; submitting again is a successful no-op.
    AlreadyVerified,
    /// The caller should verify the code and then confirm.
    Ready,
}

/// State machine operations over a [`SessionStore`].
///
/// Every method takes an explicit `now` so expiry is driven by the caller's
/// clock and testable with simulated time.
pub struct SessionGate<S> {
    store: S,
    policy: SessionPolicy,
}

impl<S: SessionStore> SessionGate<S> {
    #[must_use]
    pub fn new(store: S, policy: SessionPolicy) -> Self {
        Self { store, policy }
    }

    #[must_use]
    pub fn policy(&self) -> &SessionPolicy {
        &self.policy
    }

    /// Record a successful password check.
    ///
    /// Creates the login process when none exists, resets it when it is
    /// bound to a different window, and leaves it untouched (even when
    /// stale or already verified) when the window matches.
    ///
    /// # Errors
    /// Returns an error if the session store fails.
    pub async fn password_verified(
        &self,
        username: &str,
        window_id: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        match self.store.load(username).await? {
            None => {
                self.store
                    .put(&LoginProcess::new(username, window_id, now))
                    .await
            }
            Some(mut process) if process.window_id != window_id => {
                process.reset(window_id, now);
                self.store.put(&process).await
            }
            Some(_) => Ok(()),
        }
    }

    /// Gate a two-factor code submission.
    ///
    /// Expiry uses the short two-factor window; an expired process is reset
    /// to the presented window id as a side effect.
    ///
    /// # Errors
    /// Returns an error if the session store fails.
    pub async fn two_factor_attempt(
        &self,
        username: &str,
        window_id: &str,
        now: DateTime<Utc>,
    ) -> Result<TwoFactorAttempt> {
        let Some(mut process) = self.store.load(username).await? else {
            return Ok(TwoFactorAttempt::NoSession);
        };
        if process.age_seconds(now) > self.policy.two_factor_timeout_seconds {
            process.reset(window_id, now);
            self.store.put(&process).await?;
            return Ok(TwoFactorAttempt::Expired);
        }
        if process.two_factor_verified {
            return Ok(TwoFactorAttempt::AlreadyVerified);
        }
        Ok(TwoFactorAttempt::Ready)
    }

    /// Set the two-factor flag after the submitted code checked out.
    ///
    /// # Errors
    /// Returns an error if the session store fails.
    pub async fn confirm_two_factor(&self, username: &str) -> Result<()> {
        self.store.set_two_factor_verified(username).await
    }

    /// Authorization gate for every protected operation.
    ///
    /// Fails when there is no session, the window id differs, the session
    /// outlived the validation window, the two-factor flag is unset, or the
    /// biometric flag is unset while the policy requires it. Any failure on
    /// an existing session resets it, rebound to the presented window id.
    ///
    /// # Errors
    /// Returns an error if the session store fails.
    pub async fn validate(
        &self,
        username: &str,
        window_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let Some(mut process) = self.store.load(username).await? else {
            return Ok(false);
        };

        let rejected = process.window_id != window_id
            || process.age_seconds(now) > self.policy.validate_timeout_seconds
            || !process.two_factor_verified
            || (self.policy.require_biometric && !process.biometric_verified);

        if rejected {
            process.reset(window_id, now);
            self.store.put(&process).await?;
            return Ok(false);
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn gate() -> SessionGate<MemorySessionStore> {
        SessionGate::new(MemorySessionStore::new(), SessionPolicy::new())
    }

    #[tokio::test]
    async fn password_then_two_factor_validates() -> Result<()> {
        let gate = gate();
        let now = t0();

        gate.password_verified("alice", "window-1", now).await?;
        assert_eq!(
            gate.two_factor_attempt("alice", "window-1", now).await?,
            TwoFactorAttempt::Ready
        );
        gate.confirm_two_factor("alice").await?;

        assert!(gate.validate("alice", "window-1", now).await?);
        Ok(())
    }

    #[tokio::test]
    async fn window_change_clears_verification() -> Result<()> {
        let gate = gate();
        let now = t0();

        gate.password_verified("alice", "window-1", now).await?;
        gate.confirm_two_factor("alice").await?;

        // A login from another window rebinds the session and drops the
        // two-factor progress made in the first window.
        gate.password_verified("alice", "window-2", now).await?;
        assert!(!gate.validate("alice", "window-1", now).await?);
        Ok(())
    }

    #[tokio::test]
    async fn same_window_login_is_idempotent() -> Result<()> {
        let store = MemorySessionStore::new();
        let gate = SessionGate::new(store, SessionPolicy::new());
        let now = t0();

        gate.password_verified("alice", "window-1", now).await?;
        gate.confirm_two_factor("alice").await?;
        gate.password_verified("alice", "window-1", now + Duration::seconds(5))
            .await?;

        // Still verified: a repeated password login from the same window
        // does not restart the process.
        assert!(
            gate.validate("alice", "window-1", now + Duration::seconds(5))
                .await?
        );
        Ok(())
    }

    #[tokio::test]
    async fn validate_expires_after_validation_window() -> Result<()> {
        let gate = gate();
        let now = t0();

        gate.password_verified("alice", "window-1", now).await?;
        gate.confirm_two_factor("alice").await?;

        let late = now + Duration::seconds(6001);
        assert!(!gate.validate("alice", "window-1", late).await?);

        // The failed validation reset the session: even a retry at the
        // original window must now go through two-factor again.
        assert!(!gate.validate("alice", "window-1", late).await?);
        assert_eq!(
            gate.two_factor_attempt("alice", "window-1", late).await?,
            TwoFactorAttempt::Ready
        );
        Ok(())
    }

    #[tokio::test]
    async fn validate_just_inside_window_passes() -> Result<()> {
        let gate = gate();
        let now = t0();

        gate.password_verified("alice", "window-1", now).await?;
        gate.confirm_two_factor("alice").await?;

        assert!(
            gate.validate("alice", "window-1", now + Duration::seconds(6000))
                .await?
        );
        Ok(())
    }

    #[tokio::test]
    async fn two_factor_expires_after_short_window() -> Result<()> {
        let gate = gate();
        let now = t0();

        gate.password_verified("alice", "window-1", now).await?;
        assert_eq!(
            gate.two_factor_attempt("alice", "window-1", now + Duration::seconds(601))
                .await?,
            TwoFactorAttempt::Expired
        );
        Ok(())
    }

    #[tokio::test]
    async fn two_factor_without_session() -> Result<()> {
        let gate = gate();
        assert_eq!(
            gate.two_factor_attempt("alice", "window-1", t0()).await?,
            TwoFactorAttempt::NoSession
        );
        Ok(())
    }

    #[tokio::test]
    async fn repeated_two_factor_is_a_noop() -> Result<()> {
        let gate = gate();
        let now = t0();

        gate.password_verified("alice", "window-1", now).await?;
        gate.confirm_two_factor("alice").await?;
        assert_eq!(
            gate.two_factor_attempt("alice", "window-1", now).await?,
            TwoFactorAttempt::AlreadyVerified
        );
        Ok(())
    }

    #[tokio::test]
    async fn wrong_window_probe_resets_active_session() -> Result<()> {
        let gate = gate();
        let now = t0();

        gate.password_verified("alice", "window-1", now).await?;
        gate.confirm_two_factor("alice").await?;
        assert!(gate.validate("alice", "window-1", now).await?);

        // A probe with the wrong window id denies access and, by design,
        // resets the legitimate session to the probe's window.
        assert!(!gate.validate("alice", "intruder", now).await?);
        assert!(!gate.validate("alice", "window-1", now).await?);
        Ok(())
    }

    #[tokio::test]
    async fn validate_without_session_does_not_create_one() -> Result<()> {
        let store = MemorySessionStore::new();
        let gate = SessionGate::new(store, SessionPolicy::new());

        assert!(!gate.validate("alice", "window-1", t0()).await?);
        assert_eq!(gate.store.len().await, 0);
        Ok(())
    }

    #[tokio::test]
    async fn one_process_per_user() -> Result<()> {
        let store = MemorySessionStore::new();
        let gate = SessionGate::new(store, SessionPolicy::new());
        let now = t0();

        gate.password_verified("alice", "window-1", now).await?;
        gate.password_verified("alice", "window-2", now).await?;
        gate.password_verified("alice", "window-3", now).await?;

        assert_eq!(gate.store.len().await, 1);
        let process = gate.store.load("alice").await?.expect("process exists");
        assert_eq!(process.window_id, "window-3");
        assert!(!process.two_factor_verified);
        Ok(())
    }

    #[tokio::test]
    async fn biometric_gate_fails_closed_when_required() -> Result<()> {
        let gate = SessionGate::new(
            MemorySessionStore::new(),
            SessionPolicy::new().with_require_biometric(true),
        );
        let now = t0();

        gate.password_verified("alice", "window-1", now).await?;
        gate.confirm_two_factor("alice").await?;

        // Nothing sets the biometric flag, so a policy that requires it
        // rejects every validation.
        assert!(!gate.validate("alice", "window-1", now).await?);
        Ok(())
    }

    #[test]
    fn policy_defaults_and_overrides() {
        let policy = SessionPolicy::new();
        assert_eq!(policy.two_factor_timeout_seconds(), 600);
        assert_eq!(policy.validate_timeout_seconds(), 6000);
        assert!(!policy.require_biometric());

        let policy = policy
            .with_two_factor_timeout_seconds(30)
            .with_validate_timeout_seconds(60)
            .with_require_biometric(true);
        assert_eq!(policy.two_factor_timeout_seconds(), 30);
        assert_eq!(policy.validate_timeout_seconds(), 60);
        assert!(policy.require_biometric());
    }
}
