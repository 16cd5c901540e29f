//! # Kesto (multi-factor authenticated file storage)
//!
//! `kesto` is a storage backend where every account is protected by two
//! factors. Users register through a strict AND-gate (email verification
//! code plus TOTP enrollment), log in with password and TOTP to obtain a
//! time-limited session bound to one client window, and manage a per-user
//! tree of directories and files whose payloads live in an external object
//! store.
//!
//! ## Session model
//!
//! A [`session::LoginProcess`] is keyed by username, exactly one per user.
//! Password login binds it to the caller's window id; a login from a
//! different window resets it and clears verification progress, which is
//! how cross-window hijacking is rejected. Every protected operation runs
//! through [`session::SessionGate::validate`], and a failed validation
//! resets the session as a side effect.
//!
//! ## Tree model
//!
//! Directories form a forest rooted at each user's entry directory.
//! Sibling names are unique per owner, cascading deletes are breadth-first
//! and depth-capped, and file payloads are addressed by a key derived from
//! the metadata row id. Payload bytes are owned by the blob store; rows
//! reference them weakly.

pub mod api;
pub mod blob;
pub mod cli;
pub mod db;
pub mod session;
pub mod store;
pub mod totp;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        // Should be a hex string (full SHA-1 is 40 chars, but could be short)
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
