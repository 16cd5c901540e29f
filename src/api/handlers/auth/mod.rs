//! Authentication and registration handlers.
//!
//! Registration is a strict AND-gate, not a state machine: a user row is
//! created only once the email verification row and the TOTP enrollment
//! row are both marked verified and no user row exists yet. Login is the
//! two-step password → two-factor flow driven by the session state machine
//! in [`crate::session`].

pub(crate) mod login;
pub(crate) mod registration;
pub(crate) mod storage;
pub(crate) mod types;
mod utils;
