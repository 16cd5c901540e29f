//! Per-user hierarchical directory/file store.
//!
//! Directories form a forest rooted at each user's entry directory
//! (`parent_id` is NULL at the root). File rows carry a weak reference to
//! the payload in the blob store; the reference is NULL until an upload
//! completes, which is what the duplicate-cleanup pass keys on.
//!
//! Split the way the rest of the service is: [`models`] row types,
//! [`policy`] pure decisions, [`repo`] SQL, and [`service`] orchestration.

pub mod models;
pub mod policy;
pub mod repo;
pub mod service;

pub use service::TreeService;
