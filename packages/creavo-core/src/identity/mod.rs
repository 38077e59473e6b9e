//! # Identity Module
//!
//! Key ownership for one marketplace user.
//!
//! - [`KeyLifecycleManager`] decides whether the identity can encrypt and
//!   decrypt right now, and is the only writer of key storage.
//! - [`KeyBackup`] is the portable, password-protected export format.

mod backup;
mod manager;

pub use backup::{KeyBackup, BACKUP_VERSION};
pub use manager::{IdentityRole, KeyLifecycleManager, KeyStatus};
