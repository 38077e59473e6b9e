//! # Key Lifecycle Manager
//!
//! The single owner of an identity's key material.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      KEY LIFECYCLE                                      │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │            setup(pw)                     unlock(pw)                    │
//! │  NO_KEYS ──────────────► UNLOCKED ◄──────────────── LOCKED             │
//! │     ▲                       │      ────────────────►   ▲ │             │
//! │     │                       │          lock()          │ │             │
//! │     │                       │                          │ │             │
//! │     │         import_backup │ (any state) ─────────────┘ │             │
//! │     └───────────────────────┴──── wipe() ────────────────┘             │
//! │                                                                         │
//! │  NO_KEYS   nothing in persistent storage                               │
//! │  LOCKED    wrapped key stored, no secret in the session                │
//! │  UNLOCKED  wrapped key stored and secret in the session                │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only this type writes to [`PersistentKeyStorage`] or [`SessionStorage`].
//! Everything else asks it for the session key at the moment of use.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::backup::KeyBackup;
use crate::crypto::{unwrap, wrap, KeyPair, PublicKey, SecretKey};
use crate::error::{Error, Result};
use crate::network::KeyDirectory;
use crate::storage::{PersistentKeyStorage, SessionStorage, StoredKeys};
use crate::CoreConfig;

/// Where an identity stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeyStatus {
    /// No key material stored
    NoKeys,
    /// Wrapped key stored, session empty
    Locked,
    /// Wrapped key stored, secret key in the session
    Unlocked,
}

/// Role of the identity, which sets the password policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityRole {
    /// A client or freelancer
    #[default]
    Member,
    /// The marketplace admin who reads disputed conversations
    Admin,
}

/// Owns one identity's keys across persistent and session storage
pub struct KeyLifecycleManager {
    identity_id: String,
    role: IdentityRole,
    persistent: Arc<dyn PersistentKeyStorage>,
    session: Arc<dyn SessionStorage>,
    directory: Arc<dyn KeyDirectory>,
    min_password_len: usize,
    failure_threshold: u32,
    failed_attempts: AtomicU32,
    unlocking: AtomicBool,
}

/// Clears the unlock flag when dropped
struct UnlockGuard<'a>(&'a AtomicBool);

impl Drop for UnlockGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl KeyLifecycleManager {
    /// Create a manager for `identity_id`
    pub fn new(
        identity_id: impl Into<String>,
        role: IdentityRole,
        persistent: Arc<dyn PersistentKeyStorage>,
        session: Arc<dyn SessionStorage>,
        directory: Arc<dyn KeyDirectory>,
        config: &CoreConfig,
    ) -> Self {
        let min_password_len = match role {
            IdentityRole::Member => config.min_password_len,
            IdentityRole::Admin => config.min_admin_password_len,
        };

        Self {
            identity_id: identity_id.into(),
            role,
            persistent,
            session,
            directory,
            min_password_len,
            failure_threshold: config.unlock_failure_threshold,
            failed_attempts: AtomicU32::new(0),
            unlocking: AtomicBool::new(false),
        }
    }

    /// Identity this manager serves
    pub fn identity_id(&self) -> &str {
        &self.identity_id
    }

    /// Role of the identity
    pub fn role(&self) -> IdentityRole {
        self.role
    }

    /// Minimum password length for this identity
    pub fn min_password_len(&self) -> usize {
        self.min_password_len
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    /// Current lifecycle state
    pub fn status(&self) -> Result<KeyStatus> {
        if self.persistent.get(&self.identity_id)?.is_none() {
            return Ok(KeyStatus::NoKeys);
        }
        if self.session.get(&self.identity_id).is_some() {
            Ok(KeyStatus::Unlocked)
        } else {
            Ok(KeyStatus::Locked)
        }
    }

    /// The unlocked secret key
    ///
    /// Fails with `SessionLocked` unless the identity is unlocked right now.
    pub fn session_key(&self) -> Result<SecretKey> {
        if self.persistent.get(&self.identity_id)?.is_none() {
            return Err(Error::NoKeys);
        }
        self.session
            .get(&self.identity_id)
            .ok_or(Error::SessionLocked)
    }

    /// The stored public key
    pub fn public_key(&self) -> Result<PublicKey> {
        Ok(self.stored()?.public_key)
    }

    /// Consecutive failed unlock attempts since the last success or import
    pub fn failed_unlock_attempts(&self) -> u32 {
        self.failed_attempts.load(Ordering::Acquire)
    }

    /// Whether enough unlocks have failed that backup restore should be offered
    pub fn should_offer_backup_restore(&self) -> bool {
        self.failed_unlock_attempts() >= self.failure_threshold
    }

    // ========================================================================
    // TRANSITIONS
    // ========================================================================

    /// Generate, wrap, store and publish a new keypair
    ///
    /// Only valid from `NO_KEYS`. Leaves the identity `UNLOCKED`. If the
    /// directory publish fails the keys stay stored locally; call
    /// [`republish`](Self::republish) to try again.
    pub async fn setup(&self, password: &str) -> Result<PublicKey> {
        self.check_password(password)?;

        if self.status()? != KeyStatus::NoKeys {
            return Err(Error::KeysAlreadyExist);
        }

        let (public_key, secret_key) = KeyPair::generate().into_parts();
        let wrapped = wrap(&secret_key, password)?;
        let record = StoredKeys::new(public_key, &wrapped);

        self.persistent.set(&self.identity_id, &record)?;
        self.session.set(&self.identity_id, secret_key);
        self.failed_attempts.store(0, Ordering::Release);

        tracing::info!(
            identity = %self.identity_id,
            fingerprint = %public_key.fingerprint(),
            "Encryption keys created"
        );

        self.publish(&record).await?;
        Ok(public_key)
    }

    /// Unwrap the stored secret key into the session
    ///
    /// A wrong password leaves the identity `LOCKED` and bumps the failure
    /// counter. A password below the policy minimum is rejected before any
    /// attempt and is not counted.
    pub fn unlock(&self, password: &str) -> Result<()> {
        let _guard = self.begin_unlock()?;

        self.check_password(password)?;

        let record = self.stored()?;
        let wrapped = record.wrapped_secret()?;

        let secret = match unwrap(&wrapped, password) {
            Ok(secret) => secret,
            Err(e) => {
                if matches!(e, Error::DecryptionFailed(_)) {
                    let attempts = self.failed_attempts.fetch_add(1, Ordering::AcqRel) + 1;
                    tracing::warn!(
                        identity = %self.identity_id,
                        attempts,
                        threshold = self.failure_threshold,
                        "Unlock failed"
                    );
                }
                return Err(e);
            }
        };

        if secret.public_key() != record.public_key {
            return Err(Error::StorageCorrupted(
                "stored public key does not belong to the stored secret key".into(),
            ));
        }

        self.session.set(&self.identity_id, secret);
        self.failed_attempts.store(0, Ordering::Release);

        tracing::info!(identity = %self.identity_id, "Encryption keys unlocked");
        Ok(())
    }

    /// Drop the secret key from the session; idempotent
    pub fn lock(&self) {
        self.session.clear(&self.identity_id);
        tracing::info!(identity = %self.identity_id, "Encryption keys locked");
    }

    /// Serialize the stored keys as a backup document
    ///
    /// Works while `LOCKED`; the secret stays password-wrapped.
    pub fn export_backup(&self) -> Result<String> {
        let record = self.stored()?;
        let json = KeyBackup::from_stored(&record, crate::time::now()).to_json()?;
        tracing::info!(identity = %self.identity_id, "Key backup exported");
        Ok(json)
    }

    /// Replace the stored keys with those from a backup document
    ///
    /// Validation happens before anything is written; on success the
    /// identity is `LOCKED` and must be unlocked with the backup's password.
    pub fn import_backup(&self, doc: &str) -> Result<()> {
        let record = KeyBackup::parse(doc)?.to_stored()?;

        self.persistent.set(&self.identity_id, &record)?;
        self.session.clear(&self.identity_id);
        self.failed_attempts.store(0, Ordering::Release);

        tracing::info!(
            identity = %self.identity_id,
            fingerprint = %record.public_key.fingerprint(),
            "Key backup imported"
        );
        Ok(())
    }

    /// Publish the stored public key to the directory again
    pub async fn republish(&self) -> Result<()> {
        let record = self.stored()?;
        self.publish(&record).await
    }

    /// Remove every trace of the keys from this device
    pub fn wipe(&self) -> Result<()> {
        self.session.clear(&self.identity_id);
        self.persistent.clear(&self.identity_id)?;
        self.failed_attempts.store(0, Ordering::Release);
        tracing::info!(identity = %self.identity_id, "Encryption keys wiped");
        Ok(())
    }

    /// End the session (logout); stored keys are kept
    pub fn teardown(&self) {
        self.session.clear(&self.identity_id);
        self.failed_attempts.store(0, Ordering::Release);
        tracing::debug!(identity = %self.identity_id, "Key session torn down");
    }

    // ========================================================================
    // HELPERS
    // ========================================================================

    fn stored(&self) -> Result<StoredKeys> {
        self.persistent
            .get(&self.identity_id)?
            .ok_or(Error::NoKeys)
    }

    fn check_password(&self, password: &str) -> Result<()> {
        if password.chars().count() < self.min_password_len {
            return Err(Error::PasswordTooShort {
                min: self.min_password_len,
            });
        }
        Ok(())
    }

    fn begin_unlock(&self) -> Result<UnlockGuard<'_>> {
        if self.unlocking.swap(true, Ordering::AcqRel) {
            return Err(Error::UnlockInProgress);
        }
        Ok(UnlockGuard(&self.unlocking))
    }

    async fn publish(&self, record: &StoredKeys) -> Result<()> {
        let result = self
            .directory
            .publish(&self.identity_id, &record.public_key, Some(&record.wrapped))
            .await;

        if let Err(ref e) = result {
            tracing::warn!(
                identity = %self.identity_id,
                error = %e,
                "Public key publish failed; keys remain stored locally"
            );
        }
        result
    }
}
