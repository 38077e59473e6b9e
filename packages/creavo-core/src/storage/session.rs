//! In-memory session storage.

use parking_lot::RwLock;

use super::SessionStorage;
use crate::crypto::SecretKey;

/// The process-wide session slot
///
/// Holds at most one unlocked secret key. Storing a key for another identity
/// evicts the resident one, and evicted keys are dropped immediately, which
/// zeroizes them.
#[derive(Default)]
pub struct MemorySessionStore {
    slot: RwLock<Option<(String, SecretKey)>>,
}

impl MemorySessionStore {
    /// Create an empty session store
    pub fn new() -> Self {
        Self::default()
    }

    /// Identity whose key is resident, if any
    pub fn resident(&self) -> Option<String> {
        self.slot.read().as_ref().map(|(id, _)| id.clone())
    }
}

impl SessionStorage for MemorySessionStore {
    fn get(&self, identity_id: &str) -> Option<SecretKey> {
        self.slot
            .read()
            .as_ref()
            .filter(|(id, _)| id == identity_id)
            .map(|(_, secret)| secret.clone())
    }

    fn set(&self, identity_id: &str, secret: SecretKey) {
        let evicted = self.slot.write().replace((identity_id.to_string(), secret));
        if let Some((previous, _)) = evicted {
            if previous != identity_id {
                tracing::debug!(evicted = %previous, identity = %identity_id, "Session slot replaced");
            }
        }
    }

    fn clear(&self, identity_id: &str) {
        let mut slot = self.slot.write();
        if slot.as_ref().is_some_and(|(id, _)| id == identity_id) {
            *slot = None;
        }
    }
}
