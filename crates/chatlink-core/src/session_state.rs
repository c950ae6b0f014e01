//! Session state shared by the lifecycle manager and the watermark tracker.

use std::sync::{Arc, Mutex};

use crate::{Credential, SessionStorage};

/// Storage key holding the last seen activity id.
pub const WATERMARK_STORAGE_KEY: &str = "watermark";

#[derive(Debug, Default)]
struct SessionStateInner {
    credential: Option<Credential>,
    watermark: Option<String>,
}

/// Current credential and watermark for one chat session.
///
/// Shared as `Arc<SessionState>`; the watermark is mirrored into the
/// session-scoped storage so it survives transport recreation.
pub struct SessionState {
    storage: Arc<dyn SessionStorage>,
    inner: Mutex<SessionStateInner>,
}

impl SessionState {
    /// Builds state over `storage`, picking up a previously stored watermark.
    pub fn new(storage: Arc<dyn SessionStorage>) -> Self {
        let watermark = storage
            .get(WATERMARK_STORAGE_KEY)
            .filter(|value| !value.is_empty());
        Self {
            storage,
            inner: Mutex::new(SessionStateInner {
                credential: None,
                watermark,
            }),
        }
    }

    pub fn credential(&self) -> Option<Credential> {
        self.inner
            .lock()
            .ok()
            .and_then(|inner| inner.credential.clone())
    }

    /// Swaps in a freshly obtained credential, returning the superseded one.
    pub fn replace_credential(&self, credential: Credential) -> Option<Credential> {
        match self.inner.lock() {
            Ok(mut inner) => inner.credential.replace(credential),
            Err(_) => None,
        }
    }

    pub fn watermark(&self) -> Option<String> {
        self.inner
            .lock()
            .ok()
            .and_then(|inner| inner.watermark.clone())
    }

    /// Records `activity_id` as the new watermark (last write wins).
    ///
    /// Returns `false` and leaves the watermark alone for blank ids. A storage
    /// failure is logged; the in-memory watermark is still advanced.
    pub fn record_watermark(&self, activity_id: &str) -> bool {
        if activity_id.is_empty() {
            return false;
        }
        match self.inner.lock() {
            Ok(mut inner) => inner.watermark = Some(activity_id.to_string()),
            Err(_) => return false,
        }
        if let Err(error) = self.storage.set(WATERMARK_STORAGE_KEY, activity_id) {
            tracing::warn!(
                watermark = activity_id,
                error = %error,
                "failed to persist chat watermark"
            );
        }
        true
    }
}

impl std::fmt::Debug for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionState")
            .field("has_credential", &self.credential().is_some())
            .field("watermark", &self.watermark())
            .finish()
    }
}
