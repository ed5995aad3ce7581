//! Latest rendered digest, shared between the refresher and the router.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::digest::OutputMode;

/// Body served before the first refresh completes.
pub const PLACEHOLDER_BODY: &str = "Generating the digest. Please reload in a few moments.";

/// Shared handle to the digest state.
pub type SharedDigest = Arc<DigestState>;

/// The most recently rendered digest.
#[derive(Debug)]
pub struct DigestState {
    mode: OutputMode,
    latest: RwLock<Option<String>>,
}

impl DigestState {
    /// Create an empty state for digests in `mode`.
    pub fn new(mode: OutputMode) -> Self {
        Self {
            mode,
            latest: RwLock::new(None),
        }
    }

    /// Create a shared, empty state.
    pub fn shared(mode: OutputMode) -> SharedDigest {
        Arc::new(Self::new(mode))
    }

    /// Format of the published digest.
    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    /// Replace the published digest.
    pub async fn publish(&self, digest: String) {
        *self.latest.write().await = Some(digest);
    }

    /// The latest digest, if one has been published.
    pub async fn latest(&self) -> Option<String> {
        self.latest.read().await.clone()
    }
}
