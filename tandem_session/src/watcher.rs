use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;

use crate::DecodedIdentity;

/// The session that published identities has been dropped
#[derive(Clone, Copy, Debug, Error)]
#[error("session was dropped, no further identities will be published")]
pub struct SessionClosed;

/// A watcher that can be used to observe the session's current identity
///
/// The watcher always holds the most recently published value, so a watcher
/// created after login sees the logged-in identity straight away.
#[derive(Clone, Debug)]
pub struct IdentityWatcher {
    watcher: watch::Receiver<Option<Arc<DecodedIdentity>>>,
}

impl IdentityWatcher {
    pub(crate) fn new(watcher: watch::Receiver<Option<Arc<DecodedIdentity>>>) -> Self {
        Self { watcher }
    }

    /// The current identity, or `None` while logged out
    pub fn current(&self) -> Option<Arc<DecodedIdentity>> {
        self.watcher.borrow().clone()
    }

    /// Waits for the next identity change and returns the new value
    ///
    /// If the session is ever dropped, this returns an error indicating that
    /// no new identities will be published.
    pub async fn changed(&mut self) -> Result<Option<Arc<DecodedIdentity>>, SessionClosed> {
        self.watcher.changed().await.map_err(|_| SessionClosed)?;
        Ok(self.watcher.borrow_and_update().clone())
    }
}
