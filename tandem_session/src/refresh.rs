//! Single-flight access token refresh
//!
//! Any number of callers may ask for a refresh at the same time, for example
//! when several requests come back unauthorized together. Only the first
//! caller starts a call to the refresh endpoint. Everyone who asks while that
//! call is in flight joins the same batch, and the whole batch is resolved
//! with the one outcome once the call completes.
//!
//! On success the new access token is stored before any caller is woken. On
//! failure the session is cleared and logout is signalled once for the batch,
//! and then every caller receives the failure.

use std::{
    fmt, mem,
    sync::{Arc, Mutex, PoisonError},
};

use thiserror::Error;
use tokio::sync::oneshot;

use crate::{
    service::{AuthService, AuthServiceError},
    session::{LogoutReason, SessionCore},
    AccessToken, RefreshToken,
};

/// An error while refreshing the access token
///
/// Every caller in a batch receives a clone of the same error.
#[derive(Clone, Debug, Error)]
pub enum RefreshError {
    /// The authentication service refused or failed the refresh
    #[error("refresh rejected by authentication service")]
    Rejected(#[source] Arc<AuthServiceError>),
    /// The refresh call stopped without producing an outcome
    #[error("refresh attempt was abandoned before completing")]
    Abandoned,
    /// The session was logged out or replaced while the refresh was in flight
    #[error("session ended while refresh was in flight")]
    SessionEnded,
}

type Waiter = oneshot::Sender<Result<AccessToken, RefreshError>>;

enum RefreshState {
    Idle,
    Refreshing { waiters: Vec<Waiter> },
}

/// A point-in-time view of the coordinator
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshStatus {
    /// No refresh is in flight
    Idle,
    /// A refresh is in flight with this many callers waiting on it
    Refreshing {
        /// Number of callers waiting on the in-flight refresh
        waiters: usize,
    },
}

/// Coordinates access token refreshes so that at most one is in flight
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    core: Arc<SessionCore>,
    service: Arc<dyn AuthService>,
    state: Mutex<RefreshState>,
}

impl fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("status", &self.status())
            .finish()
    }
}

impl RefreshCoordinator {
    pub(crate) fn new(core: Arc<SessionCore>, service: Arc<dyn AuthService>) -> Self {
        Self {
            inner: Arc::new(Inner {
                core,
                service,
                state: Mutex::new(RefreshState::Idle),
            }),
        }
    }

    /// Reports whether a refresh is in flight and how many callers wait on it
    pub fn status(&self) -> RefreshStatus {
        match &*self.inner.lock_state() {
            RefreshState::Idle => RefreshStatus::Idle,
            RefreshState::Refreshing { waiters } => RefreshStatus::Refreshing {
                waiters: waiters.len(),
            },
        }
    }

    /// Requests a new access token
    ///
    /// Starts a refresh if none is in flight, otherwise joins the one that is.
    /// Resolves once that refresh completes.
    ///
    /// With no access token there is no session to refresh. The request fails
    /// with [`RefreshError::SessionEnded`] without calling the service.
    pub async fn request_refresh(&self) -> Result<AccessToken, RefreshError> {
        let (tx, rx) = oneshot::channel();

        let start = {
            let mut state = self.inner.lock_state();
            match &mut *state {
                RefreshState::Idle => {
                    let Some(basis) = self.inner.core.refresh_basis() else {
                        tracing::debug!("no session to refresh");
                        return Err(RefreshError::SessionEnded);
                    };
                    *state = RefreshState::Refreshing { waiters: vec![tx] };
                    Some(basis)
                }
                RefreshState::Refreshing { waiters } => {
                    waiters.push(tx);
                    None
                }
            }
        };

        if let Some((generation, refresh_token)) = start {
            tracing::debug!("starting access token refresh");
            tokio::spawn(self.inner.clone().run(generation, refresh_token));
        } else {
            tracing::debug!("access token refresh already in flight, waiting on it");
        }

        rx.await.unwrap_or(Err(RefreshError::Abandoned))
    }
}

impl Inner {
    fn lock_state(&self) -> std::sync::MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run(self: Arc<Self>, generation: u64, refresh_token: Option<RefreshToken>) {
        let service = self.service.clone();
        let call = tokio::spawn(async move { service.refresh(refresh_token.as_deref()).await });

        let outcome = match call.await {
            Ok(Ok(token)) => {
                if self.core.store_refreshed(generation, token.clone()) {
                    tracing::info!("access token refreshed");
                    Ok(token)
                } else {
                    tracing::info!("session changed during refresh, discarding refreshed token");
                    Err(RefreshError::SessionEnded)
                }
            }
            Ok(Err(error)) => {
                tracing::warn!(
                    error = (&error as &dyn std::error::Error),
                    "access token refresh failed"
                );
                self.fail(generation, RefreshError::Rejected(Arc::new(error)))
            }
            Err(error) => {
                tracing::error!(
                    error = (&error as &dyn std::error::Error),
                    "access token refresh task did not complete"
                );
                self.fail(generation, RefreshError::Abandoned)
            }
        };

        let waiters = match mem::replace(&mut *self.lock_state(), RefreshState::Idle) {
            RefreshState::Refreshing { waiters } => waiters,
            RefreshState::Idle => Vec::new(),
        };

        tracing::debug!(
            waiters = waiters.len(),
            success = outcome.is_ok(),
            "resolving refresh waiters"
        );

        for waiter in waiters {
            // A waiter that went away no longer cares about the outcome
            let _ = waiter.send(outcome.clone());
        }
    }

    fn fail(&self, generation: u64, error: RefreshError) -> Result<AccessToken, RefreshError> {
        if self
            .core
            .end_if_current(generation, LogoutReason::RefreshFailed)
        {
            Err(error)
        } else {
            Err(RefreshError::SessionEnded)
        }
    }
}
