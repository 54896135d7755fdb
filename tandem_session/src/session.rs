use std::{
    fmt,
    sync::{Arc, Mutex, PoisonError},
};

use tandem_clock::{Clock, System, UnixTime};
use thiserror::Error;
use tokio::sync::{broadcast, watch};

use crate::{
    decode::{self, DecodedIdentity},
    refresh::{RefreshCoordinator, RefreshError},
    service::{AuthService, AuthServiceError, LoginCredentials},
    store::TokenStore,
    watcher::IdentityWatcher,
    AccessToken, AuthFailure, AuthFailureKind, Password, RefreshToken, SessionConfig, Username,
};

const EVENT_CAPACITY: usize = 16;

/// Why a session ended
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum LogoutReason {
    /// The user asked to log out
    UserRequested,
    /// A new access token could not be obtained
    RefreshFailed,
    /// The stored access token had already expired when the session started
    ExpiredOnRestore,
}

/// A change in the session's lifecycle
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    /// New tokens were stored after a login or explicit assignment
    LoggedIn {
        /// The account the new access token belongs to, if it could be decoded
        username: Option<Username>,
    },
    /// The access token was replaced by a refresh
    Refreshed,
    /// The stored tokens were cleared
    LoggedOut {
        /// Why the session ended
        reason: LogoutReason,
    },
}

/// An error from a session operation
#[derive(Debug, Error)]
pub enum SessionError {
    /// The authentication service rejected or failed the request
    #[error("authentication service request failed")]
    Service(#[from] AuthServiceError),
}

/// State shared by every clone of a [`Session`] and its refresh coordinator
///
/// All writes to the token store go through here. The generation counter is
/// bumped whenever the session is replaced or ended, so that a refresh that
/// started against an older session cannot write into a newer one.
pub(crate) struct SessionCore {
    store: Arc<dyn TokenStore>,
    clock: Arc<dyn Clock + Send + Sync>,
    config: SessionConfig,
    identity: watch::Sender<Option<Arc<DecodedIdentity>>>,
    events: broadcast::Sender<SessionEvent>,
    generation: Mutex<u64>,
}

impl SessionCore {
    pub(crate) fn store(&self) -> &dyn TokenStore {
        &*self.store
    }

    /// The current generation and refresh token, read together
    ///
    /// Returns `None` when there is no access token to refresh.
    pub(crate) fn refresh_basis(&self) -> Option<(u64, Option<RefreshToken>)> {
        let generation = self.generation.lock().unwrap_or_else(PoisonError::into_inner);
        self.store.access_token()?;
        Some((*generation, self.store.refresh_token()))
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is not an error
        let _ = self.events.send(event);
    }

    fn publish_identity(&self) {
        let identity = self
            .store
            .access_token()
            .and_then(|t| decode::decode(&t))
            .map(Arc::new);

        self.identity.send_if_modified(|current| {
            if *current != identity {
                *current = identity;
                true
            } else {
                false
            }
        });
    }

    fn replace_session(&self, access_token: AccessToken, refresh_token: Option<RefreshToken>) {
        {
            let mut generation = self.generation.lock().unwrap_or_else(PoisonError::into_inner);
            *generation += 1;
            self.store.set_access_token(access_token);
            self.store.set_refresh_token(refresh_token);
        }

        self.publish_identity();
    }

    /// Stores a refreshed access token, unless the session has moved on since
    /// `generation` was read
    pub(crate) fn store_refreshed(&self, generation: u64, access_token: AccessToken) -> bool {
        {
            let current = self.generation.lock().unwrap_or_else(PoisonError::into_inner);
            if *current != generation {
                return false;
            }
            self.store.set_access_token(access_token);
        }

        self.publish_identity();
        self.emit(SessionEvent::Refreshed);
        true
    }

    /// Clears the session and signals logout
    pub(crate) fn end(&self, reason: LogoutReason) {
        {
            let mut generation = self.generation.lock().unwrap_or_else(PoisonError::into_inner);
            *generation += 1;
            self.store.clear();
        }

        tracing::info!(?reason, "session ended");
        self.publish_identity();
        self.emit(SessionEvent::LoggedOut { reason });
    }

    /// Clears the session and signals logout, unless the session has moved on
    /// since `generation` was read
    pub(crate) fn end_if_current(&self, generation: u64, reason: LogoutReason) -> bool {
        {
            let mut current = self.generation.lock().unwrap_or_else(PoisonError::into_inner);
            if *current != generation {
                return false;
            }
            *current += 1;
            self.store.clear();
        }

        tracing::info!(?reason, "session ended");
        self.publish_identity();
        self.emit(SessionEvent::LoggedOut { reason });
        true
    }
}

/// Builder for a [`Session`]
pub struct SessionBuilder {
    store: Arc<dyn TokenStore>,
    service: Arc<dyn AuthService>,
    clock: Arc<dyn Clock + Send + Sync>,
    config: SessionConfig,
}

impl fmt::Debug for SessionBuilder {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SessionBuilder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SessionBuilder {
    /// Uses a custom clock
    ///
    /// Useful for testing purposes
    pub fn with_clock(mut self, clock: impl Clock + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Uses a custom session configuration
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Starts the session
    ///
    /// Whatever the store holds from a previous run is restored. A stored
    /// access token that has already expired ends the restored session
    /// straight away.
    pub fn start(self) -> Session {
        let (identity, _) = watch::channel(None);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let core = Arc::new(SessionCore {
            store: self.store,
            clock: self.clock,
            config: self.config,
            identity,
            events,
            generation: Mutex::new(0),
        });

        if let Some(token) = core.store.access_token() {
            if decode::is_expired(Some(&token), core.clock.now()) {
                tracing::info!("stored access token has expired, discarding session");
                core.end(LogoutReason::ExpiredOnRestore);
            } else {
                tracing::debug!("restored session from token store");
            }
        }

        core.publish_identity();

        Session {
            coordinator: RefreshCoordinator::new(core.clone(), self.service.clone()),
            service: self.service,
            core,
        }
    }
}

/// The client's authentication session
///
/// This is the context object handed to request middleware, the proactive
/// refresh scheduler, and route guards. Clones share the same state.
#[derive(Clone)]
pub struct Session {
    core: Arc<SessionCore>,
    coordinator: RefreshCoordinator,
    service: Arc<dyn AuthService>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Session")
            .field("authenticated", &self.is_authenticated())
            .field("coordinator", &self.coordinator)
            .field("config", &self.core.config)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Prepares a session over the given token store and authentication service
    pub fn builder(store: Arc<dyn TokenStore>, service: Arc<dyn AuthService>) -> SessionBuilder {
        SessionBuilder {
            store,
            service,
            clock: Arc::new(System),
            config: SessionConfig::default(),
        }
    }

    /// Starts a session with the system clock and default configuration
    pub fn start(store: Arc<dyn TokenStore>, service: Arc<dyn AuthService>) -> Self {
        Self::builder(store, service).start()
    }

    /// Logs in with a username and password, replacing any current session
    pub async fn login(
        &self,
        username: Username,
        password: Password,
    ) -> Result<Option<DecodedIdentity>, SessionError> {
        let credentials = LoginCredentials { username, password };
        let tokens = self.service.login(&credentials).await?;

        self.core
            .replace_session(tokens.access_token, tokens.refresh_token);

        let identity = self.identity();
        tracing::info!(
            username = %credentials.username,
            decoded = identity.is_some(),
            "logged in"
        );
        self.core.emit(SessionEvent::LoggedIn {
            username: identity.as_ref().map(|i| i.username.clone()),
        });

        Ok(identity)
    }

    /// Stores tokens obtained some other way, replacing any current session
    pub fn set_tokens(&self, access_token: AccessToken, refresh_token: Option<RefreshToken>) {
        self.core.replace_session(access_token, refresh_token);

        let identity = self.identity();
        self.core.emit(SessionEvent::LoggedIn {
            username: identity.map(|i| i.username),
        });
    }

    /// Ends the session at the user's request
    pub fn logout(&self) {
        self.core.end(LogoutReason::UserRequested);
    }

    /// The current access token, if any
    pub fn access_token(&self) -> Option<AccessToken> {
        self.core.store.access_token()
    }

    /// The identity carried by the current access token, if it can be decoded
    pub fn identity(&self) -> Option<DecodedIdentity> {
        self.access_token().and_then(|t| decode::decode(&t))
    }

    /// Whether there is an access token that has not yet expired
    pub fn is_authenticated(&self) -> bool {
        !decode::is_expired(self.access_token().as_deref(), self.now())
    }

    /// Checks the current access token without contacting the backend
    pub fn validate(&self) -> Result<DecodedIdentity, AuthFailure> {
        let token = self
            .access_token()
            .ok_or_else(|| AuthFailure::new(AuthFailureKind::Decode, "no access token stored"))?;

        let identity = decode::try_decode(&token)?;

        if identity.is_expired_at(self.now()) {
            return Err(AuthFailure::new(
                AuthFailureKind::Expired,
                "access token has expired",
            ));
        }

        Ok(identity)
    }

    /// Returns a valid identity, refreshing first if the access token is
    /// expired or about to expire
    pub async fn authenticate(&self) -> Result<DecodedIdentity, AuthFailure> {
        let token = self.access_token();
        if token.is_none() {
            return Err(AuthFailure::new(
                AuthFailureKind::Decode,
                "no access token stored",
            ));
        }

        let threshold = self.core.config.refresh_threshold();
        if decode::expires_within(token.as_deref(), self.now(), threshold) {
            tracing::debug!("access token is due for refresh");
            self.refresh().await?;
        }

        self.validate()
    }

    /// Requests a new access token through the refresh coordinator
    pub async fn refresh(&self) -> Result<AccessToken, RefreshError> {
        self.coordinator.request_refresh().await
    }

    /// The coordinator that serializes refreshes for this session
    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    /// Watches the current identity
    ///
    /// A new watcher immediately observes the current identity.
    pub fn watch_identity(&self) -> IdentityWatcher {
        IdentityWatcher::new(self.core.identity.subscribe())
    }

    /// Subscribes to lifecycle events from this point on
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.core.events.subscribe()
    }

    /// The authentication service backing this session
    pub fn service(&self) -> &dyn AuthService {
        &*self.service
    }

    /// The token store backing this session
    pub fn store(&self) -> &dyn TokenStore {
        self.core.store()
    }

    /// The session configuration
    pub fn config(&self) -> &SessionConfig {
        &self.core.config
    }

    /// The current time according to the session's clock
    pub fn now(&self) -> UnixTime {
        self.core.clock.now()
    }
}

impl From<RefreshError> for AuthFailure {
    fn from(error: RefreshError) -> Self {
        AuthFailure::new(AuthFailureKind::RefreshFailed, error.to_string())
    }
}
