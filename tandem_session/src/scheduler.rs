use std::time::Duration;

use tokio::{
    sync::oneshot,
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};

use crate::{decode, Session};

/// What a single scheduler tick did
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// There is no access token to keep fresh
    NoSession,
    /// The access token is not yet due for refresh
    Fresh,
    /// The access token was refreshed
    Refreshed,
    /// The refresh failed and the session has been ended
    Failed,
}

/// Refreshes the access token ahead of its expiry on a fixed timer
#[derive(Clone, Debug)]
pub struct ProactiveRefreshScheduler {
    session: Session,
}

impl ProactiveRefreshScheduler {
    /// Constructs a scheduler for the given session
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    /// Spawns the periodic refresh loop
    ///
    /// The first tick happens one full interval after spawning. The loop runs
    /// until the returned handle is shut down or dropped.
    pub fn spawn(self) -> SchedulerHandle {
        let config = self.session.config();
        let lifetime = Duration::from(config.access_token_lifetime());
        if config.refresh_interval() >= lifetime {
            tracing::warn!(
                interval_ms = config.refresh_interval().as_millis() as u64,
                lifetime_secs = lifetime.as_secs(),
                "refresh interval is not shorter than the access token lifetime, \
                 tokens may expire between refreshes"
            );
        }

        let (quit_tx, quit_rx) = oneshot::channel();
        let join = tokio::spawn(self.forever_refresh(quit_rx));

        SchedulerHandle {
            quit: Some(quit_tx),
            join: Some(join),
        }
    }

    async fn forever_refresh(self, mut quit: oneshot::Receiver<()>) {
        let period = self.session.config().refresh_interval();
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::debug!(
            interval_ms = period.as_millis() as u64,
            "proactive refresh scheduler started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick().await;
                }
                _ = &mut quit => {
                    tracing::debug!("proactive refresh scheduler stopping");
                    return;
                }
            }
        }
    }

    /// Runs one scheduler check
    ///
    /// Refreshes if there is an access token that is expired or within the
    /// configured refresh threshold of expiring.
    pub async fn tick(&self) -> TickOutcome {
        let token = match self.session.access_token() {
            Some(token) => token,
            None => {
                tracing::trace!("no session to keep fresh");
                return TickOutcome::NoSession;
            }
        };

        let now = self.session.now();
        let threshold = self.session.config().refresh_threshold();

        if !decode::expires_within(Some(&token), now, threshold) {
            tracing::trace!("access token not yet due for refresh");
            return TickOutcome::Fresh;
        }

        tracing::debug!("access token due for refresh, refreshing ahead of expiry");
        match self.session.refresh().await {
            Ok(_) => TickOutcome::Refreshed,
            Err(error) => {
                // The coordinator has already cleared the session and signalled logout
                tracing::warn!(
                    error = (&error as &dyn std::error::Error),
                    "proactive refresh failed"
                );
                TickOutcome::Failed
            }
        }
    }

    /// Makes sure there is a usable access token before a sensitive operation
    ///
    /// Refreshes first if the token is expired or about to expire. Resolves to
    /// `false` if there is no session or the refresh failed.
    pub async fn ensure_valid_token(&self) -> bool {
        match self.session.authenticate().await {
            Ok(_) => true,
            Err(failure) => {
                tracing::debug!(%failure, "no valid access token available");
                false
            }
        }
    }
}

/// A handle to a running [`ProactiveRefreshScheduler`] loop
///
/// Dropping the handle stops the loop.
#[derive(Debug)]
pub struct SchedulerHandle {
    quit: Option<oneshot::Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Stops the loop and waits for it to finish
    pub async fn shutdown(mut self) {
        if let Some(quit) = self.quit.take() {
            let _ = quit.send(());
        }

        if let Some(join) = self.join.take() {
            if let Err(err) = join.await {
                if err.is_panic() {
                    tracing::error!("proactive refresh scheduler panicked!")
                } else if err.is_cancelled() {
                    tracing::info!("proactive refresh scheduler was cancelled")
                }
            }
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        if let Some(quit) = self.quit.take() {
            let _ = quit.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tandem_clock::{DurationSecs, TestClock, UnixTime};

    use super::*;
    use crate::{
        config::REFRESH_INTERVAL,
        session::{LogoutReason, SessionEvent},
        store::InMemoryTokenStore,
        testing::{token_for, FakeAuthService},
        RefreshToken, Role,
    };

    const NOW: UnixTime = UnixTime(1_700_000_000);

    fn session_with(service: Arc<FakeAuthService>, clock: TestClock) -> Session {
        Session::builder(Arc::new(InMemoryTokenStore::new()), service)
            .with_clock(clock)
            .start()
    }

    mod tick {
        use super::*;

        #[tokio::test]
        async fn without_a_session_does_nothing() {
            let service = Arc::new(FakeAuthService::new());
            let scheduler =
                ProactiveRefreshScheduler::new(session_with(service.clone(), TestClock::new(NOW)));

            assert_eq!(scheduler.tick().await, TickOutcome::NoSession);
            assert_eq!(service.refresh_calls(), 0);
        }

        #[tokio::test]
        async fn fresh_token_is_left_alone() {
            let service = Arc::new(FakeAuthService::new());
            let session = session_with(service.clone(), TestClock::new(NOW));
            session.set_tokens(token_for("ana", Role::USER, NOW, NOW + DurationSecs(900)), None);

            let scheduler = ProactiveRefreshScheduler::new(session);

            assert_eq!(scheduler.tick().await, TickOutcome::Fresh);
            assert_eq!(service.refresh_calls(), 0);
        }

        #[tokio::test]
        async fn token_within_threshold_is_refreshed() {
            let clock = TestClock::new(NOW);
            let renewed = token_for("ana", Role::USER, NOW, NOW + DurationSecs(1800));
            let service = Arc::new(FakeAuthService::new().refreshing_to(renewed.clone()));
            let session = session_with(service.clone(), clock.clone());
            session.set_tokens(
                token_for("ana", Role::USER, NOW, NOW + DurationSecs(900)),
                Some(RefreshToken::from_static("r")),
            );

            clock.advance(DurationSecs(840));
            let scheduler = ProactiveRefreshScheduler::new(session.clone());

            assert_eq!(scheduler.tick().await, TickOutcome::Refreshed);
            assert_eq!(service.refresh_calls(), 1);
            assert_eq!(session.access_token(), Some(renewed));
        }

        #[tokio::test]
        async fn failed_refresh_logs_out_exactly_once() {
            let clock = TestClock::new(NOW);
            let service = Arc::new(FakeAuthService::new());
            let session = session_with(service.clone(), clock.clone());
            session.set_tokens(
                token_for("ana", Role::USER, NOW, NOW + DurationSecs(900)),
                Some(RefreshToken::from_static("r")),
            );
            let mut events = session.subscribe();

            clock.advance(DurationSecs(1000));
            let scheduler = ProactiveRefreshScheduler::new(session.clone());

            assert_eq!(scheduler.tick().await, TickOutcome::Failed);
            assert!(session.store().snapshot().is_empty());
            assert_eq!(
                events.recv().await.unwrap(),
                SessionEvent::LoggedOut {
                    reason: LogoutReason::RefreshFailed
                }
            );
            assert!(events.try_recv().is_err());
        }
    }

    mod ensure_valid_token {
        use super::*;

        #[tokio::test]
        async fn is_false_without_a_session() {
            let service = Arc::new(FakeAuthService::new());
            let scheduler =
                ProactiveRefreshScheduler::new(session_with(service, TestClock::new(NOW)));

            assert!(!scheduler.ensure_valid_token().await);
        }

        #[tokio::test]
        async fn forces_a_refresh_of_an_expired_token() {
            let clock = TestClock::new(NOW);
            let renewed = token_for(
                "ana",
                Role::USER,
                NOW + DurationSecs(1000),
                NOW + DurationSecs(1900),
            );
            let service = Arc::new(FakeAuthService::new().refreshing_to(renewed));
            let session = session_with(service.clone(), clock.clone());
            session.set_tokens(
                token_for("ana", Role::USER, NOW, NOW + DurationSecs(900)),
                Some(RefreshToken::from_static("r")),
            );

            clock.advance(DurationSecs(1000));
            let scheduler = ProactiveRefreshScheduler::new(session);

            assert!(scheduler.ensure_valid_token().await);
            assert_eq!(service.refresh_calls(), 1);
        }
    }

    mod spawned {
        use tracing_test::traced_test;

        use super::*;
        use crate::SessionConfig;

        #[tokio::test(start_paused = true)]
        async fn refreshes_once_per_interval_when_due() {
            let clock = TestClock::new(NOW);
            let renewed = token_for("ana", Role::USER, NOW, NOW + DurationSecs(900));
            let service = Arc::new(FakeAuthService::new().refreshing_to(renewed));
            let session = session_with(service.clone(), clock.clone());
            session.set_tokens(
                token_for("ana", Role::USER, NOW, NOW + DurationSecs(900)),
                Some(RefreshToken::from_static("r")),
            );
            clock.advance(DurationSecs(840));

            let handle = ProactiveRefreshScheduler::new(session).spawn();

            time::sleep(REFRESH_INTERVAL / 2).await;
            assert_eq!(service.refresh_calls(), 0);

            time::sleep(REFRESH_INTERVAL / 2 + std::time::Duration::from_millis(1)).await;
            assert_eq!(service.refresh_calls(), 1);

            handle.shutdown().await;
        }

        #[tokio::test(start_paused = true)]
        #[traced_test]
        async fn warns_when_tokens_can_expire_between_ticks() {
            let service = Arc::new(FakeAuthService::new());
            let session = Session::builder(Arc::new(InMemoryTokenStore::new()), service)
                .with_clock(TestClock::new(NOW))
                .with_config(SessionConfig::default().with_access_token_lifetime(DurationSecs(600)))
                .start();

            ProactiveRefreshScheduler::new(session).spawn().shutdown().await;

            assert!(logs_contain("refresh interval is not shorter"));
        }

        #[tokio::test(start_paused = true)]
        #[traced_test]
        async fn default_interval_does_not_warn() {
            let service = Arc::new(FakeAuthService::new());
            let session = session_with(service, TestClock::new(NOW));

            ProactiveRefreshScheduler::new(session).spawn().shutdown().await;

            assert!(!logs_contain("refresh interval is not shorter"));
        }

        #[tokio::test(start_paused = true)]
        async fn dropping_the_handle_stops_the_loop() {
            let clock = TestClock::new(NOW);
            let service = Arc::new(FakeAuthService::new().refreshing_to(token_for(
                "ana",
                Role::USER,
                NOW,
                NOW,
            )));
            let session = session_with(service.clone(), clock.clone());
            session.set_tokens(token_for("ana", Role::USER, NOW, NOW), None);

            drop(ProactiveRefreshScheduler::new(session).spawn());

            time::sleep(REFRESH_INTERVAL * 3).await;
            assert_eq!(service.refresh_calls(), 0);
        }
    }
}
