use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::Parser;
use tandem_session::{
    service::{AuthEndpoints, HttpAuthService},
    store::FileTokenStore,
    Password, ProactiveRefreshScheduler, Session, SessionConfig, SessionEvent, Username,
};
use tokio::time;

#[derive(Debug, Parser)]
struct Opts {
    /// The base URL of the authentication service
    #[arg(short, long, env)]
    base_url: reqwest::Url,

    /// The account to log in with if no session is stored
    #[arg(short, long, env)]
    username: String,

    /// The password for the account
    #[arg(short, long, env, hide_env_values = true)]
    password: String,

    /// The local file used to persist the session
    #[arg(short = 'f', long, env, default_value = ".session.json")]
    token_file: PathBuf,

    /// How often to check the access token, in seconds
    #[arg(long, env, default_value_t = 840)]
    refresh_interval: u64,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    dotenvy::dotenv().ok();
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .pretty()
        .with_env_filter(tracing_subscriber::filter::EnvFilter::from_default_env())
        .init();

    let opts = Opts::parse();

    let client = reqwest::Client::builder().build()?;
    let service = HttpAuthService::new(client, AuthEndpoints::new(opts.base_url)?);
    let store = FileTokenStore::open(opts.token_file)?;

    let session = Session::builder(Arc::new(store), Arc::new(service))
        .with_config(
            SessionConfig::default()
                .with_refresh_interval(Duration::from_secs(opts.refresh_interval)),
        )
        .start();

    let mut events = session.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                SessionEvent::LoggedOut { reason } => {
                    tracing::warn!(?reason, "session ended")
                }
                event => tracing::info!(?event, "session event"),
            }
        }
    });

    if !session.is_authenticated() {
        let identity = session
            .login(Username::new(opts.username), Password::new(opts.password))
            .await?;
        tracing::info!(identity = format_args!("{:#?}", identity), "logged in");
    }

    let handle = ProactiveRefreshScheduler::new(session.clone()).spawn();

    let mut interval = time::interval(Duration::from_secs(5));
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = tokio::signal::ctrl_c() => break,
        }

        match session.identity() {
            Some(identity) => {
                let now = session.now();
                tracing::debug!(
                    username = %identity.username,
                    expires_in = identity.until_expired_at(now).0,
                    "current identity"
                );
            }
            None => {
                tracing::error!("no longer logged in");
                break;
            }
        }
    }

    handle.shutdown().await;
    Ok(())
}
