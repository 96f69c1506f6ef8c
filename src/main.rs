//! Match Recorder
//!
//! Reads game notifications as newline-delimited JSON on stdin and records
//! rounds and events to SQLite until the feed closes or Ctrl-C.

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use match_recorder::{
    VERSION,
    config::RecorderConfig,
    feed::{load_roster_file, Dispatcher},
    recorder::SessionState,
    store::SqliteStore,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    info!("Match Recorder v{}", VERSION);

    let config = RecorderConfig::from_env();
    info!("Database: {}", config.database_path.display());

    let store = SqliteStore::open(&config.database_path)
        .with_context(|| format!("failed to open {}", config.database_path.display()))?;
    let roster_path = config.roster_path.clone();
    let mut session = SessionState::open(store, config).context("failed to prepare schema")?;

    if let Some(path) = roster_path {
        match load_roster_file(&path) {
            Ok(players) => {
                session.reconcile(&players).context("failed to seed roster")?;
            }
            Err(e) => warn!(path = %path.display(), error = %e, "startup roster unavailable"),
        }
    }

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    let mut dispatcher = Dispatcher::new();
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let fed = dispatcher.run(&mut session, stdin, shutdown).await;

    let (_store, stats) = session.close();
    info!(
        "Recorded {} rounds and {} events",
        stats.rounds_finalized, stats.events_recorded
    );

    fed.context("notification feed failed")?;
    Ok(())
}
