use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use chrono::Utc;
use clap::{Parser, Subcommand};
use keepsake_core::KeepsakeConfig;
use keepsake_delivery::{
    Cadence, PosthumousRelease, ReleaseExecutor, ReleaseOutcome, ReleaseSummary, ScheduledSweep,
};
use keepsake_store::SqliteStore;
use tracing::{error, info, warn};

mod app;
mod http;
mod seed;

#[derive(Parser)]
#[command(
    name = "keepsake",
    about = "Release stored messages to their recipients on schedule or after a life event",
    version
)]
struct Cli {
    /// Config file (default: ~/.keepsake/keepsake.toml)
    #[arg(long, global = true, env = "KEEPSAKE_CONFIG")]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Release a user's posthumous messages (invoked once the death is verified)
    Release {
        #[arg(long)]
        user: String,
    },

    /// Run one sweep over date-triggered messages that are due
    Sweep,

    /// Send one message now, whatever its trigger
    Send {
        #[arg(long)]
        message: String,
    },

    /// Send a test delivery of a message to yourself
    TestSend {
        #[arg(long)]
        message: String,
        #[arg(long)]
        to: String,
    },

    /// Redeem a delivery token and print the message
    Redeem { token: String },

    /// Parse a cadence specification and print its canonical form
    Cadence { spec: String },

    /// Load recipients, messages and cadences from a JSON file
    Seed { file: PathBuf },

    /// Run the redemption portal with a periodic sweep
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "keepsake=info,keepsake_delivery=info,keepsake_store=info,keepsake_notify=info,tower_http=debug"
                    .into()
            }),
        )
        .init();

    let cli = Cli::parse();

    // Cadence parsing needs neither config nor database.
    if let Commands::Cadence { spec } = &cli.command {
        println!("{}", Cadence::parse(spec));
        return Ok(());
    }

    // load config: --config > KEEPSAKE_CONFIG > ~/.keepsake/keepsake.toml
    let config = KeepsakeConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!(code = e.code(), "Config load failed ({}), using defaults", e);
        KeepsakeConfig::default()
    });

    let db_path = config.database.path.clone();
    ensure_parent_dir(&db_path);
    info!(path = %db_path, "opening SQLite database");
    let store = Arc::new(SqliteStore::open(&db_path)?);

    let dispatcher = keepsake_notify::from_config(&config.notify)?;
    let executor = Arc::new(ReleaseExecutor::new(
        store.clone(),
        dispatcher,
        config.delivery.clone(),
    ));

    match cli.command {
        Commands::Release { user } => {
            let flow = PosthumousRelease::new(store.clone(), executor.clone());
            let summary = flow.run(&user, Utc::now()).await.map_err(|e| {
                error!(user_id = %user, error = %e, "posthumous release aborted");
                e
            })?;
            print_summary(&summary)?;
        }
        Commands::Sweep => {
            let sweep =
                ScheduledSweep::new(store.clone(), executor.clone(), config.sweep.concurrency);
            let summary = sweep.tick(Utc::now()).await.map_err(|e| {
                error!(error = %e, "sweep aborted");
                e
            })?;
            print_summary(&summary)?;
        }
        Commands::Send { message } => {
            let outcome = executor.release_message(&message, Utc::now()).await?;
            println!("{outcome:?}");
            if let ReleaseOutcome::Failed { reason } = outcome {
                bail!("release of {message} failed: {reason}");
            }
        }
        Commands::TestSend { message, to } => {
            let issued = executor.send_test(&message, &to, Utc::now()).await?;
            println!("{}", config.delivery.redemption_link(&issued.token));
            info!(expires_at = %issued.expires_at, reused = issued.reused, "test link valid");
        }
        Commands::Redeem { token } => {
            let redeemed = executor.tokens().redeem(&token, Utc::now())?;
            println!("{}", serde_json::to_string_pretty(&redeemed)?);
        }
        Commands::Seed { file } => {
            let seed = seed::load_file(&file)?;
            let counts = seed::apply(&store, &seed)?;
            println!(
                "seeded {} recipients, {} messages, {} links, {} cadences",
                counts.recipients, counts.messages, counts.links, counts.cadences
            );
        }
        Commands::Serve => serve(config, store, executor).await?,
        Commands::Cadence { .. } => {}
    }
    Ok(())
}

async fn serve(
    config: KeepsakeConfig,
    store: Arc<SqliteStore>,
    executor: Arc<ReleaseExecutor>,
) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.portal.bind, config.portal.port).parse()?;
    let interval = Duration::from_secs(config.sweep.interval_secs.max(1));
    let sweep = ScheduledSweep::new(store, executor.clone(), config.sweep.concurrency);

    let state = Arc::new(app::AppState::new(config, executor));
    let router = app::build_router(state);

    // spawn sweep loop in background
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let sweep_task = tokio::spawn(sweep.run(interval, shutdown_rx));

    info!("Keepsake portal listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // signal sweep to stop
    let _ = shutdown_tx.send(true);
    if let Err(e) = sweep_task.await {
        warn!(error = %e, "sweep task ended abnormally");
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "could not listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

fn print_summary(summary: &ReleaseSummary) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(summary)?);
    Ok(())
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
