use std::net::SocketAddr;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use hrms_core::config::Config;
use hrms_core::email;
use hrms_core::reminders::schedule::{DailySchedule, spawn_scheduler};

const LOGIN_LIMITER_SWEEP: Duration = Duration::from_secs(5 * 60);
const LOGIN_LIMITER_MAX_AGE: Duration = Duration::from_secs(15 * 60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    tracing::info!("Starting HRMS core ({:?})", config.environment);

    // Main registry database. The process cannot serve anything without it.
    let pool = match PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&config.database_url)
        .await
    {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!("Main database connection error: {e}");
            std::process::exit(1);
        }
    };
    tracing::info!("Main database connected");

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Migrations applied");

    let addr = SocketAddr::new(config.host, config.port);
    let schedule = DailySchedule::new(config.reminders.time, config.reminders.utc_offset);
    let run_on_startup = config.reminders.run_on_startup;

    let transport = email::transport_from_config(config.smtp.as_ref());
    let state = hrms_core::build_state(pool, config, transport);
    let app = hrms_core::build_app(state.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = spawn_scheduler(state.reminders.clone(), schedule, run_on_startup, shutdown_rx);

    let sweeper_state = state.clone();
    let mut sweeper_shutdown = shutdown_tx.subscribe();
    let sweeper = tokio::spawn(async move {
        let mut interval = tokio::time::interval(LOGIN_LIMITER_SWEEP);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    sweeper_state.login_limiter.cleanup(LOGIN_LIMITER_MAX_AGE);
                    sweeper_state.otp_limiter.cleanup(LOGIN_LIMITER_MAX_AGE);
                }
                changed = sweeper_shutdown.changed() => {
                    if changed.is_err() || *sweeper_shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    });

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    let _ = scheduler.await;
    let _ = sweeper.await;

    state.tenants.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
