use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use attendance_backend::api::router;
use attendance_backend::config::AppConfig;
use attendance_backend::db;
use attendance_backend::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "attendance_backend=debug".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::new_from_env()?;

    let pool = db::connect(&config.database_url, config.db_max_connections).await?;

    let state = AppState::new(pool, config.notifier()?, config.push_gateway()?);

    let recovered = state.scheduler.recover().await?;
    info!(
        "closure timers recovered - closed: {}, rescheduled: {}",
        recovered.closed, recovered.rescheduled
    );

    let sweep = Arc::clone(&state.scheduler);
    tokio::spawn(sweep.start(Duration::from_secs(config.closure_sweep_secs)));

    let app = router(state);

    info!("listening on http://{}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
