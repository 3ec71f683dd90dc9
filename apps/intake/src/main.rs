mod config;
mod db;
mod errors;
mod extraction;
mod intake;
mod normalize;
mod routes;
mod state;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::db::{create_pool, ensure_schema};
use crate::intake::persistence::{LogRecordSink, PgRecordSink, RecordSink};
use crate::intake::transport::HttpTransport;
use crate::intake::{ControllerDeps, SessionRegistry};
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Malformed env values fail here, before anything is bound
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting resume intake v{}", env!("CARGO_PKG_VERSION"));

    // Confirmed record sets: Postgres when configured, the log otherwise
    let sink: Arc<dyn RecordSink> = match &config.database_url {
        Some(url) => {
            let pool = create_pool(url).await?;
            ensure_schema(&pool).await?;
            Arc::new(PgRecordSink::new(pool))
        }
        None => {
            info!("DATABASE_URL not set; confirmed records will only be logged");
            Arc::new(LogRecordSink)
        }
    };

    let transport = HttpTransport::new(config.parser_endpoint.clone(), config.upload_timeout)?;
    info!(
        "Parser endpoint: {} (timeout {:?})",
        transport.endpoint(),
        config.upload_timeout
    );

    let state = AppState {
        sessions: SessionRegistry::new(ControllerDeps {
            transport: Arc::new(transport),
            sink,
            progress: config.progress,
        }),
    };

    state
        .sessions
        .spawn_reaper(config.session_idle_ttl, config.session_sweep_interval);
    info!(
        "Idle sessions close after {:?} (checked every {:?})",
        config.session_idle_ttl, config.session_sweep_interval
    );

    let app = build_router(state, config.max_upload_bytes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
