use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use config::{BusKind, Config};
use sentinex_core::{AttendanceGate, Clock, FenceSnapshot};
use sentinex_remote::{FaceCompareClient, SystemClock, WorldClock};
use sentinex_store::Store;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;
mod service;
#[cfg(test)]
mod testing;

const BUS_NAME: &str = "org.sentinex.Attendance1";
const OBJECT_PATH: &str = "/org/sentinex/Attendance1";

/// World time when a time service is configured, otherwise the host clock.
enum DaemonClock {
    World(WorldClock),
    System(SystemClock),
}

impl Clock for DaemonClock {
    async fn now(&self) -> DateTime<Utc> {
        match self {
            Self::World(clock) => clock.now().await,
            Self::System(clock) => clock.now().await,
        }
    }
}

fn build_clock(config: &Config) -> Result<DaemonClock> {
    let Some(base) = &config.time_api_url else {
        return Ok(DaemonClock::System(SystemClock));
    };
    let clock = WorldClock::new(base, &config.timezone, config.http_timeout())
        .context("failed to configure world time client")?;
    tracing::info!(url = %clock.url(), "stamping records with world time");
    Ok(DaemonClock::World(clock))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env();
    tracing::info!(
        db = %config.db_path.display(),
        mode = ?config.gate_mode,
        face_api = %config.face_api_url,
        "sentinexd starting"
    );

    let store = Store::open(&config.db_path)
        .await
        .context("failed to open attendance store")?;

    let verifier = FaceCompareClient::new(&config.face_api_url, config.http_timeout())
        .context("failed to configure face comparison client")?;
    let clock = build_clock(&config)?;

    let (fences_tx, fences_rx) = watch::channel(FenceSnapshot::default());
    let engine = engine::spawn_engine(engine::Engine {
        gate: AttendanceGate::new(config.gate_mode),
        fences: engine::LiveFences(fences_rx),
        verifier,
        clock,
        sink: store.clone(),
    });

    let service = service::AttendanceService::new(
        store,
        engine,
        fences_tx,
        config.fences_file.clone(),
        config.gate_mode,
    );
    if let Err(e) = service.reload_fences().await {
        tracing::warn!(error = %e, "fence file not loaded; using stored fences");
        service
            .publish_stored_fences()
            .await
            .context("failed to load stored fences")?;
    }

    let builder = match config.bus {
        BusKind::Session => zbus::connection::Builder::session()?,
        BusKind::System => zbus::connection::Builder::system()?,
    };
    let _conn = builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, dbus_interface::AttendanceInterface::new(service))?
        .build()
        .await
        .context("failed to register on D-Bus")?;

    tracing::info!(bus = ?config.bus, name = BUS_NAME, "sentinexd ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("sentinexd shutting down");

    Ok(())
}
