use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::info;

use reservd::engine::{Engine, SchedulerConfig};
use reservd::model::ReservationStatus;
use reservd::notify::NotifyHub;
use reservd::wire::{self, ReservdFactory};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let metrics_port: Option<u16> = std::env::var("RESERVD_METRICS_PORT")
        .ok()
        .and_then(|s| s.parse().ok());
    reservd::observability::init(metrics_port);

    let port = std::env::var("RESERVD_PORT").unwrap_or_else(|_| "5433".into());
    let bind = std::env::var("RESERVD_BIND").unwrap_or_else(|_| "0.0.0.0".into());
    let data_dir = std::env::var("RESERVD_DATA_DIR").unwrap_or_else(|_| "./data".into());
    let password = std::env::var("RESERVD_PASSWORD").unwrap_or_else(|_| "reservd".into());
    let max_connections: usize = std::env::var("RESERVD_MAX_CONNECTIONS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(256);
    let compact_threshold: u64 = std::env::var("RESERVD_COMPACT_THRESHOLD")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(1000);
    // Canceled reservations are kept this long for audit, then purged.
    let retention_ms: i64 = std::env::var("RESERVD_RETENTION_MS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(30 * 24 * 3_600_000);
    let lock_wait_ms: u64 = std::env::var("RESERVD_LOCK_WAIT_MS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(2000);
    let default_status = match std::env::var("RESERVD_DEFAULT_STATUS").as_deref() {
        Ok("pending") => ReservationStatus::Pending,
        _ => ReservationStatus::Confirmed,
    };

    let tls_cert = std::env::var("RESERVD_TLS_CERT").ok();
    let tls_key = std::env::var("RESERVD_TLS_KEY").ok();
    let tls_acceptor = reservd::tls::load_tls_acceptor(tls_cert.as_deref(), tls_key.as_deref())?;

    std::fs::create_dir_all(&data_dir)?;
    let wal_path = PathBuf::from(&data_dir).join("reservd.wal");

    let cfg = SchedulerConfig {
        default_status,
        lock_wait: Duration::from_millis(lock_wait_ms),
    };
    let notify = Arc::new(NotifyHub::new());
    let engine = Arc::new(Engine::new(wal_path, notify, cfg)?);
    let factory = Arc::new(ReservdFactory::new(engine.clone(), password));
    let semaphore = Arc::new(Semaphore::new(max_connections));

    tokio::spawn(reservd::janitor::run_purger(engine.clone(), retention_ms));
    tokio::spawn(reservd::janitor::run_compactor(engine.clone(), compact_threshold));

    let addr = format!("{bind}:{port}");
    let listener = TcpListener::bind(&addr).await?;
    info!("reservd listening on {addr}");
    info!("  data_dir: {data_dir}");
    info!("  max_connections: {max_connections}");
    info!("  default_status: {}", default_status.as_str());
    info!("  tls: {}", if tls_acceptor.is_some() { "enabled" } else { "disabled" });
    info!("  metrics: {}", metrics_port.map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics")));

    // Graceful shutdown: stop accepting on SIGTERM/ctrl-c, drain in-flight connections
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("failed to register SIGTERM handler");
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
        }
    };
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (socket, peer) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::error!("accept error: {e}");
                        continue;
                    }
                };

                let permit = match semaphore.clone().try_acquire_owned() {
                    Ok(permit) => permit,
                    Err(_) => {
                        tracing::warn!("connection limit reached, rejecting {peer}");
                        metrics::counter!(reservd::observability::CONNECTIONS_REJECTED_TOTAL).increment(1);
                        drop(socket);
                        continue;
                    }
                };

                info!("connection from {peer}");
                metrics::counter!(reservd::observability::CONNECTIONS_TOTAL).increment(1);
                metrics::gauge!(reservd::observability::CONNECTIONS_ACTIVE).increment(1.0);
                let factory = factory.clone();
                let tls = tls_acceptor.clone();

                tokio::spawn(async move {
                    let _permit = permit; // held until connection closes
                    if let Err(e) = wire::process_connection(socket, tls, factory).await {
                        tracing::error!("connection error from {peer}: {e}");
                    }
                    metrics::gauge!(reservd::observability::CONNECTIONS_ACTIVE).decrement(1.0);
                });
            }
            _ = &mut shutdown => {
                info!("shutdown signal received, stopping accept loop");
                break;
            }
        }
    }

    // Wait for in-flight connections to finish (up to 10s)
    info!("draining connections...");
    let drain_deadline = tokio::time::sleep(std::time::Duration::from_secs(10));
    tokio::pin!(drain_deadline);

    loop {
        if semaphore.available_permits() == max_connections {
            info!("all connections drained");
            break;
        }
        tokio::select! {
            _ = &mut drain_deadline => {
                let remaining = max_connections - semaphore.available_permits();
                tracing::warn!("drain timeout, {remaining} connections still open");
                break;
            }
            _ = tokio::time::sleep(std::time::Duration::from_millis(100)) => {}
        }
    }

    info!("reservd stopped");
    Ok(())
}
