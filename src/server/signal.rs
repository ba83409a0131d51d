// Signal handling module
//
// SIGTERM and SIGINT both request a graceful shutdown.

use crate::logger;

/// Resolve once the process is asked to stop
#[cfg(unix)]
pub async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut sigterm, mut sigint) =
        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(term), Ok(int)) => (term, int),
            (Err(e), _) | (_, Err(e)) => {
                logger::log_error(&format!("Failed to register signal handlers: {e}"));
                return std::future::pending().await;
            }
        };

    tokio::select! {
        _ = sigterm.recv() => logger::log_info("[SIGNAL] SIGTERM received, shutting down"),
        _ = sigint.recv() => logger::log_info("[SIGNAL] SIGINT received, shutting down"),
    }
}

/// Non-unix fallback: Ctrl+C only
#[cfg(not(unix))]
pub async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => logger::log_info("[SIGNAL] Ctrl+C received, shutting down"),
        Err(e) => {
            logger::log_error(&format!("Failed to listen for Ctrl+C: {e}"));
            std::future::pending::<()>().await;
        }
    }
}
