// Server loop module
// Accepts connections until shutdown, then waits for open ones to finish

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use super::connection::accept_connection;
use crate::config::AppState;
use crate::logger;

/// How often the drain phase re-checks the connection counter
const DRAIN_POLL: Duration = Duration::from_millis(50);

/// Run the accept loop until `shutdown` resolves
///
/// Must run inside a `LocalSet`; connections are `spawn_local` tasks. After
/// shutdown the listener is closed and open connections get up to the write
/// timeout to complete.
#[allow(clippy::ignored_unit_patterns)]
pub async fn start_server_loop<S>(
    listener: TcpListener,
    state: Arc<AppState>,
    active_connections: Arc<AtomicUsize>,
    shutdown: S,
) -> std::io::Result<()>
where
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer_addr)) => {
                        accept_connection(stream, peer_addr, &state, &active_connections);
                    }
                    Err(e) => logger::log_error(&format!("Failed to accept connection: {e}")),
                }
            }

            _ = &mut shutdown => break,
        }
    }

    drop(listener);
    logger::log_shutdown(active_connections.load(Ordering::SeqCst));
    drain_connections(
        &active_connections,
        Duration::from_secs(state.config.performance.write_timeout),
    )
    .await;
    Ok(())
}

/// Wait until no connection is open or `grace` elapses
async fn drain_connections(active_connections: &AtomicUsize, grace: Duration) {
    let deadline = tokio::time::Instant::now() + grace;
    while active_connections.load(Ordering::SeqCst) > 0 {
        if tokio::time::Instant::now() >= deadline {
            logger::log_warning(&format!(
                "Shutdown grace period over, abandoning {} connection(s)",
                active_connections.load(Ordering::SeqCst)
            ));
            return;
        }
        tokio::time::sleep(DRAIN_POLL).await;
    }
    logger::log_info("[Shutdown] All connections closed");
}
