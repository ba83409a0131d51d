use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use fsbrowser::config::{AppState, Config, DEFAULT_CONFIG_PATH};
use fsbrowser::{fs, logger, server};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let cfg = Config::load_from(&config_path)?;
    logger::init(&cfg)?;

    // Connections are spawn_local tasks, one thread is enough
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async_main(cfg))
}

async fn async_main(cfg: Config) -> Result<(), Box<dyn std::error::Error>> {
    let storage = fs::open_backend(&cfg.storage)?;
    fs::log_inventory(storage.as_ref()).await;

    let addr = cfg.get_socket_addr()?;
    let listener = server::create_reusable_listener(addr)?;
    logger::log_server_start(&addr, &cfg);

    let state = Arc::new(AppState::new(cfg, storage));
    let active_connections = Arc::new(AtomicUsize::new(0));

    let local = tokio::task::LocalSet::new();
    local
        .run_until(server::start_server_loop(
            listener,
            state,
            active_connections,
            server::shutdown_signal(),
        ))
        .await?;
    Ok(())
}
