// Configuration module entry point
// Loads application configuration and holds the shared runtime state

mod state;
mod types;

use std::net::SocketAddr;

// Re-export public types
pub use state::AppState;
pub use types::{
    Config, HttpConfig, LoggingConfig, PerformanceConfig, ServerConfig, StorageBackend,
    StorageConfig,
};

/// Default config file name (extension resolved by the `config` crate)
pub const DEFAULT_CONFIG_PATH: &str = "fsbrowser";

impl Config {
    /// Load configuration from a file path; the extension may be omitted
    ///
    /// A missing file is not an error; defaults and `FSBROWSER_*` variables apply
    pub fn load_from(config_path: &str) -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(
                config::Environment::with_prefix("FSBROWSER")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("logging.level", "info")?
            .set_default("logging.access_log", true)?
            .set_default("performance.keep_alive_timeout", 75)?
            .set_default("performance.read_timeout", 30)?
            .set_default("performance.write_timeout", 30)?
            .set_default("http.server_name", "fsbrowser")?
            .set_default("http.enable_cors", false)?
            .set_default("http.max_body_size", 4_194_304)? // 4MB
            .set_default("storage.backend", "dir")?
            .set_default("storage.root", "data")?
            .set_default("storage.editor_page", "/edit.htm")?
            .set_default("storage.index_file", "index.htm")?
            .build()?;

        settings.try_deserialize()
    }

    pub fn get_socket_addr(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| format!("Invalid address: {e}"))
    }
}
