//! Logger module
//!
//! Provides logging utilities for the file browser including:
//! - Server lifecycle logging
//! - Access logging with multiple formats
//! - Per-operation debug traces for file handlers
//! - File-based logging support

mod format;
pub mod writer;

pub use format::AccessLogEntry;
pub use writer::LogLevel;

use crate::config::Config;
use hyper::{Method, Uri};
use std::net::SocketAddr;

/// Initialize the logger with configuration
///
/// Should be called once at application startup.
pub fn init(config: &Config) -> std::io::Result<()> {
    writer::init(
        LogLevel::parse(&config.logging.level),
        config.logging.access_log_file.as_deref(),
        config.logging.error_log_file.as_deref(),
    )
}

fn write_info(level: LogLevel, message: &str) {
    match writer::get() {
        Some(w) => w.write_info(level, message),
        None if level <= LogLevel::Info => println!("{message}"),
        None => {}
    }
}

fn write_error(level: LogLevel, message: &str) {
    match writer::get() {
        Some(w) => w.write_error(level, message),
        None => eprintln!("{message}"),
    }
}

pub fn log_server_start(addr: &SocketAddr, config: &Config) {
    write_info(LogLevel::Info, "======================================");
    write_info(LogLevel::Info, "File browser started");
    write_info(LogLevel::Info, &format!("Listening on: http://{addr}"));
    write_info(LogLevel::Info, &format!("Editor: http://{addr}/edit"));
    write_info(
        LogLevel::Info,
        &format!(
            "Storage: {:?} ({})",
            config.storage.backend, config.storage.root
        ),
    );
    write_info(LogLevel::Info, &format!("Log level: {}", config.logging.level));
    if let Some(ref path) = config.logging.access_log_file {
        write_info(LogLevel::Info, &format!("Access log: {path}"));
    }
    if let Some(ref path) = config.logging.error_log_file {
        write_info(LogLevel::Info, &format!("Error log: {path}"));
    }
    write_info(LogLevel::Info, "======================================\n");
}

pub fn log_info(message: &str) {
    write_info(LogLevel::Info, message);
}

pub fn log_debug(message: &str) {
    write_info(LogLevel::Debug, message);
}

pub fn log_connection_accepted(peer_addr: &SocketAddr) {
    write_info(LogLevel::Debug, &format!("[Connection] Accepted from: {peer_addr}"));
}

pub fn log_connection_error(err: &impl std::fmt::Debug) {
    write_error(
        LogLevel::Error,
        &format!("[ERROR] Failed to serve connection: {err:?}"),
    );
}

pub fn log_request(method: &Method, uri: &Uri) {
    write_info(LogLevel::Debug, &format!("[Request] {method} {uri}"));
}

pub fn log_error(message: &str) {
    write_error(LogLevel::Error, &format!("[ERROR] {message}"));
}

pub fn log_warning(message: &str) {
    write_error(LogLevel::Warn, &format!("[WARN] {message}"));
}

/// Log formatted access log entry
pub fn log_access(entry: &AccessLogEntry, format: &str) {
    let line = entry.format(format);
    match writer::get() {
        Some(w) => w.write_access(&line),
        None => println!("{line}"),
    }
}

pub fn log_shutdown(active: usize) {
    write_info(
        LogLevel::Info,
        &format!("[Shutdown] Stopped accepting, {active} connection(s) still open"),
    );
}
