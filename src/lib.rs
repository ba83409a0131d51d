//! HTTP file browser for small flash filesystems
//!
//! Lists, reads, creates, deletes and uploads files on a [`fs::FlashFs`]
//! backend over plain HTTP/1.1.

pub mod config;
pub mod fs;
pub mod handler;
pub mod http;
pub mod logger;
pub mod server;
