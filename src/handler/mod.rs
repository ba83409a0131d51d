//! Request handler module
//!
//! Routing plus the file browser operations: listing, editor page, create,
//! delete, upload and static file reads.

pub mod args;
pub mod edit;
pub mod router;
pub mod static_files;
pub mod upload;

// Re-export main entry point
pub use router::{handle_request, PeerAddr};
