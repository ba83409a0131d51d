//! Static file serving module
//!
//! Resolves request paths to stored files, preferring a `.gz` variant, and
//! builds the file response.

use crate::fs::FlashFs;
use crate::handler::router::RequestContext;
use crate::http::{self, mime};
use crate::logger;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::Response;

/// A stored file chosen for a request path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFile {
    /// Path the content type is derived from (index file appended)
    pub logical_path: String,
    /// Path actually read from flash
    pub served_path: String,
    pub content: Vec<u8>,
}

impl ResolvedFile {
    /// Whether the compressed variant stands in for the requested file
    pub fn is_gzip_substitute(&self) -> bool {
        self.served_path != self.logical_path
    }
}

/// Resolve `path` to stored content
///
/// A trailing `/` gets `index_file` appended; `path.gz` wins over `path`.
pub async fn resolve(fs: &dyn FlashFs, path: &str, index_file: &str) -> Option<ResolvedFile> {
    let logical_path = if path.ends_with('/') {
        format!("{path}{index_file}")
    } else {
        path.to_string()
    };

    let gz_path = format!("{logical_path}.gz");
    let served_path = if fs.exists(&gz_path).await {
        gz_path
    } else if fs.exists(&logical_path).await {
        logical_path.clone()
    } else {
        return None;
    };

    match fs.read(&served_path).await {
        Ok(content) => Some(ResolvedFile {
            logical_path,
            served_path,
            content,
        }),
        Err(e) => {
            logger::log_error(&format!("Failed to read file '{served_path}': {e}"));
            None
        }
    }
}

/// Serve the stored file for `ctx.path`, or 404 `FileNotFound`
pub async fn serve_file(ctx: &RequestContext<'_>, fs: &dyn FlashFs) -> Response<Full<Bytes>> {
    logger::log_debug(&format!("handleFileRead: {}", ctx.path));
    let Some(file) = resolve(fs, ctx.path, ctx.index_file).await else {
        return http::build_404_response();
    };

    let content_type = mime::content_type_of(&file.logical_path, ctx.args.has("download"));
    let gzip_encoded =
        file.is_gzip_substitute() && content_type != mime::GZIP_CONTENT_TYPE;
    http::build_file_response(file.content, content_type, gzip_encoded, ctx.is_head)
}
