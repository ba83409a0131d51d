//! MIME type detection module
//!
//! Returns the Content-Type for a stored file based on its suffix.

/// Type sent when the client asked for a download
pub const DOWNLOAD_CONTENT_TYPE: &str = "application/octet-stream";

/// Type declared for `.gz` files
pub const GZIP_CONTENT_TYPE: &str = "application/x-gzip";

/// Suffix of `path` after the last `.` in its final segment
pub fn suffix_of(path: &str) -> Option<&str> {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    file_name.rsplit_once('.').map(|(_, suffix)| suffix)
}

/// Get MIME Content-Type based on file suffix
///
/// # Examples
/// ```
/// use fsbrowser::http::mime::get_content_type;
/// assert_eq!(get_content_type(Some("htm")), "text/html");
/// assert_eq!(get_content_type(Some("js")), "application/javascript");
/// assert_eq!(get_content_type(None), "text/plain");
/// ```
pub fn get_content_type(suffix: Option<&str>) -> &'static str {
    match suffix {
        Some("htm" | "html") => "text/html",
        Some("css") => "text/css",
        Some("js") => "application/javascript",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("jpg") => "image/jpeg",
        Some("ico") => "image/x-icon",
        Some("xml") => "text/xml",
        Some("pdf") => "application/x-pdf",
        Some("zip") => "application/x-zip",
        Some("gz") => GZIP_CONTENT_TYPE,
        _ => "text/plain",
    }
}

/// Content-Type for a stored path; a download request overrides the suffix
pub fn content_type_of(path: &str, download_requested: bool) -> &'static str {
    if download_requested {
        DOWNLOAD_CONTENT_TYPE
    } else {
        get_content_type(suffix_of(path))
    }
}
