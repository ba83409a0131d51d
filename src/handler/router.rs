//! Request routing dispatch module
//!
//! Entry point for HTTP request processing: body size validation, route
//! matching on method and path, and the access log line.

use crate::config::AppState;
use crate::handler::args::{self, RequestArgs};
use crate::handler::{edit, static_files, upload};
use crate::http;
use crate::logger::{self, AccessLogEntry};
use http_body_util::Full;
use hyper::body::{Body, Bytes};
use hyper::header::{HeaderName, HeaderValue, REFERER, SERVER, USER_AGENT};
use hyper::{Method, Request, Response, Version};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

/// Remote address of the connection, stored in request extensions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerAddr(pub SocketAddr);

/// Request context for the file-serving routes
pub struct RequestContext<'a> {
    pub path: &'a str,
    pub is_head: bool,
    pub args: &'a RequestArgs,
    pub index_file: &'a str,
}

/// Main entry point for HTTP request handling
pub async fn handle_request<B>(
    req: Request<B>,
    state: Arc<AppState>,
) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let started = Instant::now();
    logger::log_request(req.method(), req.uri());

    let access_log = state.cached_access_log.load(Ordering::Relaxed);
    let entry = access_log.then(|| access_entry(&req));

    let mut response = match check_body_size(&req, state.config.http.max_body_size) {
        Some(resp) => resp,
        None => route_request(req, &state).await,
    };

    if let Ok(server) = HeaderValue::from_str(&state.config.http.server_name) {
        response.headers_mut().insert(SERVER, server);
    }

    if let Some(mut entry) = entry {
        entry.status = response.status().as_u16();
        entry.body_bytes = response.body().size_hint().exact().unwrap_or(0);
        entry.request_time_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
        logger::log_access(&entry, &state.config.logging.access_log_format);
    }

    Ok(response)
}

fn access_entry<B>(req: &Request<B>) -> AccessLogEntry {
    let remote_addr = req
        .extensions()
        .get::<PeerAddr>()
        .map_or_else(|| "-".to_string(), |peer| peer.0.ip().to_string());
    let mut entry = AccessLogEntry::new(
        remote_addr,
        req.method().to_string(),
        req.uri().path().to_string(),
    );
    entry.query = req.uri().query().map(ToString::to_string);
    entry.http_version = http_version_label(req.version()).to_string();
    entry.referer = header_text(req, &REFERER);
    entry.user_agent = header_text(req, &USER_AGENT);
    entry
}

fn header_text<B>(req: &Request<B>, name: &HeaderName) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string)
}

/// Version as written in a request line after `HTTP/`
const fn http_version_label(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "0.9",
        Version::HTTP_10 => "1.0",
        Version::HTTP_2 => "2",
        Version::HTTP_3 => "3",
        _ => "1.1",
    }
}

/// Validate Content-Length header and return 413 if exceeded
fn check_body_size<B>(req: &Request<B>, max_body_size: u64) -> Option<Response<Full<Bytes>>> {
    let content_length = req.headers().get("content-length")?;
    content_length.to_str().map_or_else(
        |_| {
            logger::log_warning("Content-Length header contains non-ASCII characters");
            None
        },
        |size_str| match size_str.parse::<u64>() {
            Ok(size) if size > max_body_size => {
                logger::log_error(&format!(
                    "Request body too large: {size} bytes (max: {max_body_size})"
                ));
                Some(http::build_413_response())
            }
            Err(_) => {
                logger::log_warning(&format!(
                    "Invalid Content-Length value: '{size_str}', skipping size check"
                ));
                None
            }
            _ => None,
        },
    )
}

/// Route request based on method and path
async fn route_request<B>(req: Request<B>, state: &Arc<AppState>) -> Response<Full<Bytes>>
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let method = req.method().clone();
    let path = args::decode_path(req.uri().path());
    let mut request_args = RequestArgs::from_query(req.uri().query());
    let storage = &state.config.storage;
    let max_body_size = state.config.http.max_body_size;

    match (&method, path.as_str()) {
        (&Method::GET, "/list") => edit::handle_file_list(&request_args, state).await,
        (&Method::GET | &Method::HEAD, "/edit") => {
            let ctx = RequestContext {
                path: &storage.editor_page,
                is_head: method == Method::HEAD,
                args: &request_args,
                index_file: &storage.index_file,
            };
            static_files::serve_file(&ctx, state.fs.as_ref()).await
        }
        (&Method::PUT, "/edit") => {
            if let Err(e) = args::read_form_args(req, &mut request_args, max_body_size).await {
                logger::log_error(&format!("Create rejected: {e}"));
                return http::build_413_response();
            }
            edit::handle_file_create(&request_args, state).await
        }
        (&Method::DELETE, "/edit") => {
            if let Err(e) = args::read_form_args(req, &mut request_args, max_body_size).await {
                logger::log_error(&format!("Delete rejected: {e}"));
                return http::build_413_response();
            }
            edit::handle_file_delete(&request_args, state).await
        }
        (&Method::POST, "/edit") => upload::handle_file_upload(req, state).await,
        (&Method::GET | &Method::HEAD, _) => {
            let ctx = RequestContext {
                path: &path,
                is_head: method == Method::HEAD,
                args: &request_args,
                index_file: &storage.index_file,
            };
            static_files::serve_file(&ctx, state.fs.as_ref()).await
        }
        (&Method::OPTIONS, _) => http::build_options_response(state.config.http.enable_cors),
        _ => {
            logger::log_warning(&format!("Method not allowed: {method} {path}"));
            http::build_405_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::fs::{FlashFs, MemFs};
    use http_body_util::BodyExt;
    use hyper::StatusCode;

    fn state_with(fs: &MemFs) -> Arc<AppState> {
        let mut config = Config::load_from("does-not-exist/fsbrowser").unwrap();
        config.logging.access_log = false;
        config.http.max_body_size = 1024;
        Arc::new(AppState::new(config, Arc::new(fs.clone())))
    }

    async fn put(fs: &MemFs, path: &str, data: &[u8]) {
        let mut writer = fs.create(path).await.unwrap();
        writer.write(data).await.unwrap();
        writer.close().await.unwrap();
    }

    fn request(method: &str, uri: &str) -> Request<Full<Bytes>> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    async fn send(state: &Arc<AppState>, req: Request<Full<Bytes>>) -> Response<Full<Bytes>> {
        handle_request(req, Arc::clone(state)).await.unwrap()
    }

    async fn body_of(resp: Response<Full<Bytes>>) -> Bytes {
        resp.into_body().collect().await.unwrap().to_bytes()
    }

    #[tokio::test]
    async fn test_gz_substitute_keeps_original_type() {
        let fs = MemFs::new();
        put(&fs, "/app.js", b"plain").await;
        put(&fs, "/app.js.gz", b"compressed").await;
        let state = state_with(&fs);

        let resp = send(&state, request("GET", "/app.js")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["Content-Type"], "application/javascript");
        assert_eq!(resp.headers()["Content-Encoding"], "gzip");
        assert_eq!(resp.headers()["Server"], "fsbrowser");
        assert_eq!(body_of(resp).await, "compressed");
    }

    #[tokio::test]
    async fn test_direct_gz_request_is_not_encoded() {
        let fs = MemFs::new();
        put(&fs, "/backup.gz", b"\x1f\x8b").await;
        let state = state_with(&fs);

        let resp = send(&state, request("GET", "/backup.gz")).await;
        assert_eq!(resp.headers()["Content-Type"], "application/x-gzip");
        assert!(resp.headers().get("Content-Encoding").is_none());
    }

    #[tokio::test]
    async fn test_index_and_download_override() {
        let fs = MemFs::new();
        put(&fs, "/index.htm", b"<h1>hi</h1>").await;
        let state = state_with(&fs);

        let resp = send(&state, request("GET", "/")).await;
        assert_eq!(resp.headers()["Content-Type"], "text/html");
        assert_eq!(body_of(resp).await, "<h1>hi</h1>");

        let resp = send(&state, request("GET", "/index.htm?download=1")).await;
        assert_eq!(resp.headers()["Content-Type"], "application/octet-stream");
    }

    #[tokio::test]
    async fn test_missing_file_is_404() {
        let state = state_with(&MemFs::new());
        let resp = send(&state, request("GET", "/nope.txt")).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_of(resp).await, "FileNotFound");
    }

    #[tokio::test]
    async fn test_percent_encoded_path() {
        let fs = MemFs::new();
        put(&fs, "/my file.txt", b"spaced").await;
        let state = state_with(&fs);

        let resp = send(&state, request("GET", "/my%20file.txt")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_of(resp).await, "spaced");
    }

    #[tokio::test]
    async fn test_head_has_length_but_no_body() {
        let fs = MemFs::new();
        put(&fs, "/a.txt", b"12345").await;
        let state = state_with(&fs);

        let resp = send(&state, request("HEAD", "/a.txt")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["Content-Length"], "5");
        assert!(body_of(resp).await.is_empty());
    }

    #[tokio::test]
    async fn test_editor_page() {
        let fs = MemFs::new();
        put(&fs, "/edit.htm", b"<html>editor</html>").await;
        let state = state_with(&fs);

        let resp = send(&state, request("GET", "/edit")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["Content-Type"], "text/html");

        let state = state_with(&MemFs::new());
        let resp = send(&state, request("GET", "/edit")).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_create_list_delete_cycle() {
        let fs = MemFs::new();
        let state = state_with(&fs);

        let resp = send(&state, request("PUT", "/edit?path=/notes.txt")).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let form = Request::builder()
            .method("PUT")
            .uri("/edit")
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(Full::new(Bytes::from("path=%2Fnotes.txt")))
            .unwrap();
        let resp = send(&state, form).await;
        assert_eq!(body_of(resp).await, "FILE EXISTS");

        let resp = send(&state, request("GET", "/list?dir=/")).await;
        assert_eq!(body_of(resp).await, r#"[{"type":"file","name":"notes.txt"}]"#);

        let resp = send(&state, request("DELETE", "/edit?path=/notes.txt")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(!fs.exists("/notes.txt").await);

        let resp = send(&state, request("GET", "/list")).await;
        assert_eq!(body_of(resp).await, "BAD ARGS");
    }

    #[tokio::test]
    async fn test_multipart_upload() {
        let fs = MemFs::new();
        let state = state_with(&fs);
        let body = "--XYZ\r\n\
            Content-Disposition: form-data; name=\"data\"; filename=\"up.txt\"\r\n\
            Content-Type: text/plain\r\n\r\n\
            uploaded bytes\r\n\
            --XYZ--\r\n";
        let req = Request::builder()
            .method("POST")
            .uri("/edit")
            .header("Content-Type", "multipart/form-data; boundary=XYZ")
            .body(Full::new(Bytes::from(body)))
            .unwrap();

        let resp = send(&state, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(body_of(resp).await.is_empty());
        assert_eq!(fs.read("/up.txt").await.unwrap(), b"uploaded bytes");

        let resp = send(&state, request("POST", "/edit")).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_of(resp).await, "BAD ARGS");
    }

    #[tokio::test]
    async fn test_upload_failure_reported() {
        let fs = MemFs::with_capacity(4);
        let state = state_with(&fs);
        let body = "--XYZ\r\n\
            Content-Disposition: form-data; name=\"data\"; filename=\"big.bin\"\r\n\r\n\
            far too many bytes\r\n\
            --XYZ--\r\n";
        let req = Request::builder()
            .method("POST")
            .uri("/edit")
            .header("Content-Type", "multipart/form-data; boundary=XYZ")
            .body(Full::new(Bytes::from(body)))
            .unwrap();

        let resp = send(&state, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_of(resp).await, "UPLOAD FAILED");
    }

    #[tokio::test]
    async fn test_method_checks() {
        let state = state_with(&MemFs::new());

        let resp = send(&state, request("PATCH", "/a.txt")).await;
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);

        let resp = send(&state, request("POST", "/elsewhere")).await;
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);

        let resp = send(&state, request("OPTIONS", "/")).await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    }

    #[test]
    fn test_access_entry_records_referer_and_version() {
        let req = Request::builder()
            .method("GET")
            .uri("/index.htm?download")
            .version(Version::HTTP_10)
            .header("Referer", "http://192.168.4.1/edit")
            .header("User-Agent", "curl/8.0")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let entry = access_entry(&req);
        assert_eq!(entry.remote_addr, "-");
        assert_eq!(entry.http_version, "1.0");
        assert_eq!(entry.referer.as_deref(), Some("http://192.168.4.1/edit"));
        assert_eq!(entry.user_agent.as_deref(), Some("curl/8.0"));
        assert_eq!(entry.query.as_deref(), Some("download"));
    }

    #[tokio::test]
    async fn test_body_over_limit_without_content_length() {
        let fs = MemFs::new();
        let state = state_with(&fs);
        let body = format!(
            "--XYZ\r\n\
            Content-Disposition: form-data; name=\"data\"; filename=\"huge.bin\"\r\n\r\n\
            {}\r\n\
            --XYZ--\r\n",
            "z".repeat(64 * 1024)
        );
        let req = Request::builder()
            .method("POST")
            .uri("/edit")
            .header("Content-Type", "multipart/form-data; boundary=XYZ")
            .body(Full::new(Bytes::from(body)))
            .unwrap();
        assert!(req.headers().get("content-length").is_none());

        let resp = send(&state, req).await;
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(!fs.exists("/huge.bin").await);

        let form = Request::builder()
            .method("PUT")
            .uri("/edit")
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(Full::new(Bytes::from(format!("path=/{}", "p".repeat(4096)))))
            .unwrap();
        let resp = send(&state, form).await;
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(fs.list_dir("/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upload_with_no_file_chosen() {
        let fs = MemFs::new();
        let state = state_with(&fs);
        let body = "--XYZ\r\n\
            Content-Disposition: form-data; name=\"data\"; filename=\"\"\r\n\
            Content-Type: application/octet-stream\r\n\r\n\
            \r\n\
            --XYZ--\r\n";
        let req = Request::builder()
            .method("POST")
            .uri("/edit")
            .header("Content-Type", "multipart/form-data; boundary=XYZ")
            .body(Full::new(Bytes::from(body)))
            .unwrap();

        let resp = send(&state, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(fs.list_dir("/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_body_too_large() {
        let state = state_with(&MemFs::new());
        let req = Request::builder()
            .method("POST")
            .uri("/edit")
            .header("Content-Length", "4096")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let resp = send(&state, req).await;
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
