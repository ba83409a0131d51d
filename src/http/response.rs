//! HTTP response building module
//!
//! Builders for the handful of responses the file browser sends.

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{Response, StatusCode};

/// Methods accepted on unmatched paths
const ALLOW_METHODS: &str = "GET, HEAD, OPTIONS";

/// Build a `text/plain` response carrying a short code
pub fn build_text_response(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("Content-Type", "text/plain")
        .body(Full::new(Bytes::from_static(body.as_bytes())))
        .unwrap_or_else(|e| {
            log_build_error(status.as_str(), &e);
            Response::new(Full::new(Bytes::from_static(body.as_bytes())))
        })
}

/// Build 200 OK with an empty body
pub fn build_ok_response() -> Response<Full<Bytes>> {
    build_text_response(StatusCode::OK, "")
}

/// Build 404 `FileNotFound` response
pub fn build_404_response() -> Response<Full<Bytes>> {
    build_text_response(StatusCode::NOT_FOUND, "FileNotFound")
}

/// Build 500 response with one of the fixed error codes
pub fn build_500_response(code: &'static str) -> Response<Full<Bytes>> {
    build_text_response(StatusCode::INTERNAL_SERVER_ERROR, code)
}

/// Build 405 Method Not Allowed response
pub fn build_405_response() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::METHOD_NOT_ALLOWED)
        .header("Content-Type", "text/plain")
        .header("Allow", ALLOW_METHODS)
        .body(Full::new(Bytes::from("405 Method Not Allowed")))
        .unwrap_or_else(|e| {
            log_build_error("405", &e);
            Response::new(Full::new(Bytes::from("405 Method Not Allowed")))
        })
}

/// Build OPTIONS response (preflight request)
pub fn build_options_response(enable_cors: bool) -> Response<Full<Bytes>> {
    let mut builder = Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Allow", ALLOW_METHODS);

    if enable_cors {
        builder = builder
            .header("Access-Control-Allow-Origin", "*")
            .header("Access-Control-Allow-Methods", "GET, HEAD, PUT, POST, DELETE, OPTIONS")
            .header("Access-Control-Allow-Headers", "Content-Type")
            .header("Access-Control-Max-Age", "86400");
    }

    builder.body(Full::new(Bytes::new())).unwrap_or_else(|e| {
        log_build_error("OPTIONS", &e);
        Response::new(Full::new(Bytes::new()))
    })
}

/// Build 413 Payload Too Large response
pub fn build_413_response() -> Response<Full<Bytes>> {
    build_text_response(StatusCode::PAYLOAD_TOO_LARGE, "413 Payload Too Large")
}

/// Build a JSON listing response (`text/json`)
pub fn build_json_response(json: String) -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "text/json")
        .body(Full::new(Bytes::from(json)))
        .unwrap_or_else(|e| {
            log_build_error("JSON", &e);
            Response::new(Full::new(Bytes::new()))
        })
}

/// Build a stored-file response
///
/// `gzip_encoded` marks a `.gz` substitute served under the original type.
pub fn build_file_response(
    data: Vec<u8>,
    content_type: &str,
    gzip_encoded: bool,
    is_head: bool,
) -> Response<Full<Bytes>> {
    let content_length = data.len();
    let body = if is_head {
        Bytes::new()
    } else {
        Bytes::from(data)
    };

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", content_type)
        .header("Content-Length", content_length);
    if gzip_encoded {
        builder = builder.header("Content-Encoding", "gzip");
    }

    builder.body(Full::new(body)).unwrap_or_else(|e| {
        log_build_error("200", &e);
        Response::new(Full::new(Bytes::new()))
    })
}

/// Log response build error
fn log_build_error(status: &str, error: &hyper::http::Error) {
    crate::logger::log_error(&format!("Failed to build {status} response: {error}"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_of(resp: Response<Full<Bytes>>) -> Bytes {
        resp.into_body().collect().await.unwrap().to_bytes()
    }

    #[tokio::test]
    async fn test_error_codes_are_plain_text() {
        let resp = build_500_response("BAD PATH");
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(resp.headers()["Content-Type"], "text/plain");
        assert_eq!(body_of(resp).await, "BAD PATH");

        let resp = build_404_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_of(resp).await, "FileNotFound");
    }

    #[tokio::test]
    async fn test_head_keeps_length_drops_body() {
        let resp = build_file_response(b"hello".to_vec(), "text/plain", false, true);
        assert_eq!(resp.headers()["Content-Length"], "5");
        assert!(resp.headers().get("Content-Encoding").is_none());
        assert!(body_of(resp).await.is_empty());
    }

    #[test]
    fn test_gzip_encoding_header() {
        let resp = build_file_response(vec![0x1f, 0x8b], "text/html", true, false);
        assert_eq!(resp.headers()["Content-Encoding"], "gzip");
        assert_eq!(resp.headers()["Content-Type"], "text/html");
    }

    #[test]
    fn test_options_with_cors() {
        let resp = build_options_response(true);
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        assert_eq!(resp.headers()["Access-Control-Allow-Origin"], "*");
        assert!(build_options_response(false)
            .headers()
            .get("Access-Control-Allow-Origin")
            .is_none());
    }
}
