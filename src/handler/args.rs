//! Request argument collection
//!
//! Arguments come from the query string first, then from a form body
//! (`application/x-www-form-urlencoded` or the text fields of
//! `multipart/form-data`). "First argument" means the first pair in that
//! order.

use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::{Body, Bytes};
use hyper::header::CONTENT_TYPE;
use hyper::Request;
use thiserror::Error;
use url::form_urlencoded;

use crate::logger;

/// Ordered name/value pairs of one request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestArgs {
    pairs: Vec<(String, String)>,
}

impl RequestArgs {
    /// Parse the query string of a request URI
    pub fn from_query(query: Option<&str>) -> Self {
        let mut args = Self::default();
        if let Some(query) = query {
            args.extend_urlencoded(query.as_bytes());
        }
        args
    }

    /// Append pairs from an urlencoded string
    pub fn extend_urlencoded(&mut self, input: &[u8]) {
        self.pairs.extend(
            form_urlencoded::parse(input).map(|(k, v)| (k.into_owned(), v.into_owned())),
        );
    }

    pub fn push(&mut self, name: String, value: String) {
        self.pairs.push((name, value));
    }

    /// Value of the first argument, whatever its name
    pub fn first(&self) -> Option<&str> {
        self.pairs.first().map(|(_, v)| v.as_str())
    }

    /// Value of the first argument called `name`
    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn has(&self, name: &str) -> bool {
        self.pairs.iter().any(|(k, _)| k == name)
    }
}

/// The request body is larger than `http.max_body_size`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("request body exceeds {limit} bytes")]
pub struct BodyLimitExceeded {
    pub limit: u64,
}

/// Read form fields from the request body into `args`
///
/// At most `max_body_size` bytes are read. Bodies of any other content type
/// are ignored; malformed forms are logged and contribute no arguments.
pub async fn read_form_args<B>(
    req: Request<B>,
    args: &mut RequestArgs,
    max_body_size: u64,
) -> Result<(), BodyLimitExceeded>
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let content_type = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string);
    let Some(content_type) = content_type else {
        return Ok(());
    };
    let too_large = BodyLimitExceeded {
        limit: max_body_size,
    };

    if content_type.starts_with("application/x-www-form-urlencoded") {
        let limit = usize::try_from(max_body_size).unwrap_or(usize::MAX);
        match Limited::new(req.into_body(), limit).collect().await {
            Ok(collected) => args.extend_urlencoded(&collected.to_bytes()),
            Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => return Err(too_large),
            Err(e) => logger::log_warning(&format!("Failed to read form body: {e}")),
        }
    } else if let Ok(boundary) = multer::parse_boundary(&content_type) {
        let mut multipart = multer::Multipart::with_constraints(
            req.into_body().into_data_stream(),
            boundary,
            body_constraints(max_body_size),
        );
        match read_multipart_fields(&mut multipart, args).await {
            Ok(()) => {}
            Err(multer::Error::StreamSizeExceeded { .. }) => return Err(too_large),
            Err(e) => logger::log_warning(&format!("Failed to parse multipart form: {e}")),
        }
    }
    Ok(())
}

/// Multipart constraints capping the whole body at `max_body_size`
pub fn body_constraints(max_body_size: u64) -> multer::Constraints {
    multer::Constraints::new().size_limit(multer::SizeLimit::new().whole_stream(max_body_size))
}

async fn read_multipart_fields(
    multipart: &mut multer::Multipart<'static>,
    args: &mut RequestArgs,
) -> Result<(), multer::Error> {
    while let Some(field) = multipart.next_field().await? {
        if field.file_name().is_some() {
            // File parts carry no arguments; read to the end and discard
            field.bytes().await?;
            continue;
        }
        let name = field.name().unwrap_or_default().to_string();
        let value = field.text().await?;
        args.push(name, value);
    }
    Ok(())
}

/// Percent-decode a request path
///
/// Invalid escapes are kept verbatim; a result that is not UTF-8 falls back
/// to the raw path.
pub fn decode_path(raw: &str) -> String {
    if !raw.contains('%') {
        return raw.to_string();
    }
    let bytes = raw.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(byte) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                decoded.push(byte);
                i += 3;
                continue;
            }
        }
        decoded.push(bytes[i]);
        i += 1;
    }
    String::from_utf8(decoded).unwrap_or_else(|_| raw.to_string())
}
