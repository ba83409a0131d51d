//! File mutation and listing handlers
//!
//! `PUT /edit` creates, `DELETE /edit` removes, `GET /list` enumerates.
//! Failures answer with a fixed plain-text code.

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::Response;
use serde::Serialize;

use super::args::RequestArgs;
use crate::config::AppState;
use crate::fs::{FsError, ROOT};
use crate::http;
use crate::logger;

pub const BAD_ARGS: &str = "BAD ARGS";
pub const BAD_PATH: &str = "BAD PATH";
pub const FILE_EXISTS: &str = "FILE EXISTS";
pub const CREATE_FAILED: &str = "CREATE FAILED";

/// One element of the `/list` JSON array
#[derive(Debug, Serialize)]
struct ListEntry<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    name: &'a str,
}

/// `PUT /edit`: create an empty file at the first argument
pub async fn handle_file_create(args: &RequestArgs, state: &AppState) -> Response<Full<Bytes>> {
    let Some(path) = args.first() else {
        return http::build_500_response(BAD_ARGS);
    };
    logger::log_debug(&format!("handleFileCreate: {path}"));
    if path == ROOT {
        return http::build_500_response(BAD_PATH);
    }
    if state.fs.exists(path).await {
        return http::build_500_response(FILE_EXISTS);
    }

    let created = match state.fs.create(path).await {
        Ok(writer) => writer.close().await,
        Err(e) => Err(e),
    };
    match created {
        Ok(_) => http::build_ok_response(),
        Err(e) => {
            logger::log_error(&format!("Create {path} failed: {e}"));
            http::build_500_response(CREATE_FAILED)
        }
    }
}

/// `DELETE /edit`: remove the file at the first argument
pub async fn handle_file_delete(args: &RequestArgs, state: &AppState) -> Response<Full<Bytes>> {
    let Some(path) = args.first() else {
        return http::build_500_response(BAD_ARGS);
    };
    logger::log_debug(&format!("handleFileDelete: {path}"));
    if path == ROOT {
        return http::build_500_response(BAD_PATH);
    }
    if !state.fs.exists(path).await {
        return http::build_404_response();
    }

    match state.fs.remove(path).await {
        Ok(()) => http::build_ok_response(),
        Err(FsError::NotFound(_)) => http::build_404_response(),
        Err(e) => {
            // Any other failure reads as a missing file to the client
            logger::log_error(&format!("Delete {path} failed: {e}"));
            http::build_404_response()
        }
    }
}

/// `GET /list?dir=P`: JSON array of `{type, name}` for entries under `P`
pub async fn handle_file_list(args: &RequestArgs, state: &AppState) -> Response<Full<Bytes>> {
    let Some(dir) = args.get("dir") else {
        return http::build_500_response(BAD_ARGS);
    };
    logger::log_debug(&format!("handleFileList: {dir}"));

    let entries = match state.fs.list_dir(dir).await {
        Ok(entries) => entries,
        Err(FsError::NotFound(_)) => Vec::new(),
        Err(e) => {
            logger::log_warning(&format!("Listing {dir} failed: {e}"));
            Vec::new()
        }
    };

    let listing: Vec<ListEntry<'_>> = entries
        .iter()
        .map(|entry| ListEntry {
            kind: "file",
            name: entry.name_in(dir),
        })
        .collect();

    match serde_json::to_string(&listing) {
        Ok(json) => http::build_json_response(json),
        Err(e) => {
            logger::log_error(&format!("Failed to serialize listing of {dir}: {e}"));
            http::build_500_response(BAD_PATH)
        }
    }
}
