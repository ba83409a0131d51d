//! File upload handling
//!
//! An upload runs as three phases: START opens the destination, WRITE appends
//! a chunk, END closes it. Each POST owns its `UploadSession`, so concurrent
//! uploads never share a handle.

use http_body_util::{BodyExt, Full};
use hyper::body::{Body, Bytes};
use hyper::header::CONTENT_TYPE;
use hyper::{Request, Response};
use std::sync::Arc;
use thiserror::Error;

use crate::config::AppState;
use crate::fs::{FileWriter, FlashFs, FsError};
use crate::handler::args::body_constraints;
use crate::handler::edit::BAD_ARGS;
use crate::http;
use crate::logger;

/// Error code sent when an upload could not be stored
pub const UPLOAD_FAILED: &str = "UPLOAD FAILED";

/// One phase of a streamed upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadEvent<'a> {
    Start { filename: &'a str },
    Write(&'a [u8]),
    End,
}

/// Upload failures surfaced to the client
#[derive(Debug, Error)]
pub enum UploadError {
    /// WRITE arrived with no open destination
    #[error("no upload in progress")]
    NotStarted,

    #[error("cannot open {path} for writing: {source}")]
    Open {
        path: String,
        #[source]
        source: FsError,
    },

    #[error("write to {path} failed: {source}")]
    Write {
        path: String,
        #[source]
        source: FsError,
    },

    #[error("closing {path} failed: {source}")]
    Close {
        path: String,
        #[source]
        source: FsError,
    },

    #[error("malformed multipart body: {0}")]
    Multipart(#[from] multer::Error),
}

impl UploadError {
    /// The body went over the configured size limit
    pub const fn is_too_large(&self) -> bool {
        matches!(self, Self::Multipart(multer::Error::StreamSizeExceeded { .. }))
    }
}

/// A file fully written by an upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedUpload {
    pub path: String,
    pub size: u64,
}

enum UploadState {
    Idle,
    Writing {
        path: String,
        writer: Box<dyn FileWriter>,
    },
}

/// Per-request upload context: `Idle -> Writing (START) -> Idle (END)`
pub struct UploadSession {
    fs: Arc<dyn FlashFs>,
    state: UploadState,
}

/// Destination path for an uploaded file name
pub fn upload_path(filename: &str) -> String {
    if filename.starts_with('/') {
        filename.to_string()
    } else {
        format!("/{filename}")
    }
}

impl UploadSession {
    pub fn new(fs: Arc<dyn FlashFs>) -> Self {
        Self {
            fs,
            state: UploadState::Idle,
        }
    }

    /// Drive the session with one event
    ///
    /// Returns the finished file on END when a destination was open.
    pub async fn handle(
        &mut self,
        event: UploadEvent<'_>,
    ) -> Result<Option<CompletedUpload>, UploadError> {
        match event {
            UploadEvent::Start { filename } => self.start(filename).await.map(|()| None),
            UploadEvent::Write(chunk) => self.write(chunk).await.map(|()| None),
            UploadEvent::End => self.end().await,
        }
    }

    /// Open the destination derived from `filename`, replacing any open handle
    pub async fn start(&mut self, filename: &str) -> Result<(), UploadError> {
        if let UploadState::Writing { path, writer } =
            std::mem::replace(&mut self.state, UploadState::Idle)
        {
            logger::log_warning(&format!("Upload of {path} replaced before END"));
            if let Err(e) = writer.close().await {
                logger::log_warning(&format!("Closing replaced upload {path} failed: {e}"));
            }
        }

        let path = upload_path(filename);
        logger::log_debug(&format!("handleFileUpload Name: {path}"));
        let writer = self
            .fs
            .create(&path)
            .await
            .map_err(|source| UploadError::Open {
                path: path.clone(),
                source,
            })?;
        self.state = UploadState::Writing { path, writer };
        Ok(())
    }

    /// Append a chunk to the open destination
    pub async fn write(&mut self, chunk: &[u8]) -> Result<(), UploadError> {
        let UploadState::Writing { path, writer } = &mut self.state else {
            return Err(UploadError::NotStarted);
        };
        if let Err(source) = writer.write(chunk).await {
            let path = path.clone();
            // The destination is unusable after a failed write
            self.state = UploadState::Idle;
            return Err(UploadError::Write { path, source });
        }
        Ok(())
    }

    /// Close the destination if one is open
    pub async fn end(&mut self) -> Result<Option<CompletedUpload>, UploadError> {
        match std::mem::replace(&mut self.state, UploadState::Idle) {
            UploadState::Idle => Ok(None),
            UploadState::Writing { path, writer } => {
                let size = writer.close().await.map_err(|source| UploadError::Close {
                    path: path.clone(),
                    source,
                })?;
                logger::log_debug(&format!("handleFileUpload Size: {size}"));
                Ok(Some(CompletedUpload { path, size }))
            }
        }
    }

    /// Drop the open destination and remove what was written so far
    pub async fn abort(&mut self) {
        if let UploadState::Writing { path, writer } =
            std::mem::replace(&mut self.state, UploadState::Idle)
        {
            drop(writer);
            match self.fs.remove(&path).await {
                Ok(()) | Err(FsError::NotFound(_)) => {
                    logger::log_warning(&format!("Discarded partial upload {path}"));
                }
                Err(e) => logger::log_error(&format!("Removing partial upload {path} failed: {e}")),
            }
        }
    }
}

/// Stream every file part of a multipart body through an upload session
///
/// The body is capped at `max_body_size` bytes. On failure the file being
/// written is removed; files completed earlier in the body are kept.
pub async fn store_multipart_upload<B>(
    req: Request<B>,
    boundary: String,
    fs: Arc<dyn FlashFs>,
    max_body_size: u64,
) -> Result<Vec<CompletedUpload>, UploadError>
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let mut multipart = multer::Multipart::with_constraints(
        req.into_body().into_data_stream(),
        boundary,
        body_constraints(max_body_size),
    );
    let mut session = UploadSession::new(fs);
    let mut completed = Vec::new();

    match stream_file_parts(&mut multipart, &mut session, &mut completed).await {
        Ok(()) => Ok(completed),
        Err(e) => {
            session.abort().await;
            Err(e)
        }
    }
}

async fn stream_file_parts(
    multipart: &mut multer::Multipart<'static>,
    session: &mut UploadSession,
    completed: &mut Vec<CompletedUpload>,
) -> Result<(), UploadError> {
    while let Some(mut field) = multipart.next_field().await? {
        // Plain form fields and empty file inputs are not part of the upload
        let filename = field
            .file_name()
            .filter(|name| !name.is_empty())
            .map(ToString::to_string);
        let Some(filename) = filename else {
            field.bytes().await?;
            continue;
        };

        session.handle(UploadEvent::Start { filename: &filename }).await?;
        while let Some(chunk) = field.chunk().await? {
            session.handle(UploadEvent::Write(&chunk[..])).await?;
        }
        if let Some(done) = session.handle(UploadEvent::End).await? {
            completed.push(done);
        }
    }
    Ok(())
}

/// `POST /edit`: store uploaded files, reply 200 with an empty body
///
/// A body over `http.max_body_size` answers 413, any other failure 500
/// `UPLOAD FAILED`.
pub async fn handle_file_upload<B>(req: Request<B>, state: &Arc<AppState>) -> Response<Full<Bytes>>
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let boundary = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|ct| multer::parse_boundary(ct).ok());
    let Some(boundary) = boundary else {
        logger::log_warning("Upload without multipart/form-data boundary");
        return http::build_500_response(BAD_ARGS);
    };

    let max_body_size = state.config.http.max_body_size;
    match store_multipart_upload(req, boundary, Arc::clone(&state.fs), max_body_size).await {
        Ok(completed) => {
            for upload in &completed {
                logger::log_info(&format!("[Upload] Stored {} ({} bytes)", upload.path, upload.size));
            }
            http::build_ok_response()
        }
        Err(e) if e.is_too_large() => {
            logger::log_error(&format!("Upload rejected: {e}"));
            http::build_413_response()
        }
        Err(e) => {
            logger::log_error(&format!("Upload failed: {e}"));
            http::build_500_response(UPLOAD_FAILED)
        }
    }
}
