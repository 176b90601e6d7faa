//! Purpose: Chunked, stash-backed file uploads and upload-by-URL.
//! Exports: `ChunkedUploadManager`, `ChunkReader`, `UploadChunk`, `StashHandle`, `UploadRequest`.
//! Role: Streams a local file in fixed windows, threads the stash file key, then unstashes.
//! Invariants: Chunks cover `[0, size)` contiguously; their lengths sum to the file size.
//! Invariants: A chunk is retried on the same offset until a file key comes back or attempts run out.
//! Invariants: `ratelimited` chunk replies back off without using an attempt.
//! Invariants: Local read failures are `Err`; remote failures end in a reply.
#![allow(clippy::result_large_err)]

use super::ApiResult;
use super::action::ActionExecutor;
use super::session::{ApiCall, Session};
use super::transport::FilePart;
use crate::core::error::{Error, ErrorKind};
use crate::core::reply::ActionReply;
use serde_json::Value;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::thread;

const CHUNK_FIELD: &str = "chunk";
const CHUNK_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Clone, PartialEq, Eq)]
pub struct UploadChunk {
    pub offset: u64,
    pub total_size: u64,
    pub data: Vec<u8>,
    /// 1-based position in the sequence.
    pub index: u64,
    pub total: u64,
}

impl std::fmt::Debug for UploadChunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadChunk")
            .field("offset", &self.offset)
            .field("total_size", &self.total_size)
            .field("len", &self.data.len())
            .field("index", &self.index)
            .field("total", &self.total)
            .finish()
    }
}

/// Splits a byte source of known size into `chunk_size` windows.
#[derive(Debug)]
pub struct ChunkReader<R> {
    source: R,
    chunk_size: u64,
    total_size: u64,
    offset: u64,
    index: u64,
}

impl<R: Read> ChunkReader<R> {
    pub fn new(source: R, total_size: u64, chunk_size: u64) -> Self {
        Self {
            source,
            chunk_size: chunk_size.max(1),
            total_size,
            offset: 0,
            index: 0,
        }
    }

    pub fn total_chunks(&self) -> u64 {
        self.total_size.div_ceil(self.chunk_size)
    }

    pub fn has_more(&self) -> bool {
        self.offset < self.total_size
    }

    pub fn next_chunk(&mut self) -> ApiResult<Option<UploadChunk>> {
        if !self.has_more() {
            return Ok(None);
        }
        let want = self.chunk_size.min(self.total_size - self.offset);
        let mut data = Vec::with_capacity(usize::try_from(want).unwrap_or_default());
        (&mut self.source)
            .take(want)
            .read_to_end(&mut data)
            .map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("failed to read upload source")
                    .with_source(err)
            })?;
        if data.len() as u64 != want {
            return Err(Error::new(ErrorKind::Io).with_message(format!(
                "upload source ended early at byte {} of {}",
                self.offset + data.len() as u64,
                self.total_size
            )));
        }

        self.index += 1;
        let chunk = UploadChunk {
            offset: self.offset,
            total_size: self.total_size,
            data,
            index: self.index,
            total: self.total_chunks(),
        };
        self.offset += want;
        Ok(Some(chunk))
    }
}

/// Stash file key threaded through successive chunk uploads.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StashHandle {
    file_key: Option<String>,
}

impl StashHandle {
    pub fn file_key(&self) -> Option<&str> {
        self.file_key.as_deref()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadRequest {
    /// Destination title, e.g. `File:Example.png`.
    pub title: String,
    /// Description page wikitext.
    pub text: String,
    pub summary: String,
}

impl UploadRequest {
    pub fn new(title: impl Into<String>, text: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            text: text.into(),
            summary: summary.into(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ChunkedUploadManager {
    executor: ActionExecutor,
}

impl ChunkedUploadManager {
    pub fn new(session: &Session) -> Self {
        Self {
            executor: ActionExecutor::new(session),
        }
    }

    /// Uploads `path` in chunks and publishes it under `request.title`.
    pub fn upload(&self, path: &Path, request: &UploadRequest) -> ApiResult<ActionReply> {
        let file = File::open(path).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to open upload source")
                .with_path(path)
                .with_source(err)
        })?;
        let size = file
            .metadata()
            .map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("failed to stat upload source")
                    .with_path(path)
                    .with_source(err)
            })?
            .len();
        if size == 0 {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("cannot upload an empty file")
                .with_path(path));
        }
        let local_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| request.title.clone());

        tracing::info!("uploading {} as {}", path.display(), request.title);
        let chunk_size = self.executor.session().config().upload_policy().chunk_size();
        let reader = ChunkReader::new(BufReader::new(file), size, chunk_size);
        self.upload_from(reader, &local_name, request)
            .map_err(|err| err.with_path(path))
    }

    /// Same as [`upload`](Self::upload) over an arbitrary reader.
    pub fn upload_from<R: Read>(
        &self,
        mut reader: ChunkReader<R>,
        local_name: &str,
        request: &UploadRequest,
    ) -> ApiResult<ActionReply> {
        let mut stash = StashHandle::default();
        while let Some(chunk) = reader.next_chunk()? {
            tracing::trace!(
                "uploading chunk {} of {} of {}",
                chunk.index,
                chunk.total,
                local_name
            );
            match self.upload_chunk(&chunk, local_name, request, &stash) {
                Some(key) => stash.file_key = Some(key),
                None => {
                    tracing::error!(
                        "chunk {} of {} of {} failed; abandoning upload",
                        chunk.index,
                        chunk.total,
                        local_name
                    );
                    return Ok(ActionReply::null());
                }
            }
        }

        match stash.file_key() {
            Some(key) => Ok(self.unstash(key, request)),
            None => Ok(ActionReply::null()),
        }
    }

    pub fn upload_by_url(&self, url: &url::Url, request: &UploadRequest) -> ActionReply {
        tracing::info!("uploading {url} as {}", request.title);
        let call = ApiCall::post("upload")
            .param("filename", request.title.as_str())
            .param("text", request.text.as_str())
            .param("comment", request.summary.as_str())
            .param("ignorewarnings", "true")
            .param("url", url.as_str())
            .with_token(true);
        self.executor.execute_call(&call)
    }

    fn upload_chunk(
        &self,
        chunk: &UploadChunk,
        local_name: &str,
        request: &UploadRequest,
        stash: &StashHandle,
    ) -> Option<String> {
        let mut call = ApiCall::post("upload")
            .param("filename", request.title.as_str())
            .param("ignorewarnings", "1")
            .param("stash", "1")
            .param("offset", chunk.offset.to_string())
            .param("filesize", chunk.total_size.to_string())
            .with_token(true);
        if let Some(key) = stash.file_key() {
            call = call.param("filekey", key);
        }
        let call = call.file(FilePart {
            field: CHUNK_FIELD.to_string(),
            filename: local_name.to_string(),
            content_type: CHUNK_CONTENT_TYPE.to_string(),
            data: chunk.data.clone(),
        });

        let session = self.executor.session();
        let attempts = session.config().upload_policy().chunk_attempts();
        let mut backoff = session.config().backoff().start();
        let mut attempt = 0;
        while attempt < attempts {
            match session.tokenized_request(&call) {
                Ok(body) => {
                    if let Some(key) = body.pointer("/upload/filekey").and_then(Value::as_str) {
                        return Some(key.to_string());
                    }
                    let reply = ActionReply::wrap("upload", body);
                    if reply.has_error_code("ratelimited") {
                        let wait = backoff.next_wait();
                        tracing::warn!(
                            "rate limited on chunk {} of {}; waiting {:?} (window {})",
                            chunk.index,
                            chunk.total,
                            wait,
                            backoff.bound()
                        );
                        thread::sleep(wait);
                        continue;
                    }
                    attempt += 1;
                    tracing::warn!(
                        "chunk {} of {} returned no file key (attempt {attempt}/{attempts}): {}",
                        chunk.index,
                        chunk.total,
                        reply.error_code().unwrap_or("no error code")
                    );
                }
                Err(err) => {
                    attempt += 1;
                    tracing::warn!(
                        "chunk {} of {} failed (attempt {attempt}/{attempts}): {err}",
                        chunk.index,
                        chunk.total
                    );
                }
            }
        }
        None
    }

    fn unstash(&self, file_key: &str, request: &UploadRequest) -> ActionReply {
        let call = ApiCall::post("upload")
            .param("filename", request.title.as_str())
            .param("text", request.text.as_str())
            .param("comment", request.summary.as_str())
            .param("filekey", file_key)
            .param("ignorewarnings", "true")
            .with_token(true);

        let attempts = self.executor.session().config().upload_policy().unstash_attempts();
        let mut last = ActionReply::null();
        for attempt in 1..=attempts {
            tracing::info!("unstashing {file_key} as {}", request.title);
            last = self.executor.execute_call(&call);
            if last.is_success() {
                return last;
            }
            tracing::error!(
                "unstash of {} failed (attempt {attempt}/{attempts}): {}",
                request.title,
                last.raw()
            );
        }
        last
    }
}
