//! Purpose: Session-wide settings: endpoint, identity, limits, and retry policies.
//! Exports: `SessionConfig`, `EditPolicy`, `UploadPolicy`.
//! Role: Plain values built once and shared read-only by every operation of a session.
//! Invariants: The API endpoint is an absolute http(s) URL with a host.
//! Invariants: Attempt counts and chunk sizes are at least 1.
#![allow(clippy::result_large_err)]

use super::ApiResult;
use crate::core::backoff::BackoffPolicy;
use crate::core::error::{Error, ErrorKind};
use std::time::Duration;
use url::Url;

pub const DEFAULT_MAX_RESULT_LIMIT: u32 = 500;
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_CHUNK_SIZE: u64 = 4 * 1024 * 1024;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EditPolicy {
    max_attempts: usize,
    max_elapsed: Option<Duration>,
}

impl Default for EditPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            max_elapsed: None,
        }
    }
}

impl EditPolicy {
    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Stops retrying once this much time has passed since the first attempt.
    pub fn with_max_elapsed(mut self, limit: Duration) -> Self {
        self.max_elapsed = Some(limit);
        self
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    pub fn max_elapsed(&self) -> Option<Duration> {
        self.max_elapsed
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadPolicy {
    chunk_size: u64,
    chunk_attempts: usize,
    unstash_attempts: usize,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_attempts: 5,
            unstash_attempts: 3,
        }
    }
}

impl UploadPolicy {
    pub fn with_chunk_size(mut self, bytes: u64) -> Self {
        self.chunk_size = bytes.max(1);
        self
    }

    pub fn with_chunk_attempts(mut self, attempts: usize) -> Self {
        self.chunk_attempts = attempts.max(1);
        self
    }

    pub fn with_unstash_attempts(mut self, attempts: usize) -> Self {
        self.unstash_attempts = attempts.max(1);
        self
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn chunk_attempts(&self) -> usize {
        self.chunk_attempts
    }

    pub fn unstash_attempts(&self) -> usize {
        self.unstash_attempts
    }
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    api_url: Url,
    user_agent: String,
    max_result_limit: u32,
    read_timeout: Duration,
    backoff: BackoffPolicy,
    edit: EditPolicy,
    upload: UploadPolicy,
}

impl SessionConfig {
    /// `api_url` is the full `api.php` endpoint, e.g. `https://en.wikipedia.org/w/api.php`.
    pub fn new(api_url: &str) -> ApiResult<Self> {
        Ok(Self {
            api_url: parse_api_url(api_url)?,
            user_agent: default_user_agent(),
            max_result_limit: DEFAULT_MAX_RESULT_LIMIT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            backoff: BackoffPolicy::default(),
            edit: EditPolicy::default(),
            upload: UploadPolicy::default(),
        })
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_max_result_limit(mut self, limit: u32) -> Self {
        self.max_result_limit = limit.max(1);
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_edit_policy(mut self, edit: EditPolicy) -> Self {
        self.edit = edit;
        self
    }

    pub fn with_upload_policy(mut self, upload: UploadPolicy) -> Self {
        self.upload = upload;
        self
    }

    /// Same settings pointed at another host; path and scheme are kept.
    pub fn retarget(&self, host: &str) -> ApiResult<Self> {
        let mut api_url = self.api_url.clone();
        api_url.set_host(Some(host)).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message(format!("invalid host {host:?}"))
                .with_source(err)
        })?;
        Ok(Self {
            api_url,
            ..self.clone()
        })
    }

    pub fn api_url(&self) -> &Url {
        &self.api_url
    }

    pub fn host(&self) -> &str {
        self.api_url.host_str().unwrap_or_default()
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn max_result_limit(&self) -> u32 {
        self.max_result_limit
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    pub fn backoff(&self) -> &BackoffPolicy {
        &self.backoff
    }

    pub fn edit_policy(&self) -> &EditPolicy {
        &self.edit
    }

    pub fn upload_policy(&self) -> &UploadPolicy {
        &self.upload
    }
}

fn default_user_agent() -> String {
    format!("mwclient/{}", env!("CARGO_PKG_VERSION"))
}

fn parse_api_url(raw: &str) -> ApiResult<Url> {
    let mut url = Url::parse(raw).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message("invalid api url")
            .with_hint("Pass the full endpoint, e.g. https://en.wikipedia.org/w/api.php.")
            .with_source(err)
    })?;
    let scheme = url.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(Error::new(ErrorKind::Usage).with_message("api url must use http or https scheme"));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(Error::new(ErrorKind::Usage).with_message("api url must include a host"));
    }
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}
