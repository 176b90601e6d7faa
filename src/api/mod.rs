//! Purpose: Public client API: sessions, queries, actions, uploads, and batch helpers.
//! Exports: Session and config types, `QueryCursor`, `ActionExecutor`, upload types, reply types.
//! Role: The stable surface used by the CLI and by library callers.
//! Invariants: Every network exchange goes through `Session::tokenized_request`.
//! Invariants: Remote failures surface as replies; `Err` means misuse or a local fault.

mod action;
pub mod bulk;
mod config;
pub mod ops;
mod query;
mod session;
mod transport;
mod upload;

pub use crate::core::backoff::{Backoff, BackoffPolicy};
pub use crate::core::batch::{BatchGrouper, MAX_GROUP_QUERY};
#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::reply::{ActionReply, NormalizationMap, QueryReply, ReplyBody};
pub use crate::core::template::{self, ParamTemplate};
pub use action::{ActionExecutor, EditRequest};
pub use config::{EditPolicy, SessionConfig, UploadPolicy};
pub use query::QueryCursor;
pub use session::{ANONYMOUS_TOKEN, ApiCall, ApiResult, Session};
pub use transport::{
    ApiRequest, ApiResponse, FilePart, HttpTransport, Method, RequestBody, Transport,
    encode_multipart,
};
pub use upload::{ChunkReader, ChunkedUploadManager, StashHandle, UploadChunk, UploadRequest};
