// Core building blocks: errors, reply classification, templates, batching, backoff, cookies.
pub mod backoff;
pub mod batch;
pub mod cookies;
pub mod error;
pub mod reply;
pub mod template;
