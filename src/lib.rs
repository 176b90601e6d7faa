//! Purpose: Resilient blocking client for MediaWiki-style `api.php` endpoints.
//! Exports: `api` (sessions, query cursors, actions, uploads) and `core` (building blocks).
//! Role: Library backing the `mwclient` binary and its tests.
//! Invariants: One `Session` per wiki host; clones share cookies, token, and connections.
//! Invariants: Core modules are pure and never touch the network.
pub mod api;
pub mod core;
