//! Snap
//! ====
//!
//! A static-content HTTP/1.x origin server.
//!
//! # Features
//! - `forbid(unsafe_code)`
//! - Plaintext and TLS listeners served by one acceptor thread
//! - Bounded worker pool with blocking per-connection handlers
//! - Conditional GET with strong (`ETag`) and weak (`Last-Modified`)
//!   validators backed by a content-addressed fingerprint tree
//! - Byte-range requests, including suffix and open-ended forms
//! - Signal-driven graceful shutdown and cache refresh
//!
//! # Limitations
//! - Does not support:
//!   - HTTP/2
//!   - chunked transfer encoding
//!   - request pipelining (connections close after one response)
//!   - virtual hosting
//!   - on-disk change notification (refresh the cache with `SIGUSR1`)
//!
//! # Usage
//! ```text
//! $ snap -w /srv/snap -p 8080 -s 8443 -t 20
//! ```
//! Static files are served from `{webroot}/webpages`.  The target `/` is
//! rewritten to `/landing.html`.  Files under `/videos/` are served but
//! never cached.
#![forbid(unsafe_code)]
pub mod api;
pub mod cache;
pub mod config;
pub mod conn;
pub mod handler;
pub mod http_error;
pub mod log;
pub mod mime;
pub mod pool;
pub mod request;
pub mod response;
pub mod server;
pub mod time;
pub mod tls;

pub use crate::cache::{CacheEntry, CacheTree};
pub use crate::config::ServerConfig;
pub use crate::conn::ClientStream;
pub use crate::http_error::HttpError;
pub use crate::mime::MimeTable;
pub use crate::pool::WorkerPool;
pub use crate::request::Request;
pub use crate::response::SERVER_NAME;
