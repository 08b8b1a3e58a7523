//! Per-connection request handler.
//!
//! Each accepted connection is served entirely on one worker thread:
//! read → parse → upgrade check → method dispatch → path resolve → cache
//! probe → conditional evaluate → open → serve → close.  Every stage
//! returns a compact error kind; statuses are emitted at a single point.
use crate::api;
use crate::cache::CacheTree;
use crate::config::ServerConfig;
use crate::conn::ClientStream;
use crate::http_error::HttpError;
use crate::log::{debug, error, info, tag, warn, Tag};
use crate::mime::MimeTable;
use crate::request::{read_request, target_is_safe, Request, REQUEST_BUF_SIZE};
use crate::response::{
    send_error, send_file, send_not_modified, send_options, send_range_not_satisfiable,
    send_redirect, SendOutcome,
};
use fixed_buffer::FixedBuf;
use std::fs::File;
use std::io::Write;
use std::net::SocketAddr;

/// Serves one connection and closes it.  Exactly one response is emitted
/// for every request that arrives; a connection that closes before sending
/// a request gets none.
pub fn handle_client(
    mut stream: ClientStream,
    peer: SocketAddr,
    tree: &CacheTree,
    config: &ServerConfig,
    mime: &MimeTable,
) {
    let mut buf: FixedBuf<REQUEST_BUF_SIZE> = FixedBuf::new();
    match read_request(&mut buf, &mut stream) {
        Ok(req) => {
            info(
                "request",
                vec![
                    tag("id", req.id),
                    tag("peer", peer),
                    tag("method", req.method.as_str()),
                    tag("target", req.target.as_str()),
                    tag("version", req.version.as_str()),
                ],
            );
            debug(
                "request details",
                vec![
                    tag("id", req.id),
                    tag("keep_alive", u64::from(req.keep_alive)),
                    tag("etag", req.if_none_match),
                    tag("dnt", u64::from(req.dnt)),
                    tag("gpc", u64::from(req.gpc)),
                    tag("user_agent", req.user_agent.clone().unwrap_or_default()),
                ],
            );
            let is_tls = stream.is_tls();
            if let Err(e) = respond(&mut stream, is_tls, &req, tree, config, mime) {
                emit_error(&mut stream, Some(&req), &e);
            }
        }
        Err(HttpError::Disconnected) => {
            debug("connection closed without a request", vec![tag("peer", peer)]);
        }
        Err(e) => emit_error(&mut stream, None, &e),
    }
    stream.shutdown();
}

/// The single status emission point for failed requests.
/// [`HttpError::Disconnected`] emits nothing.
fn emit_error(writer: &mut impl Write, req: Option<&Request>, e: &HttpError) {
    if *e == HttpError::Disconnected {
        return;
    }
    let mut tags: Vec<Tag> = vec![tag("code", e.status()), tag("error", e.description())];
    if let Some(req) = req {
        tags.push(tag("id", req.id));
    }
    if e.is_server_error() {
        error("request failed", tags);
    } else {
        warn("rejected request", tags);
    }
    let version = req.map_or("HTTP/1.1", |r| r.version.as_str());
    let _ignored = match e {
        HttpError::RangeNotSatisfiable(size) => send_range_not_satisfiable(writer, version, *size),
        _ => send_error(writer, version, e.status()),
    };
}

/// Runs the post-parse stages for one request.
///
/// # Errors
/// Returns the error kind for the caller to emit.
pub fn respond(
    writer: &mut impl Write,
    is_tls: bool,
    req: &Request,
    tree: &CacheTree,
    config: &ServerConfig,
    mime: &MimeTable,
) -> Result<(), HttpError> {
    // Plaintext requests that ask for it are pointed at the TLS port.
    if !is_tls && req.upgrade_insecure {
        let location = format!(
            "https://{}{}",
            req.host.as_deref().unwrap_or("localhost"),
            req.target
        );
        info(
            "redirecting to https",
            vec![tag("id", req.id), tag("location", location.as_str())],
        );
        let _ignored = send_redirect(writer, req, &location);
        return Ok(());
    }

    if req.method == "OPTIONS" {
        info("options", vec![tag("id", req.id)]);
        let _ignored = send_options(writer, req);
        return Ok(());
    }
    if req.method != "GET" && req.method != "HEAD" {
        return Err(HttpError::UnsupportedMethod);
    }

    if req.method == "GET" && api::is_api_target(&req.target) {
        info(
            "api request",
            vec![tag("id", req.id), tag("target", req.target.as_str())],
        );
        let _ignored = api::handle(writer, req);
        return Ok(());
    }

    let page = if req.target == "/" {
        "/landing.html"
    } else {
        req.target.as_str()
    };
    let full_path = format!("{}/webpages{}", config.webroot, page);
    if !target_is_safe(&full_path) {
        return Err(HttpError::ForbiddenPath);
    }

    let entry = tree.lookup(&full_path);
    if let Some(entry) = entry {
        if req.if_none_match != 0 && req.if_none_match == entry.file_hash {
            info(
                "etag match, not modified",
                vec![tag("id", req.id), tag("etag", entry.file_hash)],
            );
            let _ignored = send_not_modified(writer, req, entry, is_tls);
            return Ok(());
        }
        if let (Some(since), Some(last_modified)) = (&req.if_modified_since, &entry.last_modified)
        {
            // Lexicographic comparison works because both sides are in the
            // one canonical GMT form.
            if since.as_str() >= last_modified.as_str() {
                info("not modified since", vec![tag("id", req.id)]);
                let _ignored = send_not_modified(writer, req, entry, is_tls);
                return Ok(());
            }
        }
    }

    let mut file = File::open(&full_path).map_err(HttpError::from_open_error)?;
    let media_type = mime.for_path(&full_path);
    match send_file(&mut *writer, req, entry, media_type, is_tls, &mut file)? {
        SendOutcome::Completed { body_bytes } => {
            info(
                "response sent",
                vec![
                    tag("id", req.id),
                    tag("code", if req.range.is_some() { 206_u16 } else { 200 }),
                    tag("body_bytes", body_bytes),
                ],
            );
        }
        SendOutcome::PeerClosed { body_bytes } => {
            // Normal termination; seeking video players abort reads.
            info(
                "client disconnected mid-response",
                vec![tag("id", req.id), tag("body_bytes", body_bytes)],
            );
        }
        SendOutcome::Failed { error: e, body_bytes } => {
            error(
                "send failed",
                vec![
                    tag("id", req.id),
                    tag("error", e),
                    tag("body_bytes", body_bytes),
                ],
            );
        }
    }
    Ok(())
}
