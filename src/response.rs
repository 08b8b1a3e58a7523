//! Response writer.
//!
//! Emits four classes of response: full file (200), partial content (206),
//! metadata-only (304, 301, 416, OPTIONS, error pages), and HEAD.  Headers
//! are built deterministically into one buffer and written before the body.
//! A peer that goes away mid-body (`ECONNRESET`/`EPIPE`) is a normal
//! termination; video-seeking clients abort routinely.
use crate::cache::CacheEntry;
use crate::http_error::HttpError;
use crate::request::{ByteRange, Request};
use crate::time::FormatTime;
use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::time::SystemTime;

pub const SERVER_NAME: &str = "Snap/0.4";
const STREAM_BUF_SIZE: usize = 64 * 1024;

#[must_use]
pub fn reason_phrase(code: u16) -> &'static str {
    match code {
        200 => "OK",
        206 => "Partial Content",
        301 => "Moved Permanently",
        304 => "Not Modified",
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        416 => "Range Not Satisfiable",
        418 => "I'm a teapot",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        505 => "HTTP Version Not Supported",
        _ => "Unknown",
    }
}

/// The minimal HTML body sent with error statuses.
#[must_use]
pub fn error_page(code: u16) -> String {
    let msg = reason_phrase(code);
    format!(
        "<html><head><title>{code} {msg}</title></head>\
         <body><h1>{code} {msg}</h1><hr><p>{SERVER_NAME}</p></body></html>"
    )
}

/// How a file transfer ended.  `body_bytes` counts body bytes only,
/// not headers.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SendOutcome {
    Completed { body_bytes: u64 },
    /// The peer closed the connection mid-response.  Normal termination.
    PeerClosed { body_bytes: u64 },
    /// A fatal transport error.
    Failed { error: String, body_bytes: u64 },
}

fn is_peer_close(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::ConnectionReset | ErrorKind::BrokenPipe | ErrorKind::ConnectionAborted
    )
}

/// Clamps a parsed byte range to a file of `size` bytes, yielding absolute
/// inclusive offsets.
///
/// # Errors
/// Returns `Err` when the range is unsatisfiable (`start >= size` or an
/// empty clamped range); the caller responds with 416.
#[allow(clippy::result_unit_err)]
pub fn resolve_range(range: ByteRange, size: u64) -> Result<(u64, u64), ()> {
    let n = i64::try_from(size).map_err(|_| ())?;
    let (start, end) = if range.start < 0 {
        // Suffix form: the last -start bytes.
        (std::cmp::max(0, n + range.start), n - 1)
    } else {
        let end = if range.end < 0 {
            n - 1
        } else {
            std::cmp::min(range.end, n - 1)
        };
        (range.start, end)
    };
    if start >= n || end < start {
        return Err(());
    }
    Ok((u64::try_from(start).unwrap(), u64::try_from(end).unwrap()))
}

/// Sends a complete or partial file response, with headers; handles GET and
/// HEAD, full and range requests.
///
/// # Errors
/// Returns an error before any bytes are written when the file cannot be
/// inspected or the requested range is unsatisfiable.  Transport problems
/// after the first write are reported through [`SendOutcome`], never as an
/// error, because a status line is already on the wire.
pub fn send_file(
    mut writer: impl Write,
    req: &Request,
    entry: Option<&CacheEntry>,
    media_type: &str,
    is_tls: bool,
    file: &mut File,
) -> Result<SendOutcome, HttpError> {
    let size = file.metadata().map_err(HttpError::internal)?.len();
    let (start, end, is_partial) = match req.range {
        Some(range) => {
            let (start, end) = resolve_range(range, size)
                .map_err(|()| HttpError::RangeNotSatisfiable(size))?;
            (start, end, true)
        }
        None => (0, size.saturating_sub(1), false),
    };
    let body_len = if size == 0 { 0 } else { end - start + 1 };
    let is_head = req.method == "HEAD";

    let mut head: Vec<u8> = Vec::with_capacity(256);
    let code = if is_partial { 206 } else { 200 };
    write!(
        head,
        "{} {} {}\r\n",
        req.version.as_str(),
        code,
        reason_phrase(code)
    )
    .unwrap();
    write!(head, "Content-Type: {media_type}\r\n").unwrap();
    write!(
        head,
        "Content-Length: {}\r\n",
        if is_head { 0 } else { body_len }
    )
    .unwrap();
    write!(head, "Accept-Ranges: bytes\r\n").unwrap();
    write!(head, "Date: {}\r\n", SystemTime::now().http_date()).unwrap();
    if let Some(entry) = entry {
        // The entity tag is a cross-protocol collision risk, so it is
        // only offered on plaintext connections.
        if !is_tls {
            write!(head, "ETag: \"{}\"\r\n", entry.file_hash).unwrap();
        }
        if let Some(last_modified) = &entry.last_modified {
            write!(head, "Last-Modified: {last_modified}\r\n").unwrap();
        }
    }
    if is_partial {
        write!(head, "Content-Range: bytes {start}-{end}/{size}\r\n").unwrap();
    }
    write!(
        head,
        "Connection: {}\r\n\r\n",
        if req.keep_alive { "keep-alive" } else { "close" }
    )
    .unwrap();

    if let Err(e) = writer.write_all(&head) {
        return Ok(if is_peer_close(&e) {
            SendOutcome::PeerClosed { body_bytes: 0 }
        } else {
            SendOutcome::Failed {
                error: e.to_string(),
                body_bytes: 0,
            }
        });
    }
    if is_head || body_len == 0 {
        let _ignored = writer.flush();
        return Ok(SendOutcome::Completed { body_bytes: 0 });
    }

    file.seek(SeekFrom::Start(start))
        .map_err(HttpError::internal)?;
    let mut block = vec![0_u8; STREAM_BUF_SIZE];
    let mut remaining = body_len;
    let mut sent: u64 = 0;
    while remaining > 0 {
        let want = std::cmp::min(remaining, STREAM_BUF_SIZE as u64) as usize;
        let got = match file.read(&mut block[..want]) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                return Ok(SendOutcome::Failed {
                    error: e.to_string(),
                    body_bytes: sent,
                })
            }
        };
        if let Err(e) = writer.write_all(&block[..got]) {
            return Ok(if is_peer_close(&e) {
                SendOutcome::PeerClosed { body_bytes: sent }
            } else {
                SendOutcome::Failed {
                    error: e.to_string(),
                    body_bytes: sent,
                }
            });
        }
        sent += got as u64;
        remaining -= got as u64;
    }
    let _ignored = writer.flush();
    Ok(SendOutcome::Completed { body_bytes: sent })
}

/// Sends an error status with the minimal HTML error page.
/// Always closes the connection afterwards.
///
/// # Errors
/// Returns an error when the write fails.
pub fn send_error(
    mut writer: impl Write,
    version: &str,
    code: u16,
) -> Result<(), std::io::Error> {
    let body = error_page(code);
    let mut head: Vec<u8> = Vec::with_capacity(256);
    write!(head, "{} {} {}\r\n", version, code, reason_phrase(code)).unwrap();
    write!(head, "Content-Type: text/html\r\n").unwrap();
    write!(head, "Content-Length: {}\r\n", body.len()).unwrap();
    write!(head, "Date: {}\r\n", SystemTime::now().http_date()).unwrap();
    write!(head, "Connection: close\r\n\r\n").unwrap();
    writer.write_all(&head)?;
    writer.write_all(body.as_bytes())?;
    writer.flush()
}

/// Sends `304 Not Modified` with the entry's validators.
///
/// # Errors
/// Returns an error when the write fails.
pub fn send_not_modified(
    mut writer: impl Write,
    req: &Request,
    entry: &CacheEntry,
    is_tls: bool,
) -> Result<(), std::io::Error> {
    let mut head: Vec<u8> = Vec::with_capacity(256);
    write!(head, "{} 304 Not Modified\r\n", req.version.as_str()).unwrap();
    write!(head, "Date: {}\r\n", SystemTime::now().http_date()).unwrap();
    if !is_tls {
        write!(head, "ETag: \"{}\"\r\n", entry.file_hash).unwrap();
    }
    if let Some(last_modified) = &entry.last_modified {
        write!(head, "Last-Modified: {last_modified}\r\n").unwrap();
    }
    head.extend_from_slice(b"\r\n");
    writer.write_all(&head)?;
    writer.flush()
}

/// Sends `301 Moved Permanently` pointing at `location`.
///
/// # Errors
/// Returns an error when the write fails.
pub fn send_redirect(
    mut writer: impl Write,
    req: &Request,
    location: &str,
) -> Result<(), std::io::Error> {
    let mut head: Vec<u8> = Vec::with_capacity(256);
    write!(head, "{} 301 Moved Permanently\r\n", req.version.as_str()).unwrap();
    write!(head, "Location: {location}\r\n").unwrap();
    write!(head, "Date: {}\r\n", SystemTime::now().http_date()).unwrap();
    write!(head, "Connection: close\r\n\r\n").unwrap();
    writer.write_all(&head)?;
    writer.flush()
}

/// Answers `OPTIONS` with the methods this server implements.
///
/// # Errors
/// Returns an error when the write fails.
pub fn send_options(mut writer: impl Write, req: &Request) -> Result<(), std::io::Error> {
    let mut head: Vec<u8> = Vec::with_capacity(256);
    write!(head, "{} 200 OK\r\n", req.version.as_str()).unwrap();
    write!(head, "Allow: GET, HEAD, OPTIONS\r\n").unwrap();
    write!(head, "Date: {}\r\n", SystemTime::now().http_date()).unwrap();
    write!(head, "Content-Length: 0\r\n\r\n").unwrap();
    writer.write_all(&head)?;
    writer.flush()
}

/// Sends `416 Range Not Satisfiable` with the file's actual size.
///
/// # Errors
/// Returns an error when the write fails.
pub fn send_range_not_satisfiable(
    mut writer: impl Write,
    version: &str,
    size: u64,
) -> Result<(), std::io::Error> {
    let mut head: Vec<u8> = Vec::with_capacity(256);
    write!(head, "{} 416 Range Not Satisfiable\r\n", version).unwrap();
    write!(head, "Content-Range: bytes */{size}\r\n").unwrap();
    write!(head, "Date: {}\r\n", SystemTime::now().http_date()).unwrap();
    write!(head, "Content-Length: 0\r\n\r\n").unwrap();
    writer.write_all(&head)?;
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::{error_page, reason_phrase, resolve_range, send_error, send_options};
    use crate::request::{ByteRange, Request};
    use fixed_buffer::FixedBuf;

    #[test]
    fn reason_phrases() {
        assert_eq!("OK", reason_phrase(200));
        assert_eq!("Partial Content", reason_phrase(206));
        assert_eq!("Not Modified", reason_phrase(304));
        assert_eq!("I'm a teapot", reason_phrase(418));
        assert_eq!("HTTP Version Not Supported", reason_phrase(505));
        assert_eq!("Unknown", reason_phrase(299));
    }

    #[test]
    fn error_page_body() {
        assert_eq!(
            "<html><head><title>404 Not Found</title></head>\
             <body><h1>404 Not Found</h1><hr><p>Snap/0.4</p></body></html>",
            error_page(404)
        );
    }

    #[test]
    fn resolve_range_table() {
        for (expected, start, end, size) in [
            (Ok((0, 99)), 0, 99, 10_000),
            (Ok((9800, 9999)), -200, -1, 10_000),
            (Ok((9990, 9999)), 9990, -1, 10_000),
            // End clamps to the last byte.
            (Ok((0, 99)), 0, 20_000, 100),
            // A suffix longer than the file yields the whole file.
            (Ok((0, 99)), -200, -1, 100),
            (Ok((5, 5)), 5, 5, 100),
            (Err(()), 20_000, -1, 10_000),
            (Err(()), 100, -1, 100),
            (Err(()), 5, 3, 100),
            (Err(()), 0, -1, 0),
            (Err(()), -1, -1, 0),
        ] {
            assert_eq!(
                expected,
                resolve_range(ByteRange { start, end }, size),
                "start={start} end={end} size={size}",
            );
        }
    }

    fn parse(head: &str) -> Request {
        let mut buf: FixedBuf<8192> = FixedBuf::new();
        buf.write_bytes(head.as_bytes()).unwrap();
        Request::try_read(&mut buf).unwrap()
    }

    #[test]
    fn error_response_bytes() {
        let mut out: Vec<u8> = Vec::new();
        send_error(&mut out, "HTTP/1.1", 404).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"), "{text}");
        assert!(text.contains("Content-Type: text/html\r\n"), "{text}");
        assert!(text.contains("Connection: close\r\n"), "{text}");
        assert!(text.ends_with("<p>Snap/0.4</p></body></html>"), "{text}");
    }

    #[test]
    fn options_response_bytes() {
        let req = parse("OPTIONS / HTTP/1.1\r\nHost: x\r\n\r\n");
        let mut out: Vec<u8> = Vec::new();
        send_options(&mut out, &req).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"), "{text}");
        assert!(text.contains("Allow: GET, HEAD, OPTIONS\r\n"), "{text}");
        assert!(text.contains("Content-Length: 0\r\n"), "{text}");
    }
}
