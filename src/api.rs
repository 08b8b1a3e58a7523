//! JSON status endpoints.
//!
//! A small read-only API mounted under `/api/`, answered before path
//! resolution so the webroot never shadows it.
use crate::request::Request;
use crate::response::{reason_phrase, SERVER_NAME};
use crate::time::FormatTime;
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::io::Write;
use std::time::SystemTime;

static START_TIME: OnceCell<SystemTime> = OnceCell::new();

/// Records the process start time; uptime is reported relative to it.
/// Later calls are ignored.
pub fn record_start_time() {
    let _ignored = START_TIME.set(SystemTime::now());
}

fn uptime_seconds() -> u64 {
    START_TIME
        .get()
        .and_then(|start| SystemTime::now().duration_since(*start).ok())
        .map_or(0, |elapsed| elapsed.as_secs())
}

#[derive(Serialize)]
struct Status {
    server: &'static str,
    status: &'static str,
    uptime: u64,
}

#[derive(Serialize)]
struct Time {
    status: &'static str,
    date: String,
}

#[derive(Serialize)]
struct ApiError {
    error: &'static str,
}

#[must_use]
pub fn is_api_target(target: &str) -> bool {
    target.starts_with("/api/")
}

/// Answers one API request.  Unknown endpoints get a JSON 404.
///
/// # Errors
/// Returns an error when the write fails.
pub fn handle(writer: impl Write, req: &Request) -> Result<(), std::io::Error> {
    match req.target.as_str() {
        "/api/status" => {
            let body = serde_json::to_string(&Status {
                server: SERVER_NAME,
                status: "online",
                uptime: uptime_seconds(),
            })
            .unwrap();
            send_json(writer, req, 200, &body)
        }
        "/api/time" => {
            let body = serde_json::to_string(&Time {
                status: "online",
                date: SystemTime::now().http_date(),
            })
            .unwrap();
            send_json(writer, req, 200, &body)
        }
        _ => {
            let body = serde_json::to_string(&ApiError {
                error: "unknown API endpoint",
            })
            .unwrap();
            send_json(writer, req, 404, &body)
        }
    }
}

fn send_json(
    mut writer: impl Write,
    req: &Request,
    code: u16,
    body: &str,
) -> Result<(), std::io::Error> {
    let mut head: Vec<u8> = Vec::with_capacity(256);
    write!(
        head,
        "{} {} {}\r\n",
        req.version.as_str(),
        code,
        reason_phrase(code)
    )
    .unwrap();
    write!(head, "Content-Type: application/json\r\n").unwrap();
    write!(head, "Content-Length: {}\r\n", body.len()).unwrap();
    write!(head, "Date: {}\r\n", SystemTime::now().http_date()).unwrap();
    write!(head, "Connection: close\r\n\r\n").unwrap();
    writer.write_all(&head)?;
    writer.write_all(body.as_bytes())?;
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::{handle, is_api_target};
    use crate::request::Request;
    use fixed_buffer::FixedBuf;

    fn parse(head: &str) -> Request {
        let mut buf: FixedBuf<8192> = FixedBuf::new();
        buf.write_bytes(head.as_bytes()).unwrap();
        Request::try_read(&mut buf).unwrap()
    }

    #[test]
    fn target_matching() {
        assert!(is_api_target("/api/status"));
        assert!(is_api_target("/api/anything"));
        assert!(!is_api_target("/apiary.html"));
        assert!(!is_api_target("/"));
    }

    #[test]
    fn status_endpoint() {
        let req = parse("GET /api/status HTTP/1.1\r\nHost: x\r\n\r\n");
        let mut out: Vec<u8> = Vec::new();
        handle(&mut out, &req).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"), "{text}");
        assert!(text.contains("Content-Type: application/json\r\n"), "{text}");
        assert!(text.contains("\"server\":\"Snap/0.4\""), "{text}");
        assert!(text.contains("\"status\":\"online\""), "{text}");
    }

    #[test]
    fn unknown_endpoint() {
        let req = parse("GET /api/nope HTTP/1.1\r\nHost: x\r\n\r\n");
        let mut out: Vec<u8> = Vec::new();
        handle(&mut out, &req).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"), "{text}");
        assert!(text.contains("\"error\":\"unknown API endpoint\""), "{text}");
    }
}
