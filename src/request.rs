//! Request record and parser.
use crate::http_error::HttpError;
use fixed_buffer::FixedBuf;
use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};
use safe_regex::{regex, Matcher2, Matcher3};
use std::cell::RefCell;
use std::fmt::Debug;
use std::io::Read;

/// One request head must fit in this many bytes.
pub const REQUEST_BUF_SIZE: usize = 8192;

thread_local! {
    static SMALL_RNG: RefCell<SmallRng> = RefCell::new(SmallRng::from_entropy());
}

/// An insecure random id, for correlating log lines about one request.
#[must_use]
pub fn next_request_id() -> u64 {
    SMALL_RNG.with(|cell| cell.borrow_mut().next_u64())
}

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialOrd, PartialEq)]
pub enum Version {
    Http10,
    Http11,
}
impl Version {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Version::Http10 => "HTTP/1.0",
            Version::Http11 => "HTTP/1.1",
        }
    }
}

/// A byte range as parsed from the `Range` header, before clamping to a
/// file size.  A negative `start` denotes a suffix length; `end == -1`
/// denotes an open-ended range.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialOrd, PartialEq)]
pub struct ByteRange {
    pub start: i64,
    pub end: i64,
}

/// Parsed view of one request.  All fields are owned; nothing borrows the
/// raw read buffer.
#[derive(Clone, Eq, PartialEq)]
pub struct Request {
    pub id: u64,
    pub method: String,
    pub target: String,
    pub version: Version,
    pub host: Option<String>,
    pub keep_alive: bool,
    /// Unquoted numeric `If-None-Match` validator; zero means none supplied.
    pub if_none_match: u32,
    pub if_modified_since: Option<String>,
    pub range: Option<ByteRange>,
    pub upgrade_insecure: bool,
    pub dnt: bool,
    pub gpc: bool,
    // Informational headers, preserved for logging.
    pub user_agent: Option<String>,
    pub referer: Option<String>,
    pub accept: Option<String>,
    pub accept_encoding: Option<String>,
    pub accept_language: Option<String>,
    pub priority: Option<String>,
}
impl Request {
    fn new(method: String, target: String, version: Version) -> Self {
        Self {
            id: next_request_id(),
            method,
            target,
            // Keep-alive defaults by protocol version; the Connection
            // header overrides.
            keep_alive: version == Version::Http11,
            version,
            host: None,
            if_none_match: 0,
            if_modified_since: None,
            range: None,
            upgrade_insecure: false,
            dnt: false,
            gpc: false,
            user_agent: None,
            referer: None,
            accept: None,
            accept_encoding: None,
            accept_language: None,
            priority: None,
        }
    }

    /// Tries to parse one request head from `buf`, consuming it on success.
    ///
    /// # Errors
    /// Returns [`HttpError::Truncated`] when the buffer does not yet hold a
    /// full head ending in `"\r\n\r\n"`, and a parse error otherwise.
    pub fn try_read<const BUF_SIZE: usize>(
        buf: &mut FixedBuf<BUF_SIZE>,
    ) -> Result<Self, HttpError> {
        let head_len = buf
            .readable()
            .windows(4)
            .position(|window| window == b"\r\n\r\n")
            .ok_or(HttpError::Truncated)?;
        let head_with_delim = buf.try_read_exact(head_len + 4).unwrap();
        let head = &head_with_delim[..head_len];
        let mut lines = head.split(|b| *b == b'\n').map(trim_trailing_cr);
        let request_line = lines.next().ok_or(HttpError::MalformedRequestLine)?;
        let (method, target, version) = parse_request_line(request_line)?;
        if !target_is_safe(&target) {
            return Err(HttpError::ForbiddenPath);
        }
        let mut req = Self::new(method, target, version);
        for line in lines {
            // Unknown and malformed header lines are ignored.
            parse_header_line(&mut req, line);
        }
        if req.version == Version::Http11 && req.host.is_none() {
            return Err(HttpError::MissingHost);
        }
        Ok(req)
    }
}
impl Debug for Request {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> Result<(), core::fmt::Error> {
        write!(
            f,
            "Request{{{} {} {}, host={:?}, keep_alive={}, etag={}, range={:?}}}",
            self.method,
            self.target,
            self.version.as_str(),
            self.host,
            self.keep_alive,
            self.if_none_match,
            self.range,
        )
    }
}

/// Reads one request head from `reader` into `buf` and parses it.
///
/// # Errors
/// Returns an error when:
/// - the connection closes before any bytes arrive ([`HttpError::Disconnected`])
/// - the connection closes mid-head
/// - the head does not fit in `buf`
/// - the head fails to parse
pub fn read_request<const BUF_SIZE: usize>(
    buf: &mut FixedBuf<BUF_SIZE>,
    mut reader: impl Read,
) -> Result<Request, HttpError> {
    loop {
        match Request::try_read(buf) {
            Ok(req) => return Ok(req),
            Err(HttpError::Truncated) => {}
            Err(e) => return Err(e),
        }
        if buf.writable().is_empty() {
            return Err(HttpError::RequestTooLong);
        }
        match reader.read(buf.writable()) {
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(..) | Ok(0) if buf.is_empty() => return Err(HttpError::Disconnected),
            Err(..) | Ok(0) => return Err(HttpError::Truncated),
            Ok(n) => buf.wrote(n),
        }
    }
}

/// The target must not reach outside the webroot: no `..`, no `//`,
/// no embedded NUL.
#[must_use]
pub fn target_is_safe(target: &str) -> bool {
    !target.contains("..") && !target.contains("//") && !target.contains('\0')
}

fn trim_trailing_cr(bytes: &[u8]) -> &[u8] {
    if let Some((&b'\r', rest)) = bytes.split_last() {
        rest
    } else {
        bytes
    }
}

fn trim_ascii_whitespace(mut bytes: &[u8]) -> &[u8] {
    while let Some((&byte, rest)) = bytes.split_first() {
        if byte == b' ' || byte == b'\t' {
            bytes = rest;
        } else {
            break;
        }
    }
    while let Some((&byte, rest)) = bytes.split_last() {
        if byte == b' ' || byte == b'\t' {
            bytes = rest;
        } else {
            break;
        }
    }
    bytes
}

fn latin1_bytes_to_utf8(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

fn parse_request_line(line: &[u8]) -> Result<(String, String, Version), HttpError> {
    // request-line = method SP request-target SP HTTP-version
    // Missing any token is malformed.
    #[allow(clippy::assign_op_pattern)]
    #[allow(clippy::range_plus_one)]
    let matcher: Matcher3<_> = regex!(br"([-!#$%&'*+.^_`|~0-9A-Za-z]+) ([^ \t\r\n]+) ([^ \t\r\n]+)");
    let (method_bytes, target_bytes, version_bytes) = matcher
        .match_slices(line)
        .ok_or(HttpError::MalformedRequestLine)?;
    let method = std::str::from_utf8(method_bytes).unwrap().to_string();
    let target = latin1_bytes_to_utf8(target_bytes);
    let version = match version_bytes {
        b"HTTP/1.0" => Version::Http10,
        b"HTTP/1.1" => Version::Http11,
        _ => return Err(HttpError::UnsupportedProtocol),
    };
    Ok((method, target, version))
}

fn parse_header_line(req: &mut Request, line: &[u8]) {
    #[allow(clippy::assign_op_pattern)]
    #[allow(clippy::range_plus_one)]
    let matcher: Matcher2<_> = regex!(br"([-!#$%&'*+.^_`|~0-9A-Za-z]+):[ \t]*(.*)");
    let Some((name_bytes, value_bytes)) = matcher.match_slices(line) else {
        return;
    };
    let name = std::str::from_utf8(name_bytes).unwrap();
    let value = latin1_bytes_to_utf8(trim_ascii_whitespace(value_bytes));
    if name.eq_ignore_ascii_case("Host") {
        req.host = Some(value);
    } else if name.eq_ignore_ascii_case("Connection") {
        req.keep_alive = value.to_ascii_lowercase().starts_with("keep-alive");
    } else if name.eq_ignore_ascii_case("If-None-Match") {
        req.if_none_match = parse_etag_value(&value);
    } else if name.eq_ignore_ascii_case("If-Modified-Since") {
        req.if_modified_since = Some(value);
    } else if name.eq_ignore_ascii_case("Range") {
        req.range = parse_range_value(&value);
    } else if name.eq_ignore_ascii_case("Upgrade-Insecure-Requests") {
        req.upgrade_insecure = value.starts_with('1');
    } else if name.eq_ignore_ascii_case("DNT") {
        req.dnt = value.starts_with('1');
    } else if name.eq_ignore_ascii_case("Sec-GPC") {
        req.gpc = value.starts_with('1');
    } else if name.eq_ignore_ascii_case("User-Agent") {
        req.user_agent = Some(value);
    } else if name.eq_ignore_ascii_case("Referer") {
        req.referer = Some(value);
    } else if name.eq_ignore_ascii_case("Accept") {
        req.accept = Some(value);
    } else if name.eq_ignore_ascii_case("Accept-Encoding") {
        req.accept_encoding = Some(value);
    } else if name.eq_ignore_ascii_case("Accept-Language") {
        req.accept_language = Some(value);
    } else if name.eq_ignore_ascii_case("Priority") {
        req.priority = Some(value);
    }
}

/// Unquotes and parses a numeric entity tag the way `strtoul` would:
/// leading decimal digits count, anything else yields zero.
fn parse_etag_value(value: &str) -> u32 {
    let unquoted = value.strip_prefix('"').unwrap_or(value);
    let digits: String = unquoted.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().unwrap_or(0)
}

/// Recognizes `bytes=start-end`, `bytes=start-`, and `bytes=-suffix`.
/// Any other form is not a range request.
fn parse_range_value(value: &str) -> Option<ByteRange> {
    #[allow(clippy::assign_op_pattern)]
    #[allow(clippy::range_plus_one)]
    let matcher: Matcher2<_> = regex!(br"bytes=([0-9]*)-[ \t]*([0-9]*)");
    let (start_bytes, end_bytes) = matcher.match_slices(value.as_bytes())?;
    match (start_bytes.is_empty(), end_bytes.is_empty()) {
        // "bytes=-" carries no offsets.
        (true, true) => None,
        // Suffix form: the last N bytes.
        (true, false) => {
            let suffix: i64 = std::str::from_utf8(end_bytes).unwrap().parse().ok()?;
            Some(ByteRange {
                start: -suffix,
                end: -1,
            })
        }
        (false, true) => {
            let start = std::str::from_utf8(start_bytes).unwrap().parse().ok()?;
            Some(ByteRange { start, end: -1 })
        }
        (false, false) => {
            let start = std::str::from_utf8(start_bytes).unwrap().parse().ok()?;
            let end = std::str::from_utf8(end_bytes).unwrap().parse().ok()?;
            Some(ByteRange { start, end })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ByteRange, Request, Version};
    use crate::http_error::HttpError;
    use fixed_buffer::FixedBuf;

    fn parse(head: &str) -> Result<Request, HttpError> {
        let mut buf: FixedBuf<8192> = FixedBuf::new();
        buf.write_bytes(head.as_bytes()).unwrap();
        Request::try_read(&mut buf)
    }

    #[test]
    fn request_line() {
        let req = parse("GET /a.html HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();
        assert_eq!("GET", req.method);
        assert_eq!("/a.html", req.target);
        assert_eq!(Version::Http11, req.version);
        assert_eq!(Some("x".to_string()), req.host);
    }

    #[test]
    fn request_line_errors() {
        assert_eq!(Err(HttpError::Truncated), parse("GET / HTTP/1.1\r\n"));
        assert_eq!(Err(HttpError::MalformedRequestLine), parse("\r\n\r\n"));
        assert_eq!(Err(HttpError::MalformedRequestLine), parse("GET /\r\n\r\n"));
        assert_eq!(
            Err(HttpError::MalformedRequestLine),
            parse("GET / x HTTP/1.1\r\n\r\n")
        );
        assert_eq!(
            Err(HttpError::UnsupportedProtocol),
            parse("GET / HTTP/0.9\r\n\r\n")
        );
        assert_eq!(
            Err(HttpError::UnsupportedProtocol),
            parse("GET / HTTP/2\r\n\r\n")
        );
        assert_eq!(Err(HttpError::MissingHost), parse("GET / HTTP/1.1\r\n\r\n"));
    }

    #[test]
    fn http10_does_not_require_host() {
        let req = parse("GET / HTTP/1.0\r\n\r\n").unwrap();
        assert_eq!(None, req.host);
        assert!(!req.keep_alive);
    }

    #[test]
    fn keep_alive() {
        assert!(parse("GET / HTTP/1.1\r\nHost: x\r\n\r\n").unwrap().keep_alive);
        assert!(
            !parse("GET / HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n")
                .unwrap()
                .keep_alive
        );
        assert!(
            parse("GET / HTTP/1.0\r\nConnection: Keep-Alive\r\n\r\n")
                .unwrap()
                .keep_alive
        );
    }

    #[test]
    fn forbidden_paths() {
        for head in [
            "GET /../etc/passwd HTTP/1.1\r\nHost: x\r\n\r\n",
            "GET /a//b HTTP/1.1\r\nHost: x\r\n\r\n",
            "GET /a..b HTTP/1.1\r\nHost: x\r\n\r\n",
        ] {
            assert_eq!(Err(HttpError::ForbiddenPath), parse(head), "{head:?}");
        }
    }

    #[test]
    fn etag_values() {
        for (expected, value) in [
            (12345, "\"12345\""),
            (12345, "12345"),
            (123, "\"123abc\""),
            (0, "\"abc\""),
            (0, "\"\""),
        ] {
            let req = parse(&format!(
                "GET / HTTP/1.1\r\nHost: x\r\nIf-None-Match: {value}\r\n\r\n"
            ))
            .unwrap();
            assert_eq!(expected, req.if_none_match, "{value:?}");
        }
    }

    #[test]
    fn range_forms() {
        for (expected, value) in [
            (Some(ByteRange { start: 0, end: 99 }), "bytes=0-99"),
            (Some(ByteRange { start: 1000, end: -1 }), "bytes=1000-"),
            (Some(ByteRange { start: -200, end: -1 }), "bytes=-200"),
            (Some(ByteRange { start: 5, end: 9 }), "bytes=5- 9"),
            (None, "bytes=-"),
            (None, "bytes=a-b"),
            (None, "lines=0-99"),
        ] {
            let req = parse(&format!(
                "GET /big.bin HTTP/1.1\r\nHost: x\r\nRange: {value}\r\n\r\n"
            ))
            .unwrap();
            assert_eq!(expected, req.range, "{value:?}");
        }
    }

    #[test]
    fn informational_headers() {
        let req = parse(
            "GET / HTTP/1.1\r\nHost: x\r\nUser-Agent: curl/8\r\nDNT: 1\r\nSec-GPC: 1\r\n\
             Upgrade-Insecure-Requests: 1\r\nAccept-Language: en\r\n\r\n",
        )
        .unwrap();
        assert_eq!(Some("curl/8".to_string()), req.user_agent);
        assert!(req.dnt);
        assert!(req.gpc);
        assert!(req.upgrade_insecure);
        assert_eq!(Some("en".to_string()), req.accept_language);
    }

    #[test]
    fn parse_survives_reserialization() {
        let head = "GET /big.bin HTTP/1.1\r\nHost: h\r\nConnection: keep-alive\r\n\
                    If-None-Match: \"77\"\r\nIf-Modified-Since: Thu, 01 Jan 1970 00:00:00 GMT\r\n\
                    Range: bytes=0-9\r\nUser-Agent: t\r\n\r\n";
        let first = parse(head).unwrap();
        let range = first.range.unwrap();
        let rebuilt = format!(
            "{} {} {}\r\nHost: {}\r\nConnection: {}\r\nIf-None-Match: \"{}\"\r\n\
             If-Modified-Since: {}\r\nRange: bytes={}-{}\r\nUser-Agent: {}\r\n\r\n",
            first.method,
            first.target,
            first.version.as_str(),
            first.host.clone().unwrap(),
            if first.keep_alive { "keep-alive" } else { "close" },
            first.if_none_match,
            first.if_modified_since.clone().unwrap(),
            range.start,
            range.end,
            first.user_agent.clone().unwrap(),
        );
        let mut second = parse(&rebuilt).unwrap();
        second.id = first.id;
        assert_eq!(first, second);
    }

    #[test]
    fn unknown_and_malformed_headers_are_ignored() {
        let req = parse("GET / HTTP/1.1\r\nHost: x\r\nX-Junk: y\r\nnot a header\r\n\r\n").unwrap();
        assert_eq!("/", req.target);
    }
}
