//! Server configuration.
//!
//! The configuration is parsed once from the argument vector at startup and
//! is immutable afterwards.  Workers read it concurrently through an `Arc`
//! without locking.
use std::fmt::Write;

pub const DEFAULT_WEBROOT: &str = "/srv/snap";
pub const DEFAULT_HTTP_PORT: u16 = 80;
pub const DEFAULT_HTTPS_PORT: u16 = 443;
pub const DEFAULT_WORKERS: usize = 20;
pub const DEFAULT_MAX_QUEUE: usize = 100;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServerConfig {
    pub webroot: String,
    pub http_port: u16,
    pub https_port: u16,
    pub cert_path: String,
    pub key_path: String,
    pub workers: usize,
    pub max_queue: usize,
}
impl ServerConfig {
    #[must_use]
    pub fn new(webroot: impl Into<String>) -> Self {
        let webroot = webroot.into();
        let cert_path = format!("{webroot}/keys/cert.pem");
        let key_path = format!("{webroot}/keys/key.pem");
        Self {
            webroot,
            http_port: DEFAULT_HTTP_PORT,
            https_port: DEFAULT_HTTPS_PORT,
            cert_path,
            key_path,
            workers: DEFAULT_WORKERS,
            max_queue: DEFAULT_MAX_QUEUE,
        }
    }

    /// Parses the command-line flags `-w <webroot>`, `-p <http-port>`,
    /// `-s <https-port>`, and `-t <workers>`.  `args` must not include the
    /// program name.  The certificate and key paths follow the webroot.
    ///
    /// # Errors
    /// Returns a usage message when a flag is unknown, a value is missing,
    /// or a value fails to parse.
    pub fn from_args(args: impl IntoIterator<Item = String>) -> Result<Self, String> {
        let mut webroot = DEFAULT_WEBROOT.to_string();
        let mut http_port = DEFAULT_HTTP_PORT;
        let mut https_port = DEFAULT_HTTPS_PORT;
        let mut workers = DEFAULT_WORKERS;
        let mut iter = args.into_iter();
        while let Some(flag) = iter.next() {
            let value = iter
                .next()
                .ok_or_else(|| format!("missing value for {flag}\n{}", usage()))?;
            match flag.as_str() {
                "-w" => webroot = value,
                "-p" => {
                    http_port = value
                        .parse()
                        .map_err(|_| format!("bad http port {value:?}\n{}", usage()))?;
                }
                "-s" => {
                    https_port = value
                        .parse()
                        .map_err(|_| format!("bad https port {value:?}\n{}", usage()))?;
                }
                "-t" => {
                    workers = value
                        .parse()
                        .map_err(|_| format!("bad worker count {value:?}\n{}", usage()))?;
                    if workers == 0 {
                        return Err(format!("bad worker count {value:?}\n{}", usage()));
                    }
                }
                _ => return Err(format!("unknown flag {flag:?}\n{}", usage())),
            }
        }
        let mut config = Self::new(webroot);
        config.http_port = http_port;
        config.https_port = https_port;
        config.workers = workers;
        Ok(config)
    }

    /// One line per setting, for the startup banner.
    #[must_use]
    pub fn describe(&self) -> String {
        let mut s = String::new();
        let _ = writeln!(s, "  Webroot: {}", self.webroot);
        let _ = writeln!(s, "  HTTP port: {}", self.http_port);
        let _ = writeln!(s, "  HTTPS port: {}", self.https_port);
        let _ = write!(s, "  Worker pool: {}", self.workers);
        s
    }
}

#[must_use]
pub fn usage() -> String {
    "Usage: snap [-w webroot] [-p http_port] [-s https_port] [-t workers]".to_string()
}
