//! Structured textual logging.
//!
//! Log events carry a message and a list of name-value tags.  A dedicated
//! logger thread receives events over a channel and writes one line per
//! event, so request workers never block on disk I/O.  The logging
//! functions write to stdout until [`set_global_logger`] is called.
use crate::time::FormatTime;
use once_cell::sync::OnceCell;
use std::fmt::{Debug, Display, Formatter};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Mutex;
use std::time::SystemTime;

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Level {
    Error,
    Warn,
    Info,
    Debug,
}
impl Display for Level {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            Level::Error => write!(f, "error"),
            Level::Warn => write!(f, "warn"),
            Level::Info => write!(f, "info"),
            Level::Debug => write!(f, "debug"),
        }
    }
}

#[derive(Clone, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum TagValue {
    Str(String),
    U64(u64),
    I64(i64),
}
impl Display for TagValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            TagValue::Str(s) => write!(f, "{s:?}"),
            TagValue::U64(n) => write!(f, "{n}"),
            TagValue::I64(n) => write!(f, "{n}"),
        }
    }
}
impl Debug for TagValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(f, "{self}")
    }
}
impl From<&str> for TagValue {
    fn from(v: &str) -> Self {
        TagValue::Str(v.to_string())
    }
}
impl From<String> for TagValue {
    fn from(v: String) -> Self {
        TagValue::Str(v)
    }
}
impl From<u16> for TagValue {
    fn from(v: u16) -> Self {
        TagValue::U64(u64::from(v))
    }
}
impl From<u32> for TagValue {
    fn from(v: u32) -> Self {
        TagValue::U64(u64::from(v))
    }
}
impl From<u64> for TagValue {
    fn from(v: u64) -> Self {
        TagValue::U64(v)
    }
}
impl From<usize> for TagValue {
    fn from(v: usize) -> Self {
        TagValue::U64(v as u64)
    }
}
impl From<i64> for TagValue {
    fn from(v: i64) -> Self {
        TagValue::I64(v)
    }
}
impl From<std::net::SocketAddr> for TagValue {
    fn from(v: std::net::SocketAddr) -> Self {
        TagValue::Str(v.to_string())
    }
}

#[derive(Clone, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Tag {
    pub name: &'static str,
    pub value: TagValue,
}
impl Tag {
    #[must_use]
    pub fn new(name: &'static str, value: impl Into<TagValue>) -> Self {
        Self {
            name,
            value: value.into(),
        }
    }
}
impl Display for Tag {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(f, "{}={}", self.name, self.value)
    }
}
impl Debug for Tag {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(f, "Tag{{{self}}}")
    }
}

#[must_use]
pub fn tag(name: &'static str, value: impl Into<TagValue>) -> Tag {
    Tag::new(name, value)
}

#[derive(Clone, Eq, PartialEq)]
pub struct LogEvent {
    pub time: SystemTime,
    pub level: Level,
    pub msg: String,
    pub tags: Vec<Tag>,
}
impl LogEvent {
    #[must_use]
    pub fn new(level: Level, msg: String, tags: Vec<Tag>) -> Self {
        Self {
            time: SystemTime::now(),
            level,
            msg,
            tags,
        }
    }

    /// Formats the event as a single log line, without a trailing newline.
    #[must_use]
    pub fn line(&self) -> String {
        let mut line = format!("{} {} {}", self.time.iso8601_utc(), self.level, self.msg);
        for tag in &self.tags {
            line.push(' ');
            line.push_str(&tag.to_string());
        }
        line
    }
}

/// Starts a thread that writes log lines to stdout.
#[must_use]
pub fn start_stdout_logger_thread() -> SyncSender<LogEvent> {
    let (sender, receiver): (SyncSender<LogEvent>, Receiver<LogEvent>) = sync_channel(100);
    std::thread::spawn(move || {
        for event in receiver {
            println!("{}", event.line());
        }
    });
    sender
}

/// Starts a thread that appends log lines to the file at `path`,
/// creating it when missing.
///
/// # Errors
/// Returns an error when it fails to open the file.
pub fn start_file_logger_thread(path: &Path) -> Result<SyncSender<LogEvent>, std::io::Error> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let (sender, receiver): (SyncSender<LogEvent>, Receiver<LogEvent>) = sync_channel(100);
    std::thread::spawn(move || {
        for event in receiver {
            if writeln!(file, "{}", event.line()).is_err() {
                return;
            }
            let _ignored = file.flush();
        }
    });
    Ok(sender)
}

static GLOBAL_LOGGER: OnceCell<Mutex<SyncSender<LogEvent>>> = OnceCell::new();

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct GlobalLoggerAlreadySetError {}

/// Sets the global logger.  A process can call this once.
///
/// # Errors
/// Returns `Err` when the function has previously been called.
#[allow(clippy::module_name_repetitions)]
pub fn set_global_logger(sender: SyncSender<LogEvent>) -> Result<(), GlobalLoggerAlreadySetError> {
    GLOBAL_LOGGER
        .set(Mutex::new(sender))
        .map_err(|_| GlobalLoggerAlreadySetError {})
}

fn send(event: LogEvent) {
    let sender = GLOBAL_LOGGER
        .get_or_init(|| Mutex::new(start_stdout_logger_thread()))
        .lock()
        .unwrap()
        .clone();
    // A stopped logger thread drops events.
    let _ignored = sender.send(event);
}

/// Makes a new log event with `error` level and sends it to the global logger.
pub fn error(msg: impl Into<String>, tags: Vec<Tag>) {
    send(LogEvent::new(Level::Error, msg.into(), tags));
}

/// Makes a new log event with `warn` level and sends it to the global logger.
pub fn warn(msg: impl Into<String>, tags: Vec<Tag>) {
    send(LogEvent::new(Level::Warn, msg.into(), tags));
}

/// Makes a new log event with `info` level and sends it to the global logger.
pub fn info(msg: impl Into<String>, tags: Vec<Tag>) {
    send(LogEvent::new(Level::Info, msg.into(), tags));
}

/// Makes a new log event with `debug` level and sends it to the global logger.
pub fn debug(msg: impl Into<String>, tags: Vec<Tag>) {
    send(LogEvent::new(Level::Debug, msg.into(), tags));
}

#[cfg(test)]
mod tests {
    use super::{tag, Level, LogEvent};
    use std::time::{Duration, SystemTime};

    #[test]
    fn event_line() {
        let mut event = LogEvent::new(
            Level::Info,
            "request".to_string(),
            vec![tag("code", 200_u16), tag("path", "/landing.html")],
        );
        event.time = SystemTime::UNIX_EPOCH + Duration::from_secs(1648625373);
        assert_eq!(
            "2022-03-30T07:29:33Z info request code=200 path=\"/landing.html\"",
            event.line()
        );
    }

    #[test]
    fn event_line_without_tags() {
        let mut event = LogEvent::new(Level::Error, "select failed".to_string(), Vec::new());
        event.time = SystemTime::UNIX_EPOCH;
        assert_eq!("1970-01-01T00:00:00Z error select failed", event.line());
    }
}
