//! Error taxonomy for the request path.
//!
//! Every handler stage returns a compact [`HttpError`] kind; the handler
//! maps it to a numeric status at a single emission point.
use std::io::ErrorKind;

#[derive(Clone, Debug, Eq, Hash, Ord, PartialOrd, PartialEq)]
pub enum HttpError {
    /// The peer closed the connection before sending a request.
    /// No response is owed.
    Disconnected,
    /// The connection closed mid-head.
    Truncated,
    MalformedRequestLine,
    /// The head did not fit in the request buffer.
    RequestTooLong,
    UnsupportedProtocol,
    MissingHost,
    ForbiddenPath,
    UnsupportedMethod,
    NotFound,
    PermissionDenied,
    /// Carries the file size for the `Content-Range: bytes */N` header.
    RangeNotSatisfiable(u64),
    Internal(ErrorKind, String),
}
impl HttpError {
    #[must_use]
    #[allow(clippy::needless_pass_by_value)]
    pub fn internal(e: std::io::Error) -> Self {
        HttpError::Internal(e.kind(), e.to_string())
    }

    /// Maps an error from opening the requested file.
    #[must_use]
    #[allow(clippy::needless_pass_by_value)]
    pub fn from_open_error(e: std::io::Error) -> Self {
        match e.kind() {
            ErrorKind::NotFound => HttpError::NotFound,
            ErrorKind::PermissionDenied => HttpError::PermissionDenied,
            _ => HttpError::internal(e),
        }
    }

    /// The status code emitted for this error.  [`HttpError::Disconnected`]
    /// has no status; callers must not emit a response for it.
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            HttpError::Disconnected => 0,
            HttpError::Truncated
            | HttpError::MalformedRequestLine
            | HttpError::RequestTooLong
            | HttpError::MissingHost => 400,
            HttpError::UnsupportedProtocol => 505,
            HttpError::ForbiddenPath | HttpError::PermissionDenied => 403,
            HttpError::UnsupportedMethod => 501,
            HttpError::NotFound => 404,
            HttpError::RangeNotSatisfiable(..) => 416,
            HttpError::Internal(..) => 500,
        }
    }

    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(self, HttpError::Internal(..))
    }

    #[must_use]
    pub fn description(&self) -> String {
        match self {
            HttpError::Disconnected => "HttpError::Disconnected".to_string(),
            HttpError::Truncated => "HttpError::Truncated".to_string(),
            HttpError::MalformedRequestLine => "HttpError::MalformedRequestLine".to_string(),
            HttpError::RequestTooLong => "HttpError::RequestTooLong".to_string(),
            HttpError::UnsupportedProtocol => "HttpError::UnsupportedProtocol".to_string(),
            HttpError::MissingHost => "HttpError::MissingHost".to_string(),
            HttpError::ForbiddenPath => "HttpError::ForbiddenPath".to_string(),
            HttpError::UnsupportedMethod => "HttpError::UnsupportedMethod".to_string(),
            HttpError::NotFound => "HttpError::NotFound".to_string(),
            HttpError::PermissionDenied => "HttpError::PermissionDenied".to_string(),
            HttpError::RangeNotSatisfiable(size) => {
                format!("HttpError::RangeNotSatisfiable: file size {size}")
            }
            HttpError::Internal(kind, s) => format!("HttpError::Internal: {kind:?}: {s}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::HttpError;
    use std::io::ErrorKind;

    #[test]
    fn statuses() {
        assert_eq!(400, HttpError::MalformedRequestLine.status());
        assert_eq!(400, HttpError::RequestTooLong.status());
        assert_eq!(400, HttpError::MissingHost.status());
        assert_eq!(505, HttpError::UnsupportedProtocol.status());
        assert_eq!(403, HttpError::ForbiddenPath.status());
        assert_eq!(501, HttpError::UnsupportedMethod.status());
        assert_eq!(404, HttpError::NotFound.status());
        assert_eq!(416, HttpError::RangeNotSatisfiable(10_000).status());
        assert_eq!(
            500,
            HttpError::Internal(ErrorKind::Other, "x".to_string()).status()
        );
    }

    #[test]
    fn open_error_mapping() {
        assert_eq!(
            HttpError::NotFound,
            HttpError::from_open_error(ErrorKind::NotFound.into())
        );
        assert_eq!(
            HttpError::PermissionDenied,
            HttpError::from_open_error(ErrorKind::PermissionDenied.into())
        );
        assert!(HttpError::from_open_error(ErrorKind::Other.into()).is_server_error());
    }
}
