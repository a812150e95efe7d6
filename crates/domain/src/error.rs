/// Shared error type used across all Infrafox crates.
///
/// The variants mirror the platform's wire-level error kinds: `kind()`
/// yields the stable machine-readable name and `status_code()` the HTTP
/// status a handler should answer with.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("auth: {0}")]
    Auth(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("quota: {0}")]
    Quota(String),

    #[error("upstream: {0}")]
    Upstream(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Stable machine-readable error kind, used in response bodies and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Auth(_) => "auth",
            Error::Forbidden(_) => "forbidden",
            Error::NotFound(_) => "not_found",
            Error::Conflict(_) => "conflict",
            Error::Quota(_) => "quota",
            Error::Upstream(_) | Error::Http(_) => "upstream",
            Error::Timeout(_) => "timeout",
            Error::Provider { .. } => "provider",
            Error::Config(_) => "config",
            Error::Io(_) | Error::Json(_) | Error::Internal(_) => "internal",
        }
    }

    /// The HTTP status code a handler should map this error to.
    ///
    /// Internal variants never leak their message to callers; handlers
    /// answer with the generic `internal_error` body instead.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Config(_) => 400,
            Error::Auth(_) => 401,
            Error::Forbidden(_) | Error::Quota(_) => 403,
            Error::NotFound(_) => 404,
            Error::Conflict(_) => 409,
            Error::Upstream(_) | Error::Http(_) => 502,
            Error::Timeout(_) => 504,
            Error::Provider { .. } => 502,
            _ => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_expected_statuses() {
        assert_eq!(Error::Auth("x".into()).status_code(), 401);
        assert_eq!(Error::Forbidden("x".into()).status_code(), 403);
        assert_eq!(Error::Quota("x".into()).status_code(), 403);
        assert_eq!(Error::NotFound("x".into()).status_code(), 404);
        assert_eq!(Error::Conflict("x".into()).status_code(), 409);
        assert_eq!(Error::Upstream("x".into()).status_code(), 502);
        assert_eq!(Error::Internal("x".into()).status_code(), 500);
    }

    #[test]
    fn internal_kind_covers_io_and_json() {
        let io = Error::Io(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        assert_eq!(io.kind(), "internal");
    }
}
