//! Error types for connection construction, requests and configuration.

use thiserror::Error;

/// Failure to construct a [`Connection`](crate::Connection).
///
/// Every variant is raised before any network I/O and before a connection
/// object exists. These are misconfigurations and are returned to the
/// caller synchronously.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// No host, or an empty one.
    #[error("host is required")]
    MissingHost,

    /// The host is not an absolute URL.
    #[error("host {host:?} is not an absolute URL: {reason}")]
    InvalidHost { host: String, reason: String },

    /// No application name from the params, the config, or the probe.
    #[error("application name is required (pass app_name, configure app_name, or set it in the environment)")]
    MissingApp,

    /// No positive, finite total timeout.
    #[error("a positive timeout is required")]
    MissingTimeout,

    /// An open timeout was given but is not positive and finite.
    #[error("open timeout must be positive when given")]
    MissingOpenTimeout,

    /// No environment from the params, the config, or the probe.
    #[error("environment is required (pass environment, configure app_env, or set it in the environment)")]
    MissingEnv,

    /// A resolved value cannot be sent as a header value.
    #[error("value {value:?} is not a valid {name} header")]
    InvalidHeader { name: &'static str, value: String },

    /// The underlying HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl ConnectionError {
    /// Stable label used for logs and metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::MissingHost => "missing_host",
            Self::InvalidHost { .. } => "invalid_host",
            Self::MissingApp => "missing_app",
            Self::MissingTimeout => "missing_timeout",
            Self::MissingOpenTimeout => "missing_open_timeout",
            Self::MissingEnv => "missing_env",
            Self::InvalidHeader { .. } => "invalid_header",
            Self::Client(_) => "client",
        }
    }
}

/// Failure of a request issued through a [`Connection`](crate::Connection).
///
/// Transport errors are never retried or swallowed; the original error is
/// kept as the source.
#[derive(Debug, Error)]
pub enum RequestError {
    /// The path could not be joined onto the connection's host.
    #[error("invalid request path {path:?}: {source}")]
    InvalidPath {
        path: String,
        #[source]
        source: url::ParseError,
    },

    /// The connection could not be established within the open timeout.
    #[error("connect timeout: {0}")]
    ConnectTimeout(#[source] reqwest::Error),

    /// The request did not complete within the total timeout.
    #[error("request timeout: {0}")]
    Timeout(#[source] reqwest::Error),

    /// Any other transport failure.
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),

    /// A middleware in the chain failed.
    #[error("middleware error: {0}")]
    Middleware(#[source] anyhow::Error),

    /// The request body could not be encoded.
    #[error("failed to encode request body: {0}")]
    Encode(#[from] serde_json::Error),
}

impl RequestError {
    /// Whether either timeout budget was exceeded.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::ConnectTimeout(_) | Self::Timeout(_))
    }
}

impl From<reqwest::Error> for RequestError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() && err.is_connect() {
            Self::ConnectTimeout(err)
        } else if err.is_timeout() {
            Self::Timeout(err)
        } else {
            Self::Transport(err)
        }
    }
}

impl From<reqwest_middleware::Error> for RequestError {
    fn from(err: reqwest_middleware::Error) -> Self {
        match err {
            reqwest_middleware::Error::Reqwest(e) => e.into(),
            reqwest_middleware::Error::Middleware(e) => Self::Middleware(e),
        }
    }
}

/// Failure to load or validate the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_labels() {
        assert_eq!(ConnectionError::MissingHost.reason(), "missing_host");
        assert_eq!(ConnectionError::MissingApp.reason(), "missing_app");
        assert_eq!(ConnectionError::MissingTimeout.reason(), "missing_timeout");
        assert_eq!(ConnectionError::MissingEnv.reason(), "missing_env");
        assert_eq!(
            ConnectionError::MissingOpenTimeout.reason(),
            "missing_open_timeout"
        );
    }

    #[test]
    fn test_middleware_error_is_not_timeout() {
        let err: RequestError =
            reqwest_middleware::Error::Middleware(anyhow::anyhow!("boom")).into();
        assert!(matches!(err, RequestError::Middleware(_)));
        assert!(!err.is_timeout());
    }
}
