//! Validated construction of connections.
//!
//! A [`Connection`] only exists once the host, application name, timeout
//! and environment are all known. Validation runs in a fixed order and the
//! first failure is returned:
//!
//! 1. host ([`ConnectionError::MissingHost`], [`ConnectionError::InvalidHost`])
//! 2. application name: params, config, probe ([`ConnectionError::MissingApp`])
//! 3. total timeout ([`ConnectionError::MissingTimeout`])
//! 4. open timeout, defaulting to [`DEFAULT_OPEN_TIMEOUT_SECS`]
//!    ([`ConnectionError::MissingOpenTimeout`] only for an explicit bad value)
//! 5. environment: params, config, probe ([`ConnectionError::MissingEnv`])
//!
//! Construction performs no I/O.

use crate::config::{ConfigSource, NotifierKind};
use crate::connection::{Connection, ConnectionBuilder};
use crate::deprecation::{
    ChannelNotifier, DeprecationDetector, DeprecationWarning, Notifier, TracingNotifier,
};
use crate::error::ConnectionError;
use crate::headers::{USER_AGENT, X_APP_ENV, X_APP_NAME};
use crate::metrics::ConventionMetrics;
use crate::probe::{EnvVarProbe, EnvironmentProbe};
use http::{HeaderMap, HeaderValue};
use reqwest::Url;
use reqwest_middleware::Middleware;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Open timeout used when none is given.
pub const DEFAULT_OPEN_TIMEOUT_SECS: f64 = 2.0;

type Customizer = Box<dyn FnOnce(&mut ConnectionBuilder) + Send>;
type WarningReceiver = mpsc::UnboundedReceiver<DeprecationWarning>;

/// Per-call construction parameters.
#[derive(Default)]
pub struct ConnectionParams {
    pub host: String,
    pub app_name: Option<String>,
    pub environment: Option<String>,
    /// Total request budget in seconds.
    pub timeout: Option<f64>,
    /// Connection establishment budget in seconds.
    pub open_timeout: Option<f64>,
    customizer: Option<Customizer>,
}

impl ConnectionParams {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    pub fn app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = Some(app_name.into());
        self
    }

    pub fn environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    pub fn timeout(mut self, seconds: f64) -> Self {
        self.timeout = Some(seconds);
        self
    }

    pub fn open_timeout(mut self, seconds: f64) -> Self {
        self.open_timeout = Some(seconds);
        self
    }

    /// Adjust the connection after the defaults are applied.
    pub fn customize<F>(mut self, customizer: F) -> Self
    where
        F: FnOnce(&mut ConnectionBuilder) + Send + 'static,
    {
        self.customizer = Some(Box::new(customizer));
        self
    }
}

impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("host", &self.host)
            .field("app_name", &self.app_name)
            .field("environment", &self.environment)
            .field("timeout", &self.timeout)
            .field("open_timeout", &self.open_timeout)
            .field("customizer", &self.customizer.is_some())
            .finish()
    }
}

/// Builds connections from params, configured defaults and a probe.
#[derive(Clone)]
pub struct ConnectionFactory {
    config: ConfigSource,
    probe: Arc<dyn EnvironmentProbe>,
    notifier: Arc<dyn Notifier>,
    warnings: Arc<Mutex<Option<WarningReceiver>>>,
    metrics: Option<Arc<ConventionMetrics>>,
}

impl ConnectionFactory {
    /// Factory reading defaults from `config` and the process environment.
    ///
    /// The notifier is chosen from the configuration at this point:
    /// `notifier: channel` installs a [`ChannelNotifier`] whose receiver is
    /// handed out by [`take_warnings`](Self::take_warnings).
    pub fn new(config: impl Into<ConfigSource>) -> Self {
        let config = config.into();
        let (notifier, receiver) = match config.snapshot().notifier {
            NotifierKind::Log => (Arc::new(TracingNotifier) as Arc<dyn Notifier>, None),
            NotifierKind::Channel => {
                let (notifier, rx) = ChannelNotifier::new();
                (Arc::new(notifier) as Arc<dyn Notifier>, Some(rx))
            }
        };
        Self {
            config,
            probe: Arc::new(EnvVarProbe::default()),
            notifier,
            warnings: Arc::new(Mutex::new(receiver)),
            metrics: None,
        }
    }

    /// Replace the last-resort identity probe.
    pub fn with_probe(mut self, probe: Arc<dyn EnvironmentProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Send deprecation warnings to `notifier`, overriding the configured kind.
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self.warnings = Arc::new(Mutex::new(None));
        self
    }

    /// Receiver of the configured warning channel.
    ///
    /// `None` unless the configuration selects `notifier: channel`, and on
    /// every call after the first. Clones of the factory share the receiver.
    pub fn take_warnings(&self) -> Option<WarningReceiver> {
        self.warnings.lock().ok()?.take()
    }

    /// Record construction outcomes and detected sunsets.
    pub fn with_metrics(mut self, metrics: Arc<ConventionMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Validate `params` and build a connection.
    pub fn create(&self, params: ConnectionParams) -> Result<Connection, ConnectionError> {
        let host = params.host.clone();
        self.build(params).inspect_err(|e| {
            warn!(host = %host, reason = e.reason(), error = %e, "Connection rejected");
            if let Some(metrics) = &self.metrics {
                metrics.record_connection_error(e.reason());
            }
        })
    }

    fn build(&self, params: ConnectionParams) -> Result<Connection, ConnectionError> {
        let config = self.config.snapshot();

        let host = params.host.trim();
        if host.is_empty() {
            return Err(ConnectionError::MissingHost);
        }
        let mut base_url = Url::parse(host).map_err(|e| ConnectionError::InvalidHost {
            host: host.to_string(),
            reason: e.to_string(),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ConnectionError::InvalidHost {
                host: host.to_string(),
                reason: "not a base URL".to_string(),
            });
        }
        // Relative request paths extend the host's path instead of replacing
        // its last segment
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let app_name = first_present([
            params.app_name,
            config.app_name.clone(),
        ])
        .or_else(|| present(self.probe.detect_app_name()))
        .ok_or(ConnectionError::MissingApp)?;

        let timeout = params
            .timeout
            .and_then(positive_duration)
            .ok_or(ConnectionError::MissingTimeout)?;

        let open_timeout = match params.open_timeout {
            None => Duration::from_secs_f64(DEFAULT_OPEN_TIMEOUT_SECS),
            Some(seconds) => {
                positive_duration(seconds).ok_or(ConnectionError::MissingOpenTimeout)?
            }
        };

        let environment = first_present([
            params.environment,
            config.app_env.clone(),
        ])
        .or_else(|| present(self.probe.detect_environment()))
        .ok_or(ConnectionError::MissingEnv)?;

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, header_value("User-Agent", &app_name)?);
        headers.insert(X_APP_NAME, header_value("X-App-Name", &app_name)?);
        headers.insert(X_APP_ENV, header_value("X-App-Env", &environment)?);

        let detector = config.detect_deprecations.then(|| {
            let mut detector = DeprecationDetector::new(Arc::clone(&self.notifier));
            if let Some(metrics) = &self.metrics {
                detector = detector.with_metrics(Arc::clone(metrics));
            }
            Arc::new(detector) as Arc<dyn Middleware>
        });

        let mut builder = ConnectionBuilder::new(headers, detector);
        if let Some(customize) = params.customizer {
            customize(&mut builder);
        }
        let connection = builder.finish(base_url, timeout, open_timeout)?;

        info!(
            host = %connection.host(),
            app_name = %app_name,
            environment = %environment,
            timeout_ms = timeout.as_millis() as u64,
            open_timeout_ms = open_timeout.as_millis() as u64,
            detect_deprecations = config.detect_deprecations,
            "Connection created"
        );
        debug!(headers = ?connection.headers(), "Connection headers");
        if let Some(metrics) = &self.metrics {
            metrics.record_connection(&environment);
        }

        Ok(connection)
    }
}

impl Default for ConnectionFactory {
    fn default() -> Self {
        Self::new(ConfigSource::default())
    }
}

impl fmt::Debug for ConnectionFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionFactory")
            .field("config", &self.config.snapshot())
            .field("metrics", &self.metrics.is_some())
            .finish_non_exhaustive()
    }
}

fn present(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn first_present<const N: usize>(candidates: [Option<String>; N]) -> Option<String> {
    candidates.into_iter().find_map(present)
}

fn positive_duration(seconds: f64) -> Option<Duration> {
    if seconds.is_finite() && seconds > 0.0 {
        Duration::try_from_secs_f64(seconds).ok()
    } else {
        None
    }
}

fn header_value(name: &'static str, value: &str) -> Result<HeaderValue, ConnectionError> {
    HeaderValue::from_str(value).map_err(|_| ConnectionError::InvalidHeader {
        name,
        value: value.to_string(),
    })
}
