//! Client-side detection of deprecated endpoints.
//!
//! [`DeprecationDetector`] is a response observer installed on every
//! connection by default. When a response carries a parseable `Sunset`
//! header it reports a [`DeprecationWarning`] through a [`Notifier`].
//! It never alters, drops or fails a response: a missing or malformed
//! header is simply no signal.

use crate::headers::{format_http_date, parse_http_date, SUNSET};
use crate::metrics::ConventionMetrics;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use http::{Extensions, HeaderMap, Method};
use reqwest::{Request, Response, Url};
use reqwest_middleware::{Middleware, Next};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// A called endpoint announced its removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeprecationWarning {
    pub method: Method,
    pub url: Url,
    pub sunset: DateTime<Utc>,
}

impl DeprecationWarning {
    /// Human-readable warning naming the endpoint and its sunset date.
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Path of the deprecated endpoint.
    pub fn path(&self) -> &str {
        self.url.path()
    }
}

impl fmt::Display for DeprecationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} is deprecated and will be removed after {}",
            self.method,
            self.url,
            format_http_date(&self.sunset)
        )
    }
}

/// Destination for deprecation warnings.
///
/// Implementations must not block or panic; they run inline on the
/// response path.
pub trait Notifier: Send + Sync + 'static {
    fn warn(&self, warning: &DeprecationWarning);
}

impl<F> Notifier for F
where
    F: Fn(&DeprecationWarning) + Send + Sync + 'static,
{
    fn warn(&self, warning: &DeprecationWarning) {
        self(warning)
    }
}

/// Default notifier, writes a `warn` event on the `deprecation` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn warn(&self, warning: &DeprecationWarning) {
        warn!(
            target: "deprecation",
            method = %warning.method,
            url = %warning.url,
            sunset = %format_http_date(&warning.sunset),
            "{}",
            warning
        );
    }
}

/// Notifier forwarding structured warnings to a channel drained by the host.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<DeprecationWarning>,
}

impl ChannelNotifier {
    /// Create a notifier and the receiver its warnings are delivered to.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DeprecationWarning>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn warn(&self, warning: &DeprecationWarning) {
        if self.tx.send(warning.clone()).is_err() {
            debug!(url = %warning.url, "Deprecation receiver dropped, warning discarded");
        }
    }
}

/// Response middleware reporting `Sunset` headers.
///
/// Stateless; one instance can serve any number of concurrent requests.
#[derive(Clone)]
pub struct DeprecationDetector {
    notifier: Arc<dyn Notifier>,
    metrics: Option<Arc<ConventionMetrics>>,
}

impl DeprecationDetector {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            notifier,
            metrics: None,
        }
    }

    /// Count detected sunsets in the given metrics.
    pub fn with_metrics(mut self, metrics: Arc<ConventionMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Inspect response headers for a sunset signal.
    ///
    /// Returns the warning that was emitted, if any.
    pub fn check(
        &self,
        method: &Method,
        url: &Url,
        headers: &HeaderMap,
    ) -> Option<DeprecationWarning> {
        let raw = headers.get(SUNSET)?;

        let Some(sunset) = raw.to_str().ok().and_then(parse_http_date) else {
            debug!(url = %url, value = ?raw, "Ignoring unparseable Sunset header");
            return None;
        };

        let warning = DeprecationWarning {
            method: method.clone(),
            url: url.clone(),
            sunset,
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_sunset(url.host_str().unwrap_or_default());
        }
        self.notifier.warn(&warning);

        Some(warning)
    }

    /// Observe a response and hand it back untouched.
    pub fn observe(&self, method: &Method, url: &Url, response: Response) -> Response {
        self.check(method, url, response.headers());
        response
    }
}

impl Default for DeprecationDetector {
    fn default() -> Self {
        Self::new(Arc::new(TracingNotifier))
    }
}

impl fmt::Debug for DeprecationDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeprecationDetector")
            .field("metrics", &self.metrics.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Middleware for DeprecationDetector {
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<Response> {
        // The response URL may differ after redirects; report what was called
        let method = req.method().clone();
        let url = req.url().clone();

        let response = next.run(req, extensions).await?;
        Ok(self.observe(&method, &url, response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{StubAdapter, StubResponse};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingNotifier {
        warnings: Mutex<Vec<DeprecationWarning>>,
    }

    impl Notifier for RecordingNotifier {
        fn warn(&self, warning: &DeprecationWarning) {
            self.warnings.lock().unwrap().push(warning.clone());
        }
    }

    fn url() -> Url {
        "http://foo.com/pokemon/25".parse().unwrap()
    }

    fn headers(sunset: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(SUNSET, sunset.parse().unwrap());
        headers
    }

    #[test]
    fn test_sunset_fires_one_warning() {
        let notifier = Arc::new(RecordingNotifier::default());
        let detector = DeprecationDetector::new(notifier.clone());

        let warning = detector
            .check(&Method::GET, &url(), &headers("Sat, 31 Dec 2022 23:59:59 GMT"))
            .unwrap();

        let warnings = notifier.warnings.lock().unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0], warning);

        let message = warning.message();
        assert!(message.contains("/pokemon/25"));
        assert!(message.contains("Sat, 31 Dec 2022 23:59:59 GMT"));
        assert_eq!(warning.path(), "/pokemon/25");
    }

    #[test]
    fn test_no_sunset_no_warning() {
        let notifier = Arc::new(RecordingNotifier::default());
        let detector = DeprecationDetector::new(notifier.clone());

        assert!(detector.check(&Method::GET, &url(), &HeaderMap::new()).is_none());
        assert!(notifier.warnings.lock().unwrap().is_empty());
    }

    #[test]
    fn test_unparseable_sunset_no_warning() {
        let notifier = Arc::new(RecordingNotifier::default());
        let detector = DeprecationDetector::new(notifier.clone());

        assert!(detector
            .check(&Method::GET, &url(), &headers("not-a-date"))
            .is_none());
        assert!(notifier.warnings.lock().unwrap().is_empty());
    }

    #[test]
    fn test_closure_notifier_and_metrics() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let metrics = Arc::new(ConventionMetrics::new("test"));
        let detector = DeprecationDetector::new(Arc::new(move |w: &DeprecationWarning| {
            sink.lock().unwrap().push(w.message());
        }))
        .with_metrics(metrics.clone());

        detector.check(&Method::POST, &url(), &headers("2030-01-01T00:00:00Z"));

        assert_eq!(seen.lock().unwrap().len(), 1);
        assert!(seen.lock().unwrap()[0].starts_with("POST http://foo.com/pokemon/25"));
        assert!(metrics.encode().contains("host=\"foo.com\"} 1"));
    }

    #[test]
    fn test_channel_notifier() {
        let (notifier, mut rx) = ChannelNotifier::new();
        let detector = DeprecationDetector::new(Arc::new(notifier));

        detector.check(&Method::GET, &url(), &headers("Sat, 31 Dec 2022 23:59:59 GMT"));

        let warning = rx.try_recv().unwrap();
        assert_eq!(warning.path(), "/pokemon/25");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_channel_notifier_survives_dropped_receiver() {
        let (notifier, rx) = ChannelNotifier::new();
        drop(rx);
        let detector = DeprecationDetector::new(Arc::new(notifier));
        assert!(detector
            .check(&Method::GET, &url(), &headers("Sat, 31 Dec 2022 23:59:59 GMT"))
            .is_some());
    }

    #[tokio::test]
    async fn test_middleware_passes_response_through() {
        let notifier = Arc::new(RecordingNotifier::default());
        let stub = StubAdapter::new().on(
            Method::GET,
            "/pokemon/25",
            StubResponse::new(200)
                .header("Sunset", "Sat, 31 Dec 2022 23:59:59 GMT")
                .body("pikachu"),
        );
        let client = reqwest_middleware::ClientBuilder::new(reqwest::Client::new())
            .with(DeprecationDetector::new(notifier.clone()))
            .with(stub)
            .build();

        let response = client.get(url()).send().await.unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(response.headers()["sunset"], "Sat, 31 Dec 2022 23:59:59 GMT");
        assert_eq!(response.text().await.unwrap(), "pikachu");

        let warnings = notifier.warnings.lock().unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].url, url());
    }

    #[tokio::test]
    async fn test_middleware_passes_errors_through() {
        let notifier = Arc::new(RecordingNotifier::default());
        let client = reqwest_middleware::ClientBuilder::new(reqwest::Client::new())
            .with(DeprecationDetector::new(notifier.clone()))
            .with(StubAdapter::new())
            .build();

        let result = client.get(url()).send().await;

        assert!(matches!(result, Err(reqwest_middleware::Error::Middleware(_))));
        assert!(notifier.warnings.lock().unwrap().is_empty());
    }
}
