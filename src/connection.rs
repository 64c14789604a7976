//! The configured client produced by the factory.

use crate::error::{ConnectionError, RequestError};
use crate::headers::{USER_AGENT, X_APP_ENV, X_APP_NAME};
use http::header::{AsHeaderName, IntoHeaderName, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue, Method};
use reqwest::{Response, Url};
use reqwest_middleware::{ClientWithMiddleware, Middleware, RequestBuilder};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

type ClientTweak = Box<dyn FnOnce(reqwest::ClientBuilder) -> reqwest::ClientBuilder + Send>;

/// Mutable view of a connection before it is finalized.
///
/// Handed to the caller's customizer after the conventional defaults are in
/// place. Anything set here takes precedence over those defaults.
pub struct ConnectionBuilder {
    headers: HeaderMap,
    middleware: Vec<Arc<dyn Middleware>>,
    detector: Option<Arc<dyn Middleware>>,
    adapter: Option<Arc<dyn Middleware>>,
    client_tweaks: Vec<ClientTweak>,
}

impl ConnectionBuilder {
    pub(crate) fn new(headers: HeaderMap, detector: Option<Arc<dyn Middleware>>) -> Self {
        Self {
            headers,
            middleware: Vec::new(),
            detector,
            adapter: None,
            client_tweaks: Vec::new(),
        }
    }

    /// Set a default header, replacing any existing value for the name.
    pub fn header<K: IntoHeaderName>(&mut self, name: K, value: HeaderValue) -> &mut Self {
        self.headers.insert(name, value);
        self
    }

    /// Remove a default header.
    pub fn remove_header<K: AsHeaderName>(&mut self, name: K) -> &mut Self {
        self.headers.remove(name);
        self
    }

    /// Headers as they currently stand.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Add a middleware. Caller middleware wraps the deprecation detector,
    /// so it sees responses after the detector has observed them.
    pub fn with<M: Middleware>(&mut self, middleware: M) -> &mut Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Replace the network transport with a terminal middleware that
    /// answers requests itself.
    pub fn adapter<M: Middleware>(&mut self, adapter: M) -> &mut Self {
        self.adapter = Some(Arc::new(adapter));
        self
    }

    /// Adjust the underlying reqwest client (proxy, TLS, pool settings).
    /// Runs after the conventional timeouts are applied.
    pub fn client<F>(&mut self, tweak: F) -> &mut Self
    where
        F: FnOnce(reqwest::ClientBuilder) -> reqwest::ClientBuilder + Send + 'static,
    {
        self.client_tweaks.push(Box::new(tweak));
        self
    }

    pub(crate) fn finish(
        self,
        base_url: Url,
        timeout: Duration,
        open_timeout: Duration,
    ) -> Result<Connection, ConnectionError> {
        let mut client_builder = reqwest::Client::builder()
            .default_headers(self.headers.clone())
            .timeout(timeout)
            .connect_timeout(open_timeout);
        for tweak in self.client_tweaks {
            client_builder = tweak(client_builder);
        }
        let client = client_builder.build().map_err(ConnectionError::Client)?;

        // Outermost first: caller middleware, detector, then the adapter
        let mut builder = reqwest_middleware::ClientBuilder::new(client);
        for middleware in self.middleware {
            builder = builder.with_arc(middleware);
        }
        if let Some(detector) = self.detector {
            builder = builder.with_arc(detector);
        }
        if let Some(adapter) = self.adapter {
            builder = builder.with_arc(adapter);
        }

        Ok(Connection {
            client: builder.build(),
            base_url,
            headers: self.headers,
            timeout,
            open_timeout,
        })
    }
}

/// A ready-to-use client carrying the caller's identity and timeouts.
///
/// Cheap to clone; clones share the connection pool but nothing else.
#[derive(Clone)]
pub struct Connection {
    client: ClientWithMiddleware,
    base_url: Url,
    headers: HeaderMap,
    timeout: Duration,
    open_timeout: Duration,
}

impl Connection {
    /// Base URL requests are resolved against.
    pub fn host(&self) -> &Url {
        &self.base_url
    }

    /// Headers sent with every request.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Value of the `User-Agent` header.
    pub fn user_agent(&self) -> Option<&str> {
        self.header_str(USER_AGENT)
    }

    /// Value of the `X-App-Name` header.
    pub fn app_name(&self) -> Option<&str> {
        self.header_str(X_APP_NAME)
    }

    /// Value of the `X-App-Env` header.
    pub fn environment(&self) -> Option<&str> {
        self.header_str(X_APP_ENV)
    }

    fn header_str<K: AsHeaderName>(&self, name: K) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Total request budget the connection was created with.
    ///
    /// A [`ConnectionBuilder::client`] tweak that sets its own timeout is
    /// not reflected here.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Connection establishment budget the connection was created with.
    ///
    /// Like [`timeout`](Self::timeout), this ignores overrides made through
    /// [`ConnectionBuilder::client`].
    pub fn open_timeout(&self) -> Duration {
        self.open_timeout
    }

    /// The middleware-wrapped client, for requests outside the helpers here.
    pub fn client(&self) -> &ClientWithMiddleware {
        &self.client
    }

    /// Resolve a path (or relative URL) against the host.
    ///
    /// Relative paths extend the host's path, absolute ones replace it.
    pub fn url(&self, path: &str) -> Result<Url, RequestError> {
        self.base_url
            .join(path)
            .map_err(|source| RequestError::InvalidPath {
                path: path.to_string(),
                source,
            })
    }

    /// Start a request with the conventional headers attached.
    pub fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, RequestError> {
        let url = self.url(path)?;
        Ok(self
            .client
            .request(method, url)
            .headers(self.headers.clone()))
    }

    /// Send a request built from this connection.
    pub async fn send(&self, request: RequestBuilder) -> Result<Response, RequestError> {
        let response = request.send().await?;
        debug!(
            url = %response.url(),
            status = %response.status(),
            "Received response"
        );
        Ok(response)
    }

    pub async fn get(&self, path: &str) -> Result<Response, RequestError> {
        self.send(self.request(Method::GET, path)?).await
    }

    pub async fn delete(&self, path: &str) -> Result<Response, RequestError> {
        self.send(self.request(Method::DELETE, path)?).await
    }

    /// POST a JSON-encoded body.
    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<Response, RequestError> {
        self.send_json(Method::POST, path, body).await
    }

    /// PUT a JSON-encoded body.
    pub async fn put_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<Response, RequestError> {
        self.send_json(Method::PUT, path, body).await
    }

    async fn send_json<T: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: &T,
    ) -> Result<Response, RequestError> {
        let bytes = serde_json::to_vec(body)?;
        let request = self
            .request(method, path)?
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .body(bytes);
        self.send(request).await
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("base_url", &self.base_url.as_str())
            .field("headers", &self.headers)
            .field("timeout", &self.timeout)
            .field("open_timeout", &self.open_timeout)
            .finish_non_exhaustive()
    }
}
