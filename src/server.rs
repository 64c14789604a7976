//! Server-side tower middleware.
//!
//! - [`CallerLogLayer`] logs who is calling, from the conventional request
//!   headers.
//! - [`SunsetLayer`] announces the removal of routes listed in a
//!   [`SunsetRoutes`] table by adding `Sunset`, `Deprecation` and `Link`
//!   headers to their responses.
//!
//! # Example
//!
//! ```ignore
//! let routes = SunsetRoutes::new(config.sunset_routes)?;
//! Router::new()
//!     .route("/v1/pokemon", get(list_pokemon))
//!     .layer(SunsetLayer::new(routes))
//!     .layer(CallerLogLayer);
//! ```

use crate::config::SunsetRoute;
use crate::error::ConfigError;
use crate::headers::{SunsetHeaders, USER_AGENT, X_APP_NAME};
use globset::{Glob, GlobMatcher};
use http::{HeaderMap, HeaderName, Request, Response};
use pin_project_lite::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use tower::{Layer, Service};
use tracing::{debug, info};

/// Layer logging the caller's declared identity for every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallerLogLayer;

impl<S> Layer<S> for CallerLogLayer {
    type Service = CallerLogService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CallerLogService { inner }
    }
}

/// Service wrapper for [`CallerLogLayer`].
#[derive(Debug, Clone)]
pub struct CallerLogService<S> {
    inner: S,
}

impl<S, B> Service<Request<B>> for CallerLogService<S>
where
    S: Service<Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        info!(
            method = %req.method(),
            path = %req.uri().path(),
            "{}",
            caller_line(req.headers())
        );
        self.inner.call(req)
    }
}

/// `user_agent=<value>; app_name=<value>;` with empty values for absent headers.
pub fn caller_line(headers: &HeaderMap) -> String {
    let value = |name: &HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    };
    format!(
        "user_agent={}; app_name={};",
        value(&USER_AGENT),
        value(&X_APP_NAME)
    )
}

#[derive(Debug)]
struct CompiledRoute {
    route: SunsetRoute,
    matcher: Option<GlobMatcher>,
    headers: HeaderMap,
}

impl CompiledRoute {
    fn matches(&self, method: &str, path: &str) -> bool {
        if !self.route.matches_method(method) {
            return false;
        }
        match &self.matcher {
            Some(matcher) => matcher.is_match(path),
            None => self.route.matches_literal_path(path),
        }
    }
}

/// Table of routes scheduled for removal, with their headers precomputed.
#[derive(Debug, Clone, Default)]
pub struct SunsetRoutes {
    routes: Arc<Vec<CompiledRoute>>,
}

impl SunsetRoutes {
    /// Validate and compile the routes. Earlier routes win on overlap.
    pub fn new(routes: Vec<SunsetRoute>) -> Result<Self, ConfigError> {
        let compiled = routes
            .into_iter()
            .map(|route| {
                route.validate()?;
                let matcher = if route.is_pattern() {
                    let glob = Glob::new(&route.path).map_err(|e| {
                        ConfigError::Invalid(format!(
                            "invalid path pattern for id {}: {}",
                            route.id, e
                        ))
                    })?;
                    Some(glob.compile_matcher())
                } else {
                    None
                };
                let headers = SunsetHeaders::for_route(&route).build();
                Ok(CompiledRoute {
                    route,
                    matcher,
                    headers,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(Self {
            routes: Arc::new(compiled),
        })
    }

    /// Find the route covering a request.
    pub fn find(&self, method: &str, path: &str) -> Option<&SunsetRoute> {
        self.find_compiled(method, path).map(|c| &c.route)
    }

    fn find_compiled(&self, method: &str, path: &str) -> Option<&CompiledRoute> {
        self.routes.iter().find(|c| c.matches(method, path))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Layer adding deprecation headers to responses of sunset routes.
#[derive(Debug, Clone)]
pub struct SunsetLayer {
    routes: SunsetRoutes,
}

impl SunsetLayer {
    pub fn new(routes: SunsetRoutes) -> Self {
        Self { routes }
    }
}

impl<S> Layer<S> for SunsetLayer {
    type Service = SunsetService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SunsetService {
            inner,
            routes: self.routes.clone(),
        }
    }
}

/// Service wrapper for [`SunsetLayer`].
#[derive(Debug, Clone)]
pub struct SunsetService<S> {
    inner: S,
    routes: SunsetRoutes,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for SunsetService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = SunsetFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let headers = self
            .routes
            .find_compiled(req.method().as_str(), req.uri().path())
            .map(|compiled| {
                debug!(
                    route_id = %compiled.route.id,
                    method = %req.method(),
                    path = %req.uri().path(),
                    "Request to sunset route"
                );
                compiled.headers.clone()
            });

        SunsetFuture {
            inner: self.inner.call(req),
            headers,
        }
    }
}

pin_project! {
    /// Response future for [`SunsetService`].
    pub struct SunsetFuture<F> {
        #[pin]
        inner: F,
        headers: Option<HeaderMap>,
    }
}

impl<F, B, E> Future for SunsetFuture<F>
where
    F: Future<Output = Result<Response<B>, E>>,
{
    type Output = Result<Response<B>, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let mut response = ready!(this.inner.poll(cx))?;
        if let Some(headers) = this.headers.take() {
            // Handler-set values win
            for (name, value) in headers.iter() {
                if !response.headers().contains_key(name) {
                    response.headers_mut().insert(name.clone(), value.clone());
                }
            }
        }
        Poll::Ready(Ok(response))
    }
}
