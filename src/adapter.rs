//! In-process transport adapter answering requests with canned responses.
//!
//! Installed through [`ConnectionBuilder::adapter`](crate::ConnectionBuilder::adapter)
//! it replaces the network entirely, which lets services test their
//! clients (and this crate test itself) without sockets.

use async_trait::async_trait;
use http::{Extensions, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use reqwest::{Request, Response, Url};
use reqwest_middleware::{Middleware, Next};
use std::sync::{Arc, Mutex};

/// A canned response.
#[derive(Debug, Clone)]
pub struct StubResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: String,
}

impl StubResponse {
    /// Empty response with the given status; invalid codes become 500.
    pub fn new(status: u16) -> Self {
        Self {
            status: StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            headers: HeaderMap::new(),
            body: String::new(),
        }
    }

    /// Add a header. Invalid names or values are skipped.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            _ => tracing::warn!(name = %name, "Skipping invalid stub header"),
        }
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    fn to_response(&self) -> Response {
        let mut response = http::Response::new(self.body.clone());
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers.clone();
        Response::from(response)
    }
}

/// A request seen by the adapter.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
}

#[derive(Debug, Clone)]
struct Stub {
    method: Method,
    path: String,
    response: StubResponse,
}

/// Terminal middleware matching method and path against registered stubs.
///
/// Unmatched requests fail with a middleware error.
#[derive(Debug, Clone, Default)]
pub struct StubAdapter {
    stubs: Vec<Stub>,
    recorded: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl StubAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `method path` with `response`. The first matching stub wins.
    pub fn on(mut self, method: Method, path: &str, response: StubResponse) -> Self {
        self.stubs.push(Stub {
            method,
            path: path.to_string(),
            response,
        });
        self
    }

    /// Requests received so far, shared between clones of this adapter.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.recorded
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn record(&self, req: &Request) {
        self.recorded
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(RecordedRequest {
                method: req.method().clone(),
                url: req.url().clone(),
                headers: req.headers().clone(),
            });
    }
}

#[async_trait]
impl Middleware for StubAdapter {
    async fn handle(
        &self,
        req: Request,
        _extensions: &mut Extensions,
        _next: Next<'_>,
    ) -> reqwest_middleware::Result<Response> {
        self.record(&req);

        let stub = self
            .stubs
            .iter()
            .find(|s| s.method == *req.method() && s.path == req.url().path());

        match stub {
            Some(stub) => Ok(stub.response.to_response()),
            None => Err(reqwest_middleware::Error::Middleware(anyhow::anyhow!(
                "no stub registered for {} {}",
                req.method(),
                req.url().path()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(adapter: StubAdapter) -> reqwest_middleware::ClientWithMiddleware {
        reqwest_middleware::ClientBuilder::new(reqwest::Client::new())
            .with(adapter)
            .build()
    }

    #[tokio::test]
    async fn test_matching_stub_answers() {
        let adapter = StubAdapter::new().on(
            Method::GET,
            "/pokemon",
            StubResponse::new(201).header("X-Test", "yes").body("ok"),
        );
        let response = client(adapter.clone())
            .get("http://foo.com/pokemon?limit=1")
            .header("X-Sent", "1")
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 201);
        assert_eq!(response.headers()["x-test"], "yes");
        assert_eq!(response.text().await.unwrap(), "ok");

        let requests = adapter.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url.query(), Some("limit=1"));
        assert_eq!(requests[0].headers["x-sent"], "1");
    }

    #[tokio::test]
    async fn test_method_must_match() {
        let adapter = StubAdapter::new().on(Method::GET, "/pokemon", StubResponse::new(200));
        let result = client(adapter.clone())
            .post("http://foo.com/pokemon")
            .send()
            .await;

        let err = result.unwrap_err();
        assert!(err.to_string().contains("no stub registered for POST /pokemon"));
        assert_eq!(adapter.requests().len(), 1);
    }

    #[test]
    fn test_invalid_status_becomes_500() {
        assert_eq!(StubResponse::new(1000).status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
