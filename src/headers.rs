//! Header names and HTTP-date handling.
//!
//! Outbound requests carry the caller's identity:
//! - `User-Agent` and `X-App-Name`: the application name
//! - `X-App-Env`: the deployment environment
//!
//! Deprecations are signalled on responses with:
//! - Sunset header (RFC 8594)
//! - Deprecation header (draft-ietf-httpapi-deprecation-header)
//! - Link header with documentation and successor

use crate::config::SunsetRoute;
use chrono::{DateTime, NaiveDateTime, Utc};
use http::header::{HeaderMap, HeaderName, HeaderValue, LINK};

pub use http::header::USER_AGENT;

/// Application name of the caller.
pub const X_APP_NAME: HeaderName = HeaderName::from_static("x-app-name");

/// Deployment environment of the caller.
pub const X_APP_ENV: HeaderName = HeaderName::from_static("x-app-env");

/// RFC 8594 sunset date of the requested resource.
pub const SUNSET: HeaderName = HeaderName::from_static("sunset");

/// Deprecation marker of the requested resource.
pub const DEPRECATION: HeaderName = HeaderName::from_static("deprecation");

/// Builder for the deprecation headers a server attaches to a sunset route.
pub struct SunsetHeaders {
    headers: HeaderMap,
}

impl SunsetHeaders {
    /// Build headers for a route scheduled for removal.
    pub fn for_route(route: &SunsetRoute) -> Self {
        let mut headers = HeaderMap::new();

        // Deprecation: @<unix> when the deprecation date is known, true otherwise
        let deprecation = match &route.deprecated_at {
            Some(at) => format!("@{}", at.timestamp()),
            None => "true".to_string(),
        };
        insert(&mut headers, DEPRECATION, &deprecation);

        insert(&mut headers, SUNSET, &format_http_date(&route.sunset_at));

        let mut links = Vec::new();
        if let Some(docs) = &route.documentation_url {
            links.push(format!("<{}>; rel=\"deprecation\"", docs));
        }
        if let Some(replacement) = &route.replacement {
            links.push(format!("<{}>; rel=\"successor-version\"", replacement));
        }
        if !links.is_empty() {
            insert(&mut headers, LINK, &links.join(", "));
        }

        Self { headers }
    }

    /// Get all headers.
    pub fn build(self) -> HeaderMap {
        self.headers
    }
}

fn insert(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(name, value);
        }
        Err(_) => {
            tracing::warn!(header = %name, value = %value, "Skipping header with invalid value");
        }
    }
}

/// Format a datetime as an HTTP date (RFC 7231 IMF-fixdate).
/// Example: Sun, 06 Nov 1994 08:49:37 GMT
pub fn format_http_date(dt: &DateTime<Utc>) -> String {
    dt.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Parse an HTTP date to `DateTime<Utc>`.
///
/// Accepts the three RFC 7231 forms (IMF-fixdate, RFC 850, asctime) and
/// RFC 3339 as a fallback. Returns `None` for anything else.
pub fn parse_http_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();

    if let Some(without_tz) = s.strip_suffix(" GMT") {
        // IMF-fixdate, then obsolete RFC 850
        for format in ["%a, %d %b %Y %H:%M:%S", "%A, %d-%b-%y %H:%M:%S"] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(without_tz, format) {
                return Some(naive.and_utc());
            }
        }
    }

    // asctime: Sun Nov  6 08:49:37 1994
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%a %b %e %H:%M:%S %Y") {
        return Some(naive.and_utc());
    }

    if let Ok(dt) = s.parse::<DateTime<Utc>>() {
        return Some(dt);
    }

    None
}
