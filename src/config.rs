//! Configuration for connections and sunset routes.
//!
//! Defines the connection defaults (caller identity, deprecation detection),
//! the server-side sunset route table, and metrics options.

use crate::error::ConfigError;
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

/// Main configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConventionsConfig {
    /// Defaults for outbound connections
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Routes this service has scheduled for removal
    #[serde(default)]
    pub sunset_routes: Vec<SunsetRoute>,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl ConventionsConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.connection.validate()?;
        self.metrics.validate()?;

        let mut ids = HashSet::new();
        for route in &self.sunset_routes {
            route.validate()?;
            if !ids.insert(route.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate sunset route id: {}",
                    route.id
                )));
            }
        }
        Ok(())
    }
}

/// Process-wide defaults consulted by every connection construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionConfig {
    /// Default caller identity
    #[serde(default)]
    pub app_name: Option<String>,

    /// Default deployment environment label
    #[serde(default)]
    pub app_env: Option<String>,

    /// Whether the deprecation detector is installed on new connections
    #[serde(default = "default_true")]
    pub detect_deprecations: bool,

    /// Where deprecation warnings go unless a notifier is injected
    #[serde(default)]
    pub notifier: NotifierKind,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            app_name: None,
            app_env: None,
            detect_deprecations: true,
            notifier: NotifierKind::default(),
        }
    }
}

/// Deprecation reporter installed by a factory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifierKind {
    /// `warn` events on the `deprecation` tracing target
    #[default]
    Log,
    /// Structured warnings on a channel the host drains
    Channel,
}

fn default_true() -> bool {
    true
}

impl ConnectionConfig {
    /// Validate the connection defaults.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if matches!(&self.app_name, Some(name) if name.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "connection.app_name cannot be empty".to_string(),
            ));
        }
        if matches!(&self.app_env, Some(env) if env.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "connection.app_env cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Replaceable, lock-free shared [`ConnectionConfig`].
///
/// Readers take an immutable snapshot; writers swap in a whole new value.
/// A factory reads one snapshot per construction, so a concurrent `store`
/// is seen either entirely or not at all.
#[derive(Debug, Clone)]
pub struct SharedConfig {
    inner: Arc<ArcSwap<ConnectionConfig>>,
}

impl SharedConfig {
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(config)),
        }
    }

    /// Current snapshot.
    pub fn load(&self) -> Arc<ConnectionConfig> {
        self.inner.load_full()
    }

    /// Replace the configuration for subsequent constructions.
    pub fn store(&self, config: ConnectionConfig) {
        self.inner.store(Arc::new(config));
    }
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self::new(ConnectionConfig::default())
    }
}

/// Where a factory reads its connection defaults from.
#[derive(Debug, Clone)]
pub enum ConfigSource {
    /// A fixed configuration.
    Fixed(Arc<ConnectionConfig>),
    /// A configuration that may be replaced at runtime.
    Shared(SharedConfig),
}

impl ConfigSource {
    pub fn snapshot(&self) -> Arc<ConnectionConfig> {
        match self {
            Self::Fixed(config) => Arc::clone(config),
            Self::Shared(shared) => shared.load(),
        }
    }
}

impl Default for ConfigSource {
    fn default() -> Self {
        Self::Fixed(Arc::new(ConnectionConfig::default()))
    }
}

impl From<ConnectionConfig> for ConfigSource {
    fn from(config: ConnectionConfig) -> Self {
        Self::Fixed(Arc::new(config))
    }
}

impl From<Arc<ConnectionConfig>> for ConfigSource {
    fn from(config: Arc<ConnectionConfig>) -> Self {
        Self::Fixed(config)
    }
}

impl From<SharedConfig> for ConfigSource {
    fn from(shared: SharedConfig) -> Self {
        Self::Shared(shared)
    }
}

/// A route this service will stop serving at `sunset_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SunsetRoute {
    /// Unique identifier for this route
    pub id: String,

    /// Path pattern to match (supports glob patterns like /v1/*)
    pub path: String,

    /// HTTP methods to match (empty means all methods)
    #[serde(default)]
    pub methods: Vec<String>,

    /// Date when the route was deprecated (RFC 3339)
    #[serde(default)]
    pub deprecated_at: Option<DateTime<Utc>>,

    /// Date when the route will be removed (RFC 3339)
    pub sunset_at: DateTime<Utc>,

    /// Link to migration documentation
    #[serde(default)]
    pub documentation_url: Option<String>,

    /// Path of the successor route
    #[serde(default)]
    pub replacement: Option<String>,
}

impl SunsetRoute {
    /// Validate the route configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.id.is_empty() {
            return Err(ConfigError::Invalid(
                "sunset route id cannot be empty".to_string(),
            ));
        }
        if self.path.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "sunset route path cannot be empty for id: {}",
                self.id
            )));
        }
        if self.is_pattern() {
            globset::Glob::new(&self.path).map_err(|e| {
                ConfigError::Invalid(format!("invalid path pattern for id {}: {}", self.id, e))
            })?;
        }

        if self.sunset_at < Utc::now() {
            tracing::warn!(
                route_id = %self.id,
                sunset = %self.sunset_at,
                "Sunset date is in the past but the route is still served"
            );
        }

        Ok(())
    }

    /// Whether the path is a glob pattern rather than a literal path.
    pub fn is_pattern(&self) -> bool {
        self.path.contains(['*', '?', '[', '{'])
    }

    /// Check if the method is covered by this route.
    pub fn matches_method(&self, method: &str) -> bool {
        self.methods.is_empty() || self.methods.iter().any(|m| m.eq_ignore_ascii_case(method))
    }

    /// Check a literal path: exact match, or a sub-path of it.
    pub fn matches_literal_path(&self, path: &str) -> bool {
        let prefix = self.path.trim_end_matches('/');
        path == self.path
            || path
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('/'))
    }
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// Whether to collect Prometheus metrics
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Prefix for metric names
    #[serde(default = "default_metrics_prefix")]
    pub prefix: String,
}

impl MetricsConfig {
    /// Validate the metric name prefix.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut chars = self.prefix.chars();
        let valid = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == ':')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':');
        if !valid {
            return Err(ConfigError::Invalid(format!(
                "metrics.prefix {:?} is not a valid metric name",
                self.prefix
            )));
        }
        Ok(())
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            prefix: default_metrics_prefix(),
        }
    }
}

fn default_metrics_prefix() -> String {
    "service_conventions".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn route(path: &str, methods: &[&str]) -> SunsetRoute {
        SunsetRoute {
            id: "test".to_string(),
            path: path.to_string(),
            methods: methods.iter().map(|m| m.to_string()).collect(),
            deprecated_at: None,
            sunset_at: "2030-06-01T00:00:00Z".parse().unwrap(),
            documentation_url: None,
            replacement: None,
        }
    }

    #[test]
    fn test_parse_basic_config() {
        let yaml = r#"
connection:
  app_name: pokedex
  app_env: production
sunset_routes:
  - id: legacy-pokemon
    path: /v1/pokemon
    methods: [GET, POST]
    sunset_at: "2030-12-31T23:59:59Z"
    replacement: /v2/pokemon
    documentation_url: https://docs.example.com/migration
"#;
        let config = ConventionsConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.connection.app_name.as_deref(), Some("pokedex"));
        assert_eq!(config.connection.app_env.as_deref(), Some("production"));
        assert!(config.connection.detect_deprecations);
        assert_eq!(config.connection.notifier, NotifierKind::Log);
        assert_eq!(config.sunset_routes.len(), 1);
        assert_eq!(config.sunset_routes[0].methods, vec!["GET", "POST"]);
        assert!(config.metrics.enabled);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = ConventionsConfig::from_yaml("{}").unwrap();
        assert_eq!(config.connection, ConnectionConfig::default());
        assert!(config.sunset_routes.is_empty());
        assert_eq!(config.metrics.prefix, "service_conventions");
    }

    #[test]
    fn test_bundled_default_config_is_valid() {
        let config =
            ConventionsConfig::from_yaml(include_str!("../config/default-config.yaml")).unwrap();
        assert!(config.connection.detect_deprecations);
        assert!(config.sunset_routes.is_empty());
    }

    #[test]
    fn test_notifier_kind() {
        let yaml = r#"
connection:
  app_name: pokedex
  app_env: production
  detect_deprecations: true
  notifier: log
"#;
        let config = ConventionsConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.connection.notifier, NotifierKind::Log);

        let config = ConventionsConfig::from_yaml("connection:\n  notifier: channel\n").unwrap();
        assert_eq!(config.connection.notifier, NotifierKind::Channel);

        assert!(matches!(
            ConventionsConfig::from_yaml("connection:\n  notifier: pager\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_rejects_unknown_fields() {
        let yaml = r#"
connection:
  app_nmae: typo
"#;
        assert!(matches!(
            ConventionsConfig::from_yaml(yaml),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_rejects_empty_app_name() {
        let yaml = r#"
connection:
  app_name: "  "
"#;
        assert!(matches!(
            ConventionsConfig::from_yaml(yaml),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_rejects_duplicate_route_ids() {
        let yaml = r#"
sunset_routes:
  - id: same
    path: /a
    sunset_at: "2030-01-01T00:00:00Z"
  - id: same
    path: /b
    sunset_at: "2030-01-01T00:00:00Z"
"#;
        let err = ConventionsConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_rejects_bad_metrics_prefix() {
        let yaml = r#"
metrics:
  prefix: service-conventions
"#;
        assert!(matches!(
            ConventionsConfig::from_yaml(yaml),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_rejects_bad_glob() {
        let mut bad = route("/v1/[oops", &[]);
        bad.id = "bad".to_string();
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "connection:\n  app_name: pokedex\n  detect_deprecations: false").unwrap();

        let config = ConventionsConfig::from_file(file.path()).unwrap();
        assert_eq!(config.connection.app_name.as_deref(), Some("pokedex"));
        assert!(!config.connection.detect_deprecations);
    }

    #[test]
    fn test_from_missing_file() {
        let result = ConventionsConfig::from_file(Path::new("/nonexistent/conventions.yaml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_method_matching() {
        let r = route("/v1/pokemon", &["GET"]);
        assert!(r.matches_method("GET"));
        assert!(r.matches_method("get"));
        assert!(!r.matches_method("POST"));
        assert!(route("/v1/pokemon", &[]).matches_method("DELETE"));
    }

    #[test]
    fn test_literal_path_matching() {
        let r = route("/v1/pokemon", &[]);
        assert!(r.matches_literal_path("/v1/pokemon"));
        assert!(r.matches_literal_path("/v1/pokemon/25"));
        assert!(!r.matches_literal_path("/v1/pokemonx"));
        assert!(!r.matches_literal_path("/v2/pokemon"));
    }

    #[test]
    fn test_shared_config_store_is_visible() {
        let shared = SharedConfig::default();
        let source = ConfigSource::from(shared.clone());
        assert_eq!(source.snapshot().app_name, None);

        shared.store(ConnectionConfig {
            app_name: Some("pokedex".to_string()),
            ..ConnectionConfig::default()
        });
        assert_eq!(source.snapshot().app_name.as_deref(), Some("pokedex"));
    }

    #[test]
    fn test_snapshot_is_stable_across_store() {
        let shared = SharedConfig::new(ConnectionConfig {
            app_env: Some("staging".to_string()),
            ..ConnectionConfig::default()
        });
        let before = shared.load();
        shared.store(ConnectionConfig::default());
        assert_eq!(before.app_env.as_deref(), Some("staging"));
        assert_eq!(shared.load().app_env, None);
    }
}
