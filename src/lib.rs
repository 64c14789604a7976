//! Service Conventions
//!
//! A convention layer for service-to-service HTTP calls. Every connection
//! built here identifies its caller and bounds its requests in time, and
//! every response is checked for an announced sunset.
//!
//! # Features
//!
//! - **Validated Connections**: host, application name, environment and
//!   timeout are required before a client exists
//! - **Caller Identity**: `User-Agent`, `X-App-Name` and `X-App-Env` on
//!   every request
//! - **Deprecation Detection**: RFC 8594 `Sunset` headers reported through
//!   a pluggable notifier
//! - **Server Middleware**: tower layers for logging callers and announcing
//!   sunset routes
//!
//! # Example
//!
//! ```no_run
//! use service_conventions::{ConnectionConfig, ConnectionFactory, ConnectionParams};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let factory = ConnectionFactory::new(ConnectionConfig {
//!     app_name: Some("pokedex".to_string()),
//!     ..ConnectionConfig::default()
//! });
//!
//! let connection = factory.create(
//!     ConnectionParams::new("http://pokemon.internal")
//!         .environment("production")
//!         .timeout(5.0),
//! )?;
//!
//! let response = connection.get("/pokemon/25").await?;
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod config;
pub mod connection;
pub mod deprecation;
pub mod error;
pub mod factory;
pub mod headers;
pub mod metrics;
pub mod probe;
pub mod server;

pub use config::{
    ConfigSource, ConnectionConfig, ConventionsConfig, NotifierKind, SharedConfig, SunsetRoute,
};
pub use connection::{Connection, ConnectionBuilder};
pub use deprecation::{
    ChannelNotifier, DeprecationDetector, DeprecationWarning, Notifier, TracingNotifier,
};
pub use error::{ConfigError, ConnectionError, RequestError};
pub use factory::{ConnectionFactory, ConnectionParams, DEFAULT_OPEN_TIMEOUT_SECS};
pub use probe::{EnvVarProbe, EnvironmentProbe, NoProbe, StaticProbe};
pub use server::{CallerLogLayer, SunsetLayer, SunsetRoutes};
