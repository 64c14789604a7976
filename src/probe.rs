//! Best-effort detection of the caller's identity from the host environment.
//!
//! The factory only asks a probe for "a value or nothing"; how the value is
//! found stays at the edge.

/// Source of last-resort defaults for the application name and environment.
pub trait EnvironmentProbe: Send + Sync {
    fn detect_app_name(&self) -> Option<String>;

    fn detect_environment(&self) -> Option<String>;
}

/// Probe that never detects anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProbe;

impl EnvironmentProbe for NoProbe {
    fn detect_app_name(&self) -> Option<String> {
        None
    }

    fn detect_environment(&self) -> Option<String> {
        None
    }
}

/// Probe returning fixed values.
#[derive(Debug, Clone, Default)]
pub struct StaticProbe {
    pub app_name: Option<String>,
    pub environment: Option<String>,
}

impl StaticProbe {
    pub fn new(app_name: Option<&str>, environment: Option<&str>) -> Self {
        Self {
            app_name: app_name.map(str::to_string),
            environment: environment.map(str::to_string),
        }
    }
}

impl EnvironmentProbe for StaticProbe {
    fn detect_app_name(&self) -> Option<String> {
        self.app_name.clone()
    }

    fn detect_environment(&self) -> Option<String> {
        self.environment.clone()
    }
}

/// Probe reading process environment variables, first non-empty wins.
#[derive(Debug, Clone)]
pub struct EnvVarProbe {
    app_name_vars: Vec<String>,
    environment_vars: Vec<String>,
}

impl EnvVarProbe {
    /// Variables consulted for the application name by default.
    pub const APP_NAME_VARS: &'static [&'static str] = &["APP_NAME", "SERVICE_NAME"];

    /// Variables consulted for the environment by default.
    pub const ENVIRONMENT_VARS: &'static [&'static str] =
        &["APP_ENV", "RAILS_ENV", "RACK_ENV", "ENVIRONMENT"];

    /// Probe with an explicit list of variables for each value.
    pub fn with_vars<A, E>(app_name_vars: A, environment_vars: E) -> Self
    where
        A: IntoIterator,
        A::Item: Into<String>,
        E: IntoIterator,
        E::Item: Into<String>,
    {
        Self {
            app_name_vars: app_name_vars.into_iter().map(Into::into).collect(),
            environment_vars: environment_vars.into_iter().map(Into::into).collect(),
        }
    }

    fn first_set(vars: &[String]) -> Option<String> {
        vars.iter().find_map(|name| {
            std::env::var(name)
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        })
    }
}

impl Default for EnvVarProbe {
    fn default() -> Self {
        Self::with_vars(
            Self::APP_NAME_VARS.iter().copied(),
            Self::ENVIRONMENT_VARS.iter().copied(),
        )
    }
}

impl EnvironmentProbe for EnvVarProbe {
    fn detect_app_name(&self) -> Option<String> {
        Self::first_set(&self.app_name_vars)
    }

    fn detect_environment(&self) -> Option<String> {
        Self::first_set(&self.environment_vars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_probe() {
        assert_eq!(NoProbe.detect_app_name(), None);
        assert_eq!(NoProbe.detect_environment(), None);
    }

    #[test]
    fn test_static_probe() {
        let probe = StaticProbe::new(Some("pokedex"), None);
        assert_eq!(probe.detect_app_name().as_deref(), Some("pokedex"));
        assert_eq!(probe.detect_environment(), None);
    }

    #[test]
    fn test_env_var_probe_first_non_empty_wins() {
        // Variable names are unique to this test so parallel tests don't interfere
        std::env::set_var("SC_PROBE_TEST_EMPTY", "  ");
        std::env::set_var("SC_PROBE_TEST_ENV", "staging");
        std::env::remove_var("SC_PROBE_TEST_UNSET");

        let probe = EnvVarProbe::with_vars(
            ["SC_PROBE_TEST_UNSET"],
            ["SC_PROBE_TEST_UNSET", "SC_PROBE_TEST_EMPTY", "SC_PROBE_TEST_ENV"],
        );
        assert_eq!(probe.detect_app_name(), None);
        assert_eq!(probe.detect_environment().as_deref(), Some("staging"));
    }

    #[test]
    fn test_env_var_probe_defaults() {
        let probe = EnvVarProbe::default();
        assert_eq!(probe.app_name_vars, vec!["APP_NAME", "SERVICE_NAME"]);
        assert_eq!(probe.environment_vars[0], "APP_ENV");
    }
}
