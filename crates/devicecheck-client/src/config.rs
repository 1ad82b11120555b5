//! Client configuration

use chrono::Duration;
use devicecheck_core::{credential, DeviceCheckError, KeySource, Result};
use std::time::Duration as StdDuration;

const PRODUCTION_URL: &str = "https://api.devicecheck.apple.com";
const DEVELOPMENT_URL: &str = "https://api.development.devicecheck.apple.com";

/// Apple environment the client talks to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Environment {
    /// Sandbox, for development builds and simulators
    Development,
    /// Production
    #[default]
    Production,
}

impl Environment {
    /// Base URL of the DeviceCheck API in this environment
    pub fn base_url(&self) -> &'static str {
        match self {
            Environment::Development => DEVELOPMENT_URL,
            Environment::Production => PRODUCTION_URL,
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Production => write!(f, "production"),
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" | "sandbox" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            _ => Err(format!("Unknown environment: {}", s)),
        }
    }
}

/// Configuration for a DeviceCheck client
///
/// Fixed at construction; the client never mutates it.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Apple developer team identifier
    pub team_id: String,
    /// Bundle identifier of the app whose devices are checked
    pub bundle_id: String,
    /// Identifier of the DeviceCheck key
    pub key_id: String,
    /// Where to load the `.p8` key from
    pub private_key: KeySource,
    /// Sandbox or production
    pub environment: Environment,
    /// Escalate failed responses to errors
    pub raise_on_error: bool,
    /// Upper bound for a single request, including the body
    pub request_timeout: StdDuration,
    /// Lifetime of minted credentials
    pub credential_lifetime: Duration,
    /// Credentials are replaced this long before they expire
    pub refresh_margin: Duration,
    /// Replaces the environment's base URL (proxies, test doubles)
    pub base_url: Option<String>,
}

impl ClientConfig {
    /// Create a production configuration with default timings
    pub fn new(
        team_id: impl Into<String>,
        bundle_id: impl Into<String>,
        key_id: impl Into<String>,
        private_key: KeySource,
    ) -> Self {
        Self {
            team_id: team_id.into(),
            bundle_id: bundle_id.into(),
            key_id: key_id.into(),
            private_key,
            environment: Environment::default(),
            raise_on_error: false,
            request_timeout: StdDuration::from_secs(10),
            credential_lifetime: credential::default_credential_lifetime(),
            refresh_margin: credential::default_refresh_margin(),
            base_url: None,
        }
    }

    /// Select the Apple environment
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Escalate failed responses to errors
    pub fn with_raise_on_error(mut self, raise_on_error: bool) -> Self {
        self.raise_on_error = raise_on_error;
        self
    }

    /// Set the request timeout
    pub fn with_request_timeout(mut self, timeout: StdDuration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set credential lifetime and refresh margin
    pub fn with_credential_lifetime(mut self, lifetime: Duration, refresh_margin: Duration) -> Self {
        self.credential_lifetime = lifetime;
        self.refresh_margin = refresh_margin;
        self
    }

    /// Send requests to `base_url` instead of Apple
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Base URL requests are sent to, without a trailing slash
    pub fn endpoint(&self) -> String {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.environment.base_url())
            .trim_end_matches('/')
            .to_string()
    }

    /// Load configuration from `DEVICECHECK_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |name: &str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| DeviceCheckError::Config(format!("{} must be set", name)))
        };

        let mut config = Self::new(
            required("DEVICECHECK_TEAM_ID")?,
            required("DEVICECHECK_BUNDLE_ID")?,
            required("DEVICECHECK_KEY_ID")?,
            KeySource::detect(required("DEVICECHECK_PRIVATE_KEY")?),
        );

        if let Some(environment) = lookup("DEVICECHECK_ENVIRONMENT") {
            config.environment = environment.parse().map_err(DeviceCheckError::Config)?;
        }

        if let Some(raise) = lookup("DEVICECHECK_RAISE_ON_ERROR") {
            config.raise_on_error = raise.eq_ignore_ascii_case("true");
        }

        if let Some(timeout) = lookup("DEVICECHECK_TIMEOUT_SECS") {
            let secs: u64 = timeout.parse().map_err(|_| {
                DeviceCheckError::Config(format!(
                    "DEVICECHECK_TIMEOUT_SECS must be a number of seconds, got '{}'",
                    timeout
                ))
            })?;
            config.request_timeout = StdDuration::from_secs(secs);
        }

        config.base_url = lookup("DEVICECHECK_BASE_URL");

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    const REQUIRED: [(&str, &str); 4] = [
        ("DEVICECHECK_TEAM_ID", "XX7AN23E0Z"),
        ("DEVICECHECK_BUNDLE_ID", "com.example.app"),
        ("DEVICECHECK_KEY_ID", "TESTKEY01"),
        ("DEVICECHECK_PRIVATE_KEY", "AuthKey_TESTKEY01.p8"),
    ];

    #[test]
    fn test_environment_parsing() {
        assert_eq!("dev".parse::<Environment>().unwrap(), Environment::Development);
        assert_eq!("Sandbox".parse::<Environment>().unwrap(), Environment::Development);
        assert_eq!("production".parse::<Environment>().unwrap(), Environment::Production);
        assert!("staging".parse::<Environment>().is_err());
    }

    #[test]
    fn test_endpoint_selection() {
        let config = ClientConfig::new("T", "B", "K", KeySource::detect("AuthKey_K.p8"));
        assert_eq!(config.endpoint(), "https://api.devicecheck.apple.com");

        let config = config.with_environment(Environment::Development);
        assert_eq!(config.endpoint(), "https://api.development.devicecheck.apple.com");

        let config = config.with_base_url("http://127.0.0.1:9000/");
        assert_eq!(config.endpoint(), "http://127.0.0.1:9000");
    }

    #[test]
    fn test_from_lookup_defaults() {
        let config = ClientConfig::from_lookup(lookup(&REQUIRED)).unwrap();
        assert_eq!(config.team_id, "XX7AN23E0Z");
        assert_eq!(config.environment, Environment::Production);
        assert!(!config.raise_on_error);
        assert_eq!(config.request_timeout, StdDuration::from_secs(10));
        assert_eq!(
            config.private_key,
            KeySource::Path("AuthKey_TESTKEY01.p8".into())
        );
    }

    #[test]
    fn test_from_lookup_overrides() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("DEVICECHECK_ENVIRONMENT", "development"));
        vars.push(("DEVICECHECK_RAISE_ON_ERROR", "TRUE"));
        vars.push(("DEVICECHECK_TIMEOUT_SECS", "3"));

        let config = ClientConfig::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(config.environment, Environment::Development);
        assert!(config.raise_on_error);
        assert_eq!(config.request_timeout, StdDuration::from_secs(3));
    }

    #[test]
    fn test_from_lookup_missing_required() {
        let err = ClientConfig::from_lookup(lookup(&REQUIRED[..3])).unwrap_err();
        assert_eq!(
            err,
            DeviceCheckError::Config("DEVICECHECK_PRIVATE_KEY must be set".into())
        );
    }

    #[test]
    fn test_from_lookup_bad_timeout() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("DEVICECHECK_TIMEOUT_SECS", "soon"));
        assert!(matches!(
            ClientConfig::from_lookup(lookup(&vars)),
            Err(DeviceCheckError::Config(_))
        ));
    }
}
