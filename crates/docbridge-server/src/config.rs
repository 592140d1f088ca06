//! Process configuration.
//!
//! Loaded from a TOML or JSON file, then overridden from `DOCBRIDGE_*`
//! environment variables, then validated.

use std::path::PathBuf;
use std::time::Duration;

use docbridge_client::BackendConfig;
use docbridge_core::duration::parse_duration;
use docbridge_core::{Credential, Profile};
use docbridge_ingest::IngestConfig;
use docbridge_sessions::SessionPoolConfig;
use docbridge_telemetry::TelemetryConfig;
use indexmap::IndexMap;
use serde::Deserialize;

use crate::error::{ServerError, ServerResult};

/// Everything the bridge process needs at start-up.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Inbound listener.
    pub server: ServerSettings,
    /// Document store endpoint and OAuth client.
    pub backend: BackendConfig,
    /// Session refresh and release timing.
    pub sessions: SessionPoolConfig,
    /// Document creation settings.
    pub ingest: IngestConfig,
    /// Inbound client authentication.
    pub auth: AuthSettings,
    /// Service accounts, by profile name.
    pub profiles: IndexMap<String, Credential>,
    /// Logging and metrics.
    pub telemetry: TelemetryConfig,
}

impl BridgeConfig {
    /// Load configuration from a `.toml` or `.json` file.
    pub fn from_file(path: impl Into<PathBuf>) -> ServerResult<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| ServerError::config(format!("failed to read config file: {e}")))?;

        let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");
        match extension {
            "toml" => toml::from_str(&content)
                .map_err(|e| ServerError::config(format!("invalid TOML: {e}"))),
            "json" => serde_json::from_str(&content)
                .map_err(|e| ServerError::config(format!("invalid JSON: {e}"))),
            _ => Err(ServerError::config(format!(
                "unsupported config format: {extension}"
            ))),
        }
    }

    /// Apply `DOCBRIDGE_*` environment overrides.
    ///
    /// Unparsable values are ignored and the file value kept.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup.
    #[must_use]
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| lookup(&format!("DOCBRIDGE_{name}"));

        if let Some(addr) = var("LISTEN_ADDR") {
            self.server.listen_addr = addr;
        }
        if let Some(port) = var("LISTEN_PORT").and_then(|p| p.parse().ok()) {
            self.server.listen_port = port;
        }
        if let Some(url) = var("BACKEND_URL") {
            self.backend.base_url = url;
        }
        if let Some(tenant) = var("BACKEND_TENANT") {
            self.backend.tenant = tenant;
        }
        if let Some(id) = var("BACKEND_CLIENT_ID") {
            self.backend.client_id = id;
        }
        if let Some(secret) = var("BACKEND_CLIENT_SECRET") {
            self.backend.client_secret = secret;
        }
        if let Some(period) = var("REFRESH_PERIOD").and_then(|p| parse_duration(&p).ok()) {
            self.sessions.refresh_period = period;
        }
        if let Some(grace) = var("RELEASE_GRACE").and_then(|g| parse_duration(&g).ok()) {
            self.sessions.release_grace = grace;
        }
        if let Some(type_id) = var("PROVISIONAL_TYPE_ID") {
            self.ingest.provisional_type_id = type_id;
        }
        if let Some(username) = var("AUTH_USERNAME") {
            self.auth.username = Some(username);
        }
        if let Some(password) = var("AUTH_PASSWORD") {
            self.auth.password = Some(password);
        }
        if let Some(level) = var("LOG_LEVEL") {
            self.telemetry.log_level = level;
        }

        self
    }

    /// Check every section.
    pub fn validate(&self) -> ServerResult<()> {
        self.server.validate()?;
        self.backend.validate()?;
        self.sessions.validate()?;
        self.ingest.validate()?;
        self.auth.validate()?;
        self.telemetry
            .validate()
            .map_err(|e| ServerError::config(e.to_string()))?;

        if self.profiles.is_empty() {
            return Err(ServerError::config("at least one profile is required"));
        }
        for (name, credential) in &self.profiles {
            if name.trim().is_empty() {
                return Err(ServerError::config("profile names must not be empty"));
            }
            if credential.username.is_empty() || credential.password.is_empty() {
                return Err(ServerError::config(format!(
                    "profile '{name}' needs a username and password"
                )));
            }
        }
        Ok(())
    }

    /// The configured service accounts.
    pub fn profiles(&self) -> Vec<Profile> {
        self.profiles
            .iter()
            .map(|(name, credential)| Profile::new(name.clone(), credential.clone()))
            .collect()
    }
}

/// Inbound listener settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Address to bind to.
    pub listen_addr: String,
    /// Port to listen on.
    pub listen_port: u16,
    /// Largest request body accepted, in bytes.
    pub max_body_size: usize,
    /// How long shutdown waits for in-flight requests and background work.
    #[serde(with = "docbridge_core::duration")]
    pub shutdown_grace: Duration,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0".to_string(),
            listen_port: 8080,
            // payload limit plus multipart framing and attributes
            max_body_size: 101 * 1024 * 1024,
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

impl ServerSettings {
    fn validate(&self) -> ServerResult<()> {
        if self.listen_addr.parse::<std::net::IpAddr>().is_err() {
            return Err(ServerError::config(format!(
                "invalid listen address: {}",
                self.listen_addr
            )));
        }
        if self.max_body_size == 0 {
            return Err(ServerError::config("max_body_size must be positive"));
        }
        Ok(())
    }
}

/// Basic authentication of inbound clients. Disabled unless both fields
/// are set.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// Expected username.
    pub username: Option<String>,
    /// Expected password.
    pub password: Option<String>,
}

impl AuthSettings {
    /// The expected credential, when authentication is on.
    pub fn credential(&self) -> Option<Credential> {
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => Some(Credential::new(username, password)),
            _ => None,
        }
    }

    fn validate(&self) -> ServerResult<()> {
        match (&self.username, &self.password) {
            (Some(_), None) | (None, Some(_)) => Err(ServerError::config(
                "auth needs both username and password, or neither",
            )),
            (Some(username), Some(_)) if username.contains(':') => {
                Err(ServerError::config("auth username must not contain ':'"))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SAMPLE: &str = r#"
[server]
listen_port = 9000
shutdown_grace = "5s"

[backend]
base_url = "https://docs.example.com"
tenant = "acme"
client_id = "bridge"
client_secret = "s3cret"

[backend.timeouts]
upload = "5m"

[sessions]
refresh_period = "12h"
release_grace = "10s"

[ingest]
provisional_type_id = "900"
index_key_type_id = "77"
allowed_extensions = ["pdf", "TIFF"]

[auth]
username = "gateway"
password = "gw-pass"

[profiles.ops]
username = "ops-svc"
password = "ops-pw"

[profiles.finance]
username = "fin-svc"
password = "fin-pw"

[telemetry]
log_level = "debug"
"#;

    fn sample() -> BridgeConfig {
        toml::from_str(SAMPLE).unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert_eq!(config.server.listen_port, 8080);
        assert_eq!(config.sessions.refresh_period, Duration::from_secs(24 * 3600));
        assert_eq!(config.backend.sticky_cookie, "FB_LB");
        assert!(config.auth.credential().is_none());
        // no profiles and no provisional type
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_config() {
        let config = sample();
        assert_eq!(config.server.listen_port, 9000);
        assert_eq!(config.server.shutdown_grace, Duration::from_secs(5));
        assert_eq!(config.backend.timeouts.upload, Duration::from_secs(300));
        assert_eq!(config.sessions.refresh_period, Duration::from_secs(12 * 3600));
        assert_eq!(config.ingest.index_key_type_id.as_deref(), Some("77"));
        assert_eq!(config.telemetry.log_level, "debug");
        tokio_test::assert_ok!(config.validate());

        let names: Vec<_> = config.profiles().iter().map(|p| p.name().to_string()).collect();
        assert_eq!(names, ["ops", "finance"]);
        assert_eq!(config.auth.credential().unwrap().username, "gateway");
    }

    #[test]
    fn test_json_matches_toml() {
        let json = r#"{
            "backend": {"base_url": "https://docs.example.com", "client_id": "bridge"},
            "ingest": {"provisional_type_id": "900"},
            "profiles": {"ops": {"username": "ops-svc", "password": "ops-pw"}}
        }"#;
        let config: BridgeConfig = serde_json::from_str(json).unwrap();
        tokio_test::assert_ok!(config.validate());
        assert_eq!(config.profiles().len(), 1);
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("DOCBRIDGE_LISTEN_PORT", "7000"),
            ("DOCBRIDGE_BACKEND_URL", "https://other.example.com"),
            ("DOCBRIDGE_RELEASE_GRACE", "2s"),
            ("DOCBRIDGE_REFRESH_PERIOD", "soon"),
            ("DOCBRIDGE_LOG_LEVEL", "warn"),
        ]
        .into_iter()
        .collect();

        let config = sample().with_overrides(|key| vars.get(key).map(ToString::to_string));
        assert_eq!(config.server.listen_port, 7000);
        assert_eq!(config.backend.base_url, "https://other.example.com");
        assert_eq!(config.sessions.release_grace, Duration::from_secs(2));
        // unparsable value keeps the file's
        assert_eq!(config.sessions.refresh_period, Duration::from_secs(12 * 3600));
        assert_eq!(config.telemetry.log_level, "warn");
    }

    #[test]
    fn test_validation_failures() {
        let mut config = sample();
        config.auth.password = None;
        assert!(config.validate().is_err());

        let mut config = sample();
        config.profiles.insert(
            "empty".to_string(),
            Credential::new("someone", ""),
        );
        assert!(config.validate().is_err());

        let mut config = sample();
        config.server.listen_addr = "not-an-ip".to_string();
        assert!(config.validate().is_err());

        let mut config = sample();
        config.profiles.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unsupported_extension() {
        let err = BridgeConfig::from_file("/etc/docbridge/config.yaml").unwrap_err();
        assert!(err.to_string().contains("config"));
    }
}
