//! Backend connection settings.

use std::time::Duration;

use docbridge_core::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};

/// Where the document store lives and how to talk to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Scheme and host, e.g. `https://docs.example.com`.
    pub base_url: String,
    /// Path segment of the API application.
    pub api_server: String,
    /// Path segment of the identity provider application.
    pub idp_server: String,
    /// Tenant sent with token requests.
    pub tenant: String,
    /// OAuth client id.
    pub client_id: String,
    /// OAuth client secret.
    pub client_secret: String,
    /// Scopes requested at login. Must allow refresh tokens.
    pub scope: String,
    /// Name of the load-balancer affinity cookie.
    pub sticky_cookie: String,
    /// Per-call-class timeouts.
    pub timeouts: CallTimeouts,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            api_server: "api".to_string(),
            idp_server: "idp".to_string(),
            tenant: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            scope: "evolution offline_access".to_string(),
            sticky_cookie: "FB_LB".to_string(),
            timeouts: CallTimeouts::default(),
        }
    }
}

impl BackendConfig {
    /// Check the settings are usable.
    pub fn validate(&self) -> CoreResult<()> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(CoreError::validation_with_field(
                "backend base_url must start with http:// or https://",
                "backend.base_url",
            ));
        }
        if self.client_id.is_empty() {
            return Err(CoreError::validation_with_field(
                "backend client_id is required",
                "backend.client_id",
            ));
        }
        if self.sticky_cookie.is_empty() {
            return Err(CoreError::validation_with_field(
                "backend sticky_cookie must not be empty",
                "backend.sticky_cookie",
            ));
        }
        Ok(())
    }

    fn root(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    pub(crate) fn idp_url(&self, path: &str) -> String {
        format!("{}/app/{}/{}", self.root(), self.idp_server, path)
    }

    pub(crate) fn core_url(&self, path: &str) -> String {
        format!("{}/app/{}/onbase/core/{}", self.root(), self.api_server, path)
    }

    pub(crate) fn health_url(&self) -> String {
        format!("{}/app/{}/onbase/workflow/healthcheck", self.root(), self.api_server)
    }
}

/// Timeouts per class of backend call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallTimeouts {
    /// TCP connect.
    #[serde(with = "docbridge_core::duration")]
    pub connect: Duration,
    /// Token and revocation calls.
    #[serde(with = "docbridge_core::duration")]
    pub auth: Duration,
    /// Metadata reads and small writes.
    #[serde(with = "docbridge_core::duration")]
    pub metadata: Duration,
    /// One part upload.
    #[serde(with = "docbridge_core::duration")]
    pub upload: Duration,
    /// Archive and re-index.
    #[serde(with = "docbridge_core::duration")]
    pub archive: Duration,
}

impl Default for CallTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(5),
            auth: Duration::from_secs(15),
            metadata: Duration::from_secs(15),
            upload: Duration::from_secs(120),
            archive: Duration::from_secs(60),
        }
    }
}

/// Which timeout applies to a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CallClass {
    Auth,
    Metadata,
    Upload,
    Archive,
}

impl CallTimeouts {
    pub(crate) fn for_class(&self, class: CallClass) -> Duration {
        match class {
            CallClass::Auth => self.auth,
            CallClass::Metadata => self.metadata,
            CallClass::Upload => self.upload,
            CallClass::Archive => self.archive,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BackendConfig {
        BackendConfig {
            base_url: "https://docs.example.com/".to_string(),
            api_server: "AppServer".to_string(),
            idp_server: "IdP".to_string(),
            client_id: "bridge".to_string(),
            ..BackendConfig::default()
        }
    }

    #[test]
    fn test_urls() {
        let config = config();
        assert_eq!(
            config.idp_url("connect/token"),
            "https://docs.example.com/app/IdP/connect/token"
        );
        assert_eq!(
            config.core_url("documents/uploads"),
            "https://docs.example.com/app/AppServer/onbase/core/documents/uploads"
        );
        assert_eq!(
            config.health_url(),
            "https://docs.example.com/app/AppServer/onbase/workflow/healthcheck"
        );
    }

    #[test]
    fn test_validate() {
        assert!(config().validate().is_ok());

        let mut bad = config();
        bad.base_url = "docs.example.com".to_string();
        assert!(bad.validate().is_err());

        let mut bad = config();
        bad.client_id.clear();
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_timeouts_from_json() {
        let timeouts: CallTimeouts =
            serde_json::from_str(r#"{"upload": "5m", "metadata": "750ms"}"#).unwrap();
        assert_eq!(timeouts.upload, Duration::from_secs(300));
        assert_eq!(timeouts.metadata, Duration::from_millis(750));
        assert_eq!(timeouts.auth, CallTimeouts::default().auth);
        assert_eq!(timeouts.for_class(CallClass::Upload), Duration::from_secs(300));
    }
}
