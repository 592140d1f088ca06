//! Profile, session and connection types.
//!
//! A [`Profile`] names a service account. Logging in with its
//! [`Credential`] yields a [`SessionHandle`], which mints short-lived
//! [`Connection`]s without resending the password. Every backend call also
//! carries a [`StickyToken`] that pins the conversation to one backend node.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Username and password of a service account.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Account name.
    pub username: String,
    /// Account password.
    pub password: String,
}

impl Credential {
    /// Create a credential.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A named service account.
///
/// Immutable once loaded; the set of profile names is fixed at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    name: String,
    credential: Credential,
}

impl Profile {
    /// Create a profile.
    pub fn new(name: impl Into<String>, credential: Credential) -> Self {
        Self {
            name: name.into(),
            credential,
        }
    }

    /// Profile name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Login credential.
    pub fn credential(&self) -> &Credential {
        &self.credential
    }
}

/// Backend-issued reusable login artifact.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SessionHandle(String);

impl SessionHandle {
    /// Wrap a raw handle.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Raw handle value, for the wire only.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Short non-secret prefix for logs.
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.0)
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionHandle({})", self.fingerprint())
    }
}

/// Bearer token for a single connection.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    /// Wrap a raw token.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Raw token value, for the wire only.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccessToken({})", fingerprint(&self.0))
    }
}

/// Load-balancer affinity token threaded through one call chain.
///
/// Empty until the backend issues one. Each call must present the token
/// returned by the call before it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct StickyToken(String);

impl StickyToken {
    /// Wrap a raw token.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The token before the backend has issued one.
    pub fn none() -> Self {
        Self::default()
    }

    /// Whether no token has been issued yet.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Raw token value.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Keep `self` unless the backend sent a replacement.
    #[must_use]
    pub fn or_previous(self, previous: &StickyToken) -> Self {
        if self.is_empty() {
            previous.clone()
        } else {
            self
        }
    }
}

impl fmt::Display for StickyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The current backend session for one profile.
///
/// Owned by the session pool; callers only ever see [`Connection`]s.
#[derive(Debug, Clone)]
pub struct Session {
    /// Profile the session belongs to.
    pub profile: String,
    /// Reusable login handle.
    pub handle: SessionHandle,
    /// When the credential login happened.
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Create a session stamped with the current time.
    pub fn new(profile: impl Into<String>, handle: SessionHandle) -> Self {
        Self {
            profile: profile.into(),
            handle,
            created_at: Utc::now(),
        }
    }

    /// Time since the credential login.
    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.created_at
    }
}

/// A live connection borrowed for the duration of one operation.
#[derive(Debug, Clone)]
pub struct Connection {
    /// Profile the connection was minted for.
    pub profile: String,
    /// Bearer token.
    pub token: AccessToken,
    /// Sticky token returned by the call that minted the connection.
    pub sticky: StickyToken,
}

fn fingerprint(raw: &str) -> String {
    let prefix: String = raw.chars().take(6).collect();
    if raw.chars().count() > 6 {
        format!("{prefix}…")
    } else {
        prefix
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_debug_redacts_password() {
        let cred = Credential::new("svc-ops", "s3cret");
        let debug = format!("{cred:?}");
        assert!(debug.contains("svc-ops"));
        assert!(!debug.contains("s3cret"));
    }

    #[test]
    fn test_handle_debug_shows_fingerprint_only() {
        let handle = SessionHandle::new("abcdefghijklmnop");
        let debug = format!("{handle:?}");
        assert!(debug.contains("abcdef"));
        assert!(!debug.contains("ghijkl"));
        assert_eq!(handle.expose(), "abcdefghijklmnop");
    }

    #[test]
    fn test_sticky_or_previous() {
        let previous = StickyToken::new("lb-1");
        assert_eq!(StickyToken::none().or_previous(&previous), previous);
        assert_eq!(
            StickyToken::new("lb-2").or_previous(&previous),
            StickyToken::new("lb-2")
        );
    }

    #[test]
    fn test_profile_accessors() {
        let profile = Profile::new("ops", Credential::new("svc-ops", "pw"));
        assert_eq!(profile.name(), "ops");
        assert_eq!(profile.credential().username, "svc-ops");
    }
}
