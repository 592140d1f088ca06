//! The per-profile session pool.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use docbridge_core::{Connection, CoreError, CoreResult, DocumentStore, Profile, Session};
use docbridge_tasks::{JobId, Scheduler, SharedSpawner, SpawnerConfig, TaskResult};
use futures_util::{stream, StreamExt};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::SessionPoolConfig;

/// One profile's current session.
///
/// The lock only guards the pointer; it is never held across an await.
#[derive(Debug)]
struct ProfileSlot {
    profile: Profile,
    current: RwLock<Option<Arc<Session>>>,
}

impl ProfileSlot {
    fn current(&self) -> Option<Arc<Session>> {
        self.current.read().clone()
    }

    /// Install `fresh` if the slot still holds `observed`.
    ///
    /// Checked under the write lock so a concurrent dispose either sees the
    /// new session or makes the install fail.
    fn install_if(&self, observed: Option<&Arc<Session>>, fresh: Arc<Session>, disposed: &AtomicBool) -> Install {
        let mut current = self.current.write();
        if disposed.load(Ordering::Acquire) {
            return Install::Closed;
        }
        match (current.as_ref(), observed) {
            (Some(now), Some(seen)) if Arc::ptr_eq(now, seen) => Install::Installed(current.replace(fresh)),
            (None, None) => Install::Installed(current.replace(fresh)),
            // emptied by dispose
            (None, Some(_)) => Install::Closed,
            // a concurrent login already replaced it
            (Some(now), _) => Install::Lost(Arc::clone(now)),
        }
    }

    /// Install `fresh` unconditionally unless the pool is disposed.
    fn replace(&self, fresh: Arc<Session>, disposed: &AtomicBool) -> Install {
        let mut current = self.current.write();
        if disposed.load(Ordering::Acquire) {
            return Install::Closed;
        }
        Install::Installed(current.replace(fresh))
    }
}

/// Outcome of putting a fresh session into a slot.
#[derive(Debug)]
enum Install {
    /// Installed; carries the displaced session.
    Installed(Option<Arc<Session>>),
    /// Another login got there first; carries its session.
    Lost(Arc<Session>),
    /// The pool was disposed; the caller still owns the fresh session.
    Closed,
}

/// Counts from one [`SessionPool::refresh_all`] run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    /// Profiles now holding a fresh session.
    pub refreshed: usize,
    /// Profiles whose login failed and kept their previous session.
    pub failed: usize,
}

/// Point-in-time view of one profile, for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileStatus {
    /// Profile name.
    pub profile: String,
    /// Whether a session handle is currently held.
    pub connected: bool,
    /// Seconds since the current session logged in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_age_secs: Option<i64>,
}

/// Holds one backend session per configured profile.
///
/// The set of profiles is fixed at construction. [`borrow`](Self::borrow)
/// mints a connection from the current session; [`refresh_all`](Self::refresh_all)
/// swaps in new sessions and releases the old ones after a grace delay.
pub struct SessionPool<S> {
    store: Arc<S>,
    slots: HashMap<String, Arc<ProfileSlot>>,
    config: SessionPoolConfig,
    releases: SharedSpawner,
    disposed: AtomicBool,
}

impl<S> std::fmt::Debug for SessionPool<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionPool")
            .field("profiles", &self.slots.keys().collect::<Vec<_>>())
            .field("config", &self.config)
            .field("disposed", &self.disposed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl<S: DocumentStore> SessionPool<S> {
    /// Create a pool with no sessions yet.
    ///
    /// Profile names must be unique.
    pub fn new(
        store: Arc<S>,
        profiles: impl IntoIterator<Item = Profile>,
        config: SessionPoolConfig,
    ) -> CoreResult<Self> {
        config.validate()?;

        let mut slots = HashMap::new();
        for profile in profiles {
            let name = profile.name().to_string();
            let slot = Arc::new(ProfileSlot {
                profile,
                current: RwLock::new(None),
            });
            if slots.insert(name.clone(), slot).is_some() {
                return Err(CoreError::validation_with_field(
                    format!("duplicate profile '{name}'"),
                    "profiles",
                ));
            }
        }

        let releases = SharedSpawner::with_config(
            SpawnerConfig::new().with_default_timeout(Duration::from_secs(60)),
        );

        Ok(Self {
            store,
            slots,
            config,
            releases,
            disposed: AtomicBool::new(false),
        })
    }

    /// The settings this pool runs with.
    pub fn config(&self) -> &SessionPoolConfig {
        &self.config
    }

    /// Whether `name` is a configured profile.
    pub fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    /// Configured profile names, sorted.
    pub fn profile_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.slots.keys().cloned().collect();
        names.sort();
        names
    }

    /// Whether [`dispose`](Self::dispose) has run.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Per-profile session state, sorted by name.
    pub fn status(&self) -> Vec<ProfileStatus> {
        let mut status: Vec<ProfileStatus> = self
            .slots
            .iter()
            .map(|(name, slot)| {
                let current = slot.current();
                ProfileStatus {
                    profile: name.clone(),
                    connected: current.is_some(),
                    session_age_secs: current.map(|s| s.age().num_seconds()),
                }
            })
            .collect();
        status.sort_by(|a, b| a.profile.cmp(&b.profile));
        status
    }

    /// Get a connection for `profile`.
    ///
    /// Mints it from the current session. When there is none, or the backend
    /// reports it expired, logs in again with the profile's credential and
    /// retries once. Any other failure is returned as is.
    pub async fn borrow(&self, profile: &str) -> CoreResult<Connection> {
        let slot = self
            .slots
            .get(profile)
            .ok_or_else(|| CoreError::profile_not_found(profile))?;
        if self.is_disposed() {
            return Err(disposed_error(profile));
        }

        let observed = slot.current();
        if let Some(session) = &observed {
            match self.connect(session).await {
                Ok(connection) => return Ok(connection),
                Err(CoreError::SessionExpired { message }) => warn!(
                    profile,
                    handle = %session.handle.fingerprint(),
                    reason = %message,
                    "session expired, logging in again"
                ),
                Err(e) => return Err(e),
            }
        }

        let fresh = self
            .login(&slot.profile)
            .await
            .map_err(|e| CoreError::session_unavailable(profile, e.to_string()))?;

        let session = match slot.install_if(observed.as_ref(), Arc::clone(&fresh), &self.disposed) {
            Install::Installed(displaced) => {
                info!(profile, handle = %fresh.handle.fingerprint(), "installed new session");
                if let Some(displaced) = displaced {
                    self.schedule_release(displaced, self.config.release_grace);
                }
                fresh
            }
            Install::Lost(winner) => {
                debug!(profile, "lost login race, releasing own session");
                self.schedule_release(fresh, Duration::ZERO);
                winner
            }
            Install::Closed => {
                self.discard(&fresh).await;
                return Err(disposed_error(profile));
            }
        };

        self.connect(&session)
            .await
            .map_err(|e| CoreError::session_unavailable(profile, e.to_string()))
    }

    /// Log every profile in again and swap in the new sessions.
    ///
    /// A failed login leaves that profile's previous session in place.
    pub async fn refresh_all(&self) -> RefreshSummary {
        if self.is_disposed() {
            return RefreshSummary::default();
        }

        let slots: Vec<Arc<ProfileSlot>> = self.slots.values().cloned().collect();
        let outcomes: Vec<bool> = stream::iter(slots)
            .map(|slot| self.refresh_profile(slot))
            .buffer_unordered(self.config.max_concurrent_logins)
            .collect()
            .await;

        let refreshed = outcomes.iter().filter(|ok| **ok).count();
        let summary = RefreshSummary {
            refreshed,
            failed: outcomes.len() - refreshed,
        };
        info!(
            refreshed = summary.refreshed,
            failed = summary.failed,
            "session refresh finished"
        );
        summary
    }

    /// Run [`refresh_all`](Self::refresh_all) every refresh period.
    pub fn schedule_refresh(self: &Arc<Self>, scheduler: &Scheduler) -> TaskResult<JobId> {
        let pool = Arc::clone(self);
        scheduler.every("session-refresh", self.config.refresh_period, move || {
            let pool = Arc::clone(&pool);
            async move {
                pool.refresh_all().await;
            }
        })
    }

    /// Disconnect every session, including those waiting out their grace
    /// delay. Later borrows fail with `SessionUnavailable`.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("disposing session pool");

        let sessions: Vec<Arc<Session>> = self
            .slots
            .values()
            .filter_map(|slot| slot.current.write().take())
            .collect();
        stream::iter(sessions)
            .for_each_concurrent(self.config.max_concurrent_logins, |session| async move {
                if let Err(e) = self.store.disconnect(&session.handle).await {
                    warn!(
                        profile = %session.profile,
                        handle = %session.handle.fingerprint(),
                        error = %e,
                        "failed to disconnect session"
                    );
                }
            })
            .await;

        self.releases.shutdown(self.config.dispose_timeout).await;
        info!("session pool disposed");
    }

    async fn refresh_profile(&self, slot: Arc<ProfileSlot>) -> bool {
        let profile = slot.profile.name();
        let fresh = match self.login(&slot.profile).await {
            Ok(fresh) => fresh,
            Err(e) => {
                warn!(profile, error = %e, "session refresh failed, keeping previous session");
                return false;
            }
        };

        match slot.replace(Arc::clone(&fresh), &self.disposed) {
            Install::Installed(previous) => {
                info!(profile, handle = %fresh.handle.fingerprint(), "session refreshed");
                if let Some(previous) = previous {
                    self.schedule_release(previous, self.config.release_grace);
                }
                true
            }
            Install::Lost(_) | Install::Closed => {
                self.discard(&fresh).await;
                false
            }
        }
    }

    /// Disconnect a session that never made it into the pool.
    async fn discard(&self, session: &Session) {
        match self.store.disconnect(&session.handle).await {
            Ok(()) => debug!(
                profile = %session.profile,
                handle = %session.handle.fingerprint(),
                "pool disposed, released fresh session"
            ),
            Err(e) => warn!(
                profile = %session.profile,
                handle = %session.handle.fingerprint(),
                error = %e,
                "failed to release session"
            ),
        }
    }

    async fn login(&self, profile: &Profile) -> CoreResult<Arc<Session>> {
        let result = self.store.authenticate(profile.credential()).await;
        let outcome = if result.is_ok() { "success" } else { "failure" };
        metrics::counter!(
            "docbridge_session_logins_total",
            "profile" => profile.name().to_string(),
            "outcome" => outcome
        )
        .increment(1);
        result.map(|handle| Arc::new(Session::new(profile.name(), handle)))
    }

    async fn connect(&self, session: &Session) -> CoreResult<Connection> {
        let (token, sticky) = self.store.reauthenticate(&session.handle).await?;
        Ok(Connection {
            profile: session.profile.clone(),
            token,
            sticky,
        })
    }

    /// Disconnect a session after `grace`, or sooner if the pool is disposed.
    fn schedule_release(&self, session: Arc<Session>, grace: Duration) {
        let task = release(Arc::clone(&self.store), Arc::clone(&session));
        if let Err(e) = self.releases.spawn_after("release-session", grace, task) {
            // the release spawner is already shut down
            debug!(
                profile = %session.profile,
                handle = %session.handle.fingerprint(),
                error = %e,
                "releasing session immediately"
            );
            tokio::spawn(release(Arc::clone(&self.store), session));
        }
    }
}

async fn release<S: DocumentStore>(store: Arc<S>, session: Arc<Session>) {
    match store.disconnect(&session.handle).await {
        Ok(()) => debug!(profile = %session.profile, handle = %session.handle.fingerprint(), "released session"),
        Err(e) => warn!(
            profile = %session.profile,
            handle = %session.handle.fingerprint(),
            error = %e,
            "failed to release session"
        ),
    }
}

fn disposed_error(profile: &str) -> CoreError {
    CoreError::session_unavailable(profile, "session pool is disposed")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(handle: &str) -> Arc<Session> {
        Arc::new(Session::new("ops", docbridge_core::SessionHandle::new(handle)))
    }

    fn slot() -> ProfileSlot {
        ProfileSlot {
            profile: Profile::new("ops", docbridge_core::Credential::new("u", "p")),
            current: RwLock::new(None),
        }
    }

    fn open() -> AtomicBool {
        AtomicBool::new(false)
    }

    #[test]
    fn test_install_into_empty_slot() {
        let slot = slot();
        let first = session("h-1");
        assert!(matches!(
            slot.install_if(None, Arc::clone(&first), &open()),
            Install::Installed(None)
        ));
        assert!(Arc::ptr_eq(&slot.current().unwrap(), &first));
    }

    #[test]
    fn test_install_replaces_observed() {
        let slot = slot();
        let first = session("h-1");
        slot.install_if(None, Arc::clone(&first), &open());

        let second = session("h-2");
        let Install::Installed(Some(displaced)) = slot.install_if(Some(&first), Arc::clone(&second), &open())
        else {
            panic!("expected the observed session to be displaced");
        };
        assert!(Arc::ptr_eq(&displaced, &first));
        assert!(Arc::ptr_eq(&slot.current().unwrap(), &second));
    }

    #[test]
    fn test_install_loses_race() {
        let slot = slot();
        let first = session("h-1");
        slot.install_if(None, Arc::clone(&first), &open());
        let winner = session("h-2");
        slot.install_if(Some(&first), Arc::clone(&winner), &open());

        // a second racer that also observed `first`
        let Install::Lost(current) = slot.install_if(Some(&first), session("h-3"), &open()) else {
            panic!("expected the racer to lose");
        };
        assert!(Arc::ptr_eq(&current, &winner));
        assert!(Arc::ptr_eq(&slot.current().unwrap(), &winner));
    }

    #[test]
    fn test_racer_that_saw_nothing_defers_to_winner() {
        let slot = slot();
        let winner = session("h-1");
        slot.install_if(None, Arc::clone(&winner), &open());

        let Install::Lost(current) = slot.install_if(None, session("h-2"), &open()) else {
            panic!("expected the racer to lose");
        };
        assert!(Arc::ptr_eq(&current, &winner));
    }

    #[test]
    fn test_install_refused_once_disposed() {
        let slot = slot();
        let disposed = AtomicBool::new(true);
        assert!(matches!(slot.install_if(None, session("h-1"), &disposed), Install::Closed));
        assert!(matches!(slot.replace(session("h-2"), &disposed), Install::Closed));
        assert!(slot.current().is_none());
    }

    #[test]
    fn test_slot_emptied_under_observer_is_closed() {
        let slot = slot();
        let first = session("h-1");
        slot.install_if(None, Arc::clone(&first), &open());
        slot.current.write().take();

        assert!(matches!(slot.install_if(Some(&first), session("h-2"), &open()), Install::Closed));
        assert!(slot.current().is_none());
    }
}
