//! Authentication session management with on-disk persistence.
//!
//! A [`Portal`] owns everything tied to a signed-in user: the authenticated
//! [`ApiClient`], the [`LiveClient`] with its listener registry, and the
//! domain stores. Signing in builds all of it; signing out tears it down.

use classroom_shared::{ApiError, Role, User};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::api_client::ApiClient;
use crate::config::ClientConfig;
use crate::error::{AuthError, StoreError};
use crate::routes::{guard, Navigation, Route};
use crate::storage::SessionStorage;
use crate::stores::{AssignmentStore, AttendanceStore, SubjectStore, ToastKind, ToastQueue};
use crate::ws::LiveClient;

const STORAGE_KEY: &str = "session";

/// Stored session data
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AuthSession {
    pub token: String,
    pub user: User,
}

/// Live state of a signed-in session.
struct ActiveSession {
    session: AuthSession,
    api: ApiClient,
    live: LiveClient,
    subjects: SubjectStore,
    assignments: AssignmentStore,
    attendance: AttendanceStore,
    watcher: JoinHandle<()>,
}

impl ActiveSession {
    fn teardown(self) {
        self.watcher.abort();
        self.assignments.detach();
        self.attendance.detach();
        self.live.disconnect();
        self.subjects.clear();
        self.assignments.clear();
        self.attendance.clear();
    }
}

/// Session context for one portal user.
///
/// Session-bound operations must run inside a Tokio runtime since signing in
/// opens the live connection.
pub struct Portal {
    config: ClientConfig,
    storage: SessionStorage,
    toasts: ToastQueue,
    active: RwLock<Option<ActiveSession>>,
}

impl Portal {
    pub fn new(config: ClientConfig, storage: SessionStorage) -> Self {
        Self {
            config,
            storage,
            toasts: ToastQueue::new(),
            active: RwLock::new(None),
        }
    }

    /// Build a portal and resume the persisted session, if there is one.
    pub fn restore(config: ClientConfig, storage: SessionStorage) -> Self {
        let portal = Self::new(config, storage);
        match portal.storage.load::<AuthSession>(STORAGE_KEY) {
            Some(session) if !session.token.is_empty() => {
                tracing::info!(user = %session.user.email, role = %session.user.role, "restoring session");
                portal.start(session);
            }
            _ => tracing::debug!("no stored session"),
        }
        portal
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn storage(&self) -> &SessionStorage {
        &self.storage
    }

    pub fn toasts(&self) -> &ToastQueue {
        &self.toasts
    }

    /// API client without credentials, for sign-in calls.
    fn anonymous_api(&self) -> ApiClient {
        ApiClient::new().with_base_url(self.config.api_url.clone())
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let resp = self
            .anonymous_api()
            .login(email, password)
            .await
            .map_err(|e| AuthError::new(e, "Login failed"))?;
        tracing::info!(user = %resp.user.email, role = %resp.user.role, "signed in");
        let user = resp.user.clone();
        self.start(AuthSession {
            token: resp.token,
            user: resp.user,
        });
        Ok(user)
    }

    pub async fn register(&self, email: &str, password: &str, role: Role) -> Result<User, AuthError> {
        let resp = self
            .anonymous_api()
            .register(email, password, role)
            .await
            .map_err(|e| AuthError::new(e, "Registration failed"))?;
        tracing::info!(user = %resp.user.email, role = %resp.user.role, "registered");
        let user = resp.user.clone();
        self.start(AuthSession {
            token: resp.token,
            user: resp.user,
        });
        Ok(user)
    }

    /// Re-read the signed-in user from the server.
    ///
    /// Any failure signs out. A changed identity or role rebuilds the session
    /// so no store keeps data loaded for the previous role.
    pub async fn refresh_user(&self) -> Result<User, StoreError> {
        let (api, current) = {
            let active = self.active.read();
            let active = active.as_ref().ok_or(StoreError::NotSignedIn)?;
            (active.api.clone(), active.session.clone())
        };

        let user = match api.current_user().await {
            Ok(user) => user,
            Err(e) => {
                tracing::warn!(error = %e, "could not refresh user, signing out");
                self.logout();
                return Err(e.into());
            }
        };

        if user.id != current.user.id || user.role != current.user.role {
            tracing::info!(role = %user.role, "user changed, rebuilding session");
            self.start(AuthSession {
                token: current.token,
                user: user.clone(),
            });
            return Ok(user);
        }

        let session = {
            let mut active = self.active.write();
            let Some(active) = active.as_mut() else {
                return Err(StoreError::NotSignedIn);
            };
            active.session.user = user.clone();
            active.session.clone()
        };
        self.persist(&session);
        Ok(user)
    }

    /// Sign out: close the live connection, clear the stores and forget the
    /// persisted session. Safe to call when signed out.
    pub fn logout(&self) {
        let previous = self.active.write().take();
        if let Some(active) = previous {
            tracing::info!(user = %active.session.user.email, "signed out");
            active.teardown();
        }
        self.storage.remove(STORAGE_KEY);
    }

    /// Pass a store result through, signing out when the server rejected the
    /// session's credential.
    pub fn check<T>(&self, result: Result<T, StoreError>) -> Result<T, StoreError> {
        if let Err(e) = &result {
            if e.is_unauthorized() {
                tracing::warn!("credential rejected, signing out");
                self.logout();
            }
        }
        result
    }

    /// Same as [`Portal::check`] for direct API calls.
    pub fn check_api<T>(&self, result: Result<T, ApiError>) -> Result<T, StoreError> {
        self.check(result.map_err(StoreError::from))
    }

    pub fn navigate(&self, route: Route) -> Navigation {
        guard(route, self.user().as_ref())
    }

    pub fn is_authenticated(&self) -> bool {
        self.active.read().is_some()
    }

    pub fn user(&self) -> Option<User> {
        self.active.read().as_ref().map(|a| a.session.user.clone())
    }

    pub fn token(&self) -> Option<String> {
        self.active.read().as_ref().map(|a| a.session.token.clone())
    }

    pub fn session(&self) -> Option<AuthSession> {
        self.active.read().as_ref().map(|a| a.session.clone())
    }

    /// Authenticated API client for the current session.
    pub fn api(&self) -> Option<ApiClient> {
        self.active.read().as_ref().map(|a| a.api.clone())
    }

    pub fn live(&self) -> Option<LiveClient> {
        self.active.read().as_ref().map(|a| a.live.clone())
    }

    pub fn subjects(&self) -> Option<SubjectStore> {
        self.active.read().as_ref().map(|a| a.subjects.clone())
    }

    pub fn assignments(&self) -> Option<AssignmentStore> {
        self.active.read().as_ref().map(|a| a.assignments.clone())
    }

    pub fn attendance(&self) -> Option<AttendanceStore> {
        self.active.read().as_ref().map(|a| a.attendance.clone())
    }

    /// Build and install a session, replacing any previous one.
    fn start(&self, session: AuthSession) {
        let api = self.anonymous_api().with_token(Some(session.token.clone()));
        let live = LiveClient::from_config(&self.config);

        let subjects = SubjectStore::new(api.clone(), session.user.clone());
        let assignments = AssignmentStore::new(api.clone(), session.user.clone());
        let attendance = AttendanceStore::new(api.clone(), session.user.clone());
        assignments.attach(&live);
        attendance.attach(&live);

        let watcher = spawn_exhaustion_watcher(&live, self.toasts.clone());
        live.connect(&session.token);

        self.persist(&session);
        let previous = self.active.write().replace(ActiveSession {
            session,
            api,
            live,
            subjects,
            assignments,
            attendance,
            watcher,
        });
        if let Some(previous) = previous {
            previous.teardown();
        }
    }

    fn persist(&self, session: &AuthSession) {
        if let Err(e) = self.storage.save(STORAGE_KEY, session) {
            tracing::warn!(error = %e, dir = %self.storage.dir().display(), "could not persist session");
        }
    }
}

impl Drop for Portal {
    fn drop(&mut self) {
        if let Some(active) = self.active.get_mut().take() {
            active.teardown();
        }
    }
}

/// Raise a sticky error toast each time the live client gives up reconnecting.
fn spawn_exhaustion_watcher(live: &LiveClient, toasts: ToastQueue) -> JoinHandle<()> {
    let mut status = live.watch_status();
    tokio::spawn(async move {
        let mut reported = false;
        while status.changed().await.is_ok() {
            let exhausted = status.borrow_and_update().exhausted;
            if exhausted && !reported {
                tracing::error!("live updates stopped after repeated reconnect failures");
                toasts.show(
                    "Connection lost",
                    "Live updates stopped. Reload or sign in again to reconnect.",
                    ToastKind::Error,
                    None,
                );
            }
            reported = exhausted;
        }
    })
}
