//! The auth context: single source of truth for who is logged in.
//!
//! State lives in a `tokio::sync::watch` channel. Every transition runs
//! inside `send_if_modified`, so the epoch check, the token store writes
//! and the state update happen as one step with respect to each other.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::session::api::{AuthApi, AuthResponse};
use crate::session::error::{ApiError, AuthError};
use crate::session::resolver::{RolePrecedence, SessionResolver};
use crate::session::store::{self, TokenStore};
use crate::types::{Role, SessionToken, UserProfile};

/// Snapshot of the session as consumers see it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthState {
    pub user: Option<UserProfile>,
    pub token: Option<SessionToken>,
    /// True only while a stored token is being resolved into a user.
    pub loading: bool,
}

impl AuthState {
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some() && self.user.is_some()
    }

    pub fn phase(&self) -> AuthPhase {
        match (&self.token, &self.user) {
            (Some(_), Some(_)) => AuthPhase::Authenticated,
            (Some(_), None) => AuthPhase::Resolving,
            (None, _) => AuthPhase::Anonymous,
        }
    }

    /// Role of the authenticated user.
    pub fn role(&self) -> Option<Role> {
        if self.is_authenticated() {
            self.user.as_ref().map(|u| u.role)
        } else {
            None
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role().is_some_and(|r| r.is_admin())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPhase {
    Anonymous,
    Resolving,
    Authenticated,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AuthOptions {
    pub role_precedence: RolePrecedence,
}

impl From<&ClientConfig> for AuthOptions {
    fn from(config: &ClientConfig) -> Self {
        Self {
            role_precedence: config.role_precedence,
        }
    }
}

struct Inner {
    store: Arc<dyn TokenStore>,
    api: Arc<dyn AuthApi>,
    resolver: SessionResolver,
    state: watch::Sender<AuthState>,
    /// Bumped by every login, register, logout and teardown. Only written
    /// while holding the state lock.
    epoch: AtomicU64,
}

impl Inner {
    fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    fn bump_epoch(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn clear_store(&self) {
        if let Err(e) = store::clear_session(self.store.as_ref()) {
            warn!("Failed to clear stored session: {}", e);
        }
    }
}

/// Handle to a client session.
///
/// Cloning is cheap; all clones share the same state.
#[derive(Clone)]
pub struct AuthContext {
    inner: Arc<Inner>,
}

impl AuthContext {
    /// Build the context from whatever the token store holds.
    ///
    /// A token without a cached user starts in the resolving phase; call
    /// [`bootstrap`](Self::bootstrap) to finish it. A cached user without
    /// a token is ignored.
    pub fn init(store: Arc<dyn TokenStore>, api: Arc<dyn AuthApi>, options: AuthOptions) -> Self {
        let token = store::load_token(store.as_ref());
        let user = match token {
            Some(_) => store::load_user_profile(store.as_ref()),
            None => None,
        };
        let loading = token.is_some() && user.is_none();

        let initial = AuthState {
            user,
            token,
            loading,
        };
        info!(phase = ?initial.phase(), "Auth context initialized");

        let (state, _) = watch::channel(initial);
        let resolver = SessionResolver::new(api.clone(), options.role_precedence);

        Self {
            inner: Arc::new(Inner {
                store,
                api,
                resolver,
                state,
                epoch: AtomicU64::new(0),
            }),
        }
    }

    /// Resolve a stored token that came without a cached user.
    pub async fn bootstrap(&self) {
        if self.phase() == AuthPhase::Resolving {
            self.load_user().await;
        }
    }

    /// Stop applying results of in-flight work.
    ///
    /// The stored session is left alone so the next `init` picks it up. A
    /// half-resolved session reads as anonymous afterwards.
    pub fn teardown(&self) {
        self.inner.state.send_if_modified(|s| {
            let epoch = self.inner.bump_epoch();
            debug!(epoch, "Auth context torn down");
            if s.phase() == AuthPhase::Resolving {
                return reset(s);
            }
            std::mem::replace(&mut s.loading, false)
        });
    }

    pub fn state(&self) -> AuthState {
        self.inner.state.borrow().clone()
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.inner.state.borrow().user.clone()
    }

    pub fn token(&self) -> Option<SessionToken> {
        self.inner.state.borrow().token.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.state.borrow().loading
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.state.borrow().is_authenticated()
    }

    pub fn is_admin(&self) -> bool {
        self.inner.state.borrow().is_admin()
    }

    pub fn phase(&self) -> AuthPhase {
        self.inner.state.borrow().phase()
    }

    /// Receive every state change from now on.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.inner.state.subscribe()
    }

    /// Sign in with email and password.
    ///
    /// Any stored session is cleared before the request goes out. On failure
    /// the error is returned and the in-memory state is not touched.
    pub async fn login(&self, email: &str, password: &str) -> Result<UserProfile, AuthError> {
        let epoch = self.begin_attempt();
        info!(epoch, "Logging in");

        let response = self.inner.api.login(email, password).await?;
        self.complete_attempt(epoch, response)
    }

    /// Create an account and sign in with it.
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<UserProfile, AuthError> {
        let epoch = self.begin_attempt();
        info!(epoch, "Registering account");

        let response = self.inner.api.register(name, email, password).await?;
        self.complete_attempt(epoch, response)
    }

    /// End the session. Calling it again changes nothing.
    pub fn logout(&self) {
        let changed = self.inner.state.send_if_modified(|s| {
            self.inner.bump_epoch();
            self.inner.clear_store();
            reset(s)
        });
        if changed {
            info!("Logged out");
        }
    }

    /// Confirm the current token with the server.
    ///
    /// Success sets the user, failure logs out. Either way `loading` is
    /// false afterwards; a newer login or logout clears it when it takes over.
    pub async fn load_user(&self) {
        let mut pending = None;
        self.inner.state.send_if_modified(|s| {
            let Some(token) = s.token.clone() else {
                return std::mem::replace(&mut s.loading, false);
            };
            pending = Some((self.inner.current_epoch(), token));
            // Re-checking a known user happens in the background.
            if s.user.is_none() && !s.loading {
                s.loading = true;
                return true;
            }
            false
        });

        let Some((epoch, token)) = pending else {
            debug!("No session token, nothing to load");
            return;
        };

        match self.inner.resolver.resolve(&token).await {
            Ok(profile) => {
                let applied = self.inner.state.send_if_modified(|s| {
                    if self.inner.current_epoch() != epoch {
                        return false;
                    }
                    if let Err(e) = store::save_user_profile(self.inner.store.as_ref(), &profile) {
                        warn!("Failed to cache user profile: {}", e);
                    }
                    s.user = Some(profile.clone());
                    s.loading = false;
                    true
                });
                if applied {
                    info!(role = %profile.role, "Session restored");
                } else {
                    debug!(epoch, "Discarding stale session resolution");
                }
            }
            Err(e) => {
                let ended = self.inner.state.send_if_modified(|s| {
                    if self.inner.current_epoch() != epoch {
                        return false;
                    }
                    self.inner.bump_epoch();
                    self.inner.clear_store();
                    reset(s);
                    true
                });
                if ended {
                    warn!("Session resolution failed, logged out: {}", e);
                } else {
                    debug!(epoch, "Ignoring failure of stale session resolution: {}", e);
                }
            }
        }

        self.inner.state.send_if_modified(|s| {
            if self.inner.current_epoch() == epoch && s.loading {
                s.loading = false;
                return true;
            }
            false
        });
    }

    /// Invalidate in-flight work and drop the stored session.
    ///
    /// A pending resolution is abandoned with it, so its half-loaded state
    /// is cleared. An authenticated state stays visible until the attempt
    /// succeeds.
    fn begin_attempt(&self) -> u64 {
        let mut epoch = 0;
        self.inner.state.send_if_modified(|s| {
            epoch = self.inner.bump_epoch();
            self.inner.clear_store();
            if s.phase() == AuthPhase::Resolving {
                return reset(s);
            }
            // The superseded resolution will no longer clear it.
            std::mem::replace(&mut s.loading, false)
        });
        epoch
    }

    fn complete_attempt(&self, epoch: u64, response: AuthResponse) -> Result<UserProfile, AuthError> {
        let token = SessionToken::new(response.token);
        if token.is_empty() {
            return Err(AuthError::Api(ApiError::Decode(
                "response carries an empty token".to_string(),
            )));
        }
        let profile = self.inner.resolver.profile_from_payload(response.user, &token)?;

        let mut outcome = Err(AuthError::Superseded);
        self.inner.state.send_if_modified(|s| {
            if self.inner.current_epoch() != epoch {
                return false;
            }
            if let Err(e) = store::save_session(self.inner.store.as_ref(), &token, &profile) {
                self.inner.clear_store();
                outcome = Err(AuthError::Store(e));
                return false;
            }
            s.token = Some(token.clone());
            s.user = Some(profile.clone());
            s.loading = false;
            outcome = Ok(profile.clone());
            true
        });

        match &outcome {
            Ok(profile) => info!(user_id = %profile.id, role = %profile.role, "Authenticated"),
            Err(e) => warn!(epoch, "Sign-in not applied: {}", e),
        }
        outcome
    }
}

/// Reset to anonymous, reporting whether anything changed.
fn reset(state: &mut AuthState) -> bool {
    if *state == AuthState::default() {
        return false;
    }
    *state = AuthState::default();
    true
}
