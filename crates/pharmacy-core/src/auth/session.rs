//! Session store: the single source of truth for "is the user logged in,
//! and as whom".
//!
//! The store owns the in-memory session and is the only writer of the
//! durable token entry. Every change of token bumps a generation counter;
//! identity fetches and gateway invalidations carry the generation they
//! observed and are ignored once it has moved on, so a fetch that resolves
//! after logout cannot bring the session back.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::storage::{StorageError, TokenStorage};
use crate::api::ApiError;
use crate::models::User;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session token must not be empty")]
    EmptyToken,

    #[error("Token storage failed: {0}")]
    Storage(#[from] StorageError),
}

/// Resolves the identity a token authorizes.
#[async_trait]
pub trait IdentityFetcher: Send + Sync {
    async fn fetch_identity(&self, token: &str) -> Result<User, ApiError>;
}

/// Point-in-time view of the session.
///
/// `user` is never set while `token` is absent.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub token: Option<String>,
    pub user: Option<User>,
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }
}

// Token stays out of logs
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("user", &self.user)
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
struct SessionState {
    session: Session,
    generation: u64,
}

/// How an identity fetch ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityOutcome {
    /// The user was stored on the session.
    Populated(User),
    /// The fetch failed and the session was cleared.
    RolledBack,
    /// The session moved on while the fetch was in flight; result discarded.
    Stale,
    /// The fetch task panicked or was cancelled.
    Aborted,
}

/// Handle to an identity fetch started by `login` or `rehydrate`.
///
/// Dropping the handle leaves the fetch running.
pub struct IdentityFetch {
    handle: JoinHandle<IdentityOutcome>,
}

impl IdentityFetch {
    /// Wait for the fetch to resolve and its result to be applied.
    pub async fn settled(self) -> IdentityOutcome {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "Identity fetch task did not complete");
                IdentityOutcome::Aborted
            }
        }
    }
}

/// Live view of the session for a UI consumer.
///
/// Dropping the subscription (or calling `unsubscribe`) detaches it.
pub struct SessionSubscription {
    rx: watch::Receiver<SessionState>,
}

impl SessionSubscription {
    /// Wait for the next change. Returns `None` once the store is gone.
    pub async fn changed(&mut self) -> Option<Session> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().session.clone())
    }

    /// The latest session, without waiting.
    pub fn current(&self) -> Session {
        self.rx.borrow().session.clone()
    }

    pub fn unsubscribe(self) {}
}

pub struct SessionStore {
    storage: Arc<dyn TokenStorage>,
    identity: Arc<dyn IdentityFetcher>,
    state: watch::Sender<SessionState>,
    // Serializes storage writes with the in-memory update
    write_lock: Mutex<()>,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn TokenStorage>, identity: Arc<dyn IdentityFetcher>) -> Arc<Self> {
        let (state, _) = watch::channel(SessionState::default());
        Arc::new(Self {
            storage,
            identity,
            state,
            write_lock: Mutex::new(()),
        })
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current token and user.
    pub fn session(&self) -> Session {
        self.state.borrow().session.clone()
    }

    pub fn token(&self) -> Option<String> {
        self.state.borrow().session.token.clone()
    }

    pub fn user(&self) -> Option<User> {
        self.state.borrow().session.user.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().session.is_authenticated()
    }

    /// Generation of the current token. Advances on every login, logout
    /// and invalidation.
    pub fn generation(&self) -> u64 {
        self.state.borrow().generation
    }

    /// Token together with the generation it belongs to, read atomically.
    pub fn token_with_generation(&self) -> (Option<String>, u64) {
        let state = self.state.borrow();
        (state.session.token.clone(), state.generation)
    }

    pub fn subscribe(&self) -> SessionSubscription {
        SessionSubscription {
            rx: self.state.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.receiver_count()
    }

    /// Start a session with `token`.
    ///
    /// The token is persisted, then set in memory, then an identity fetch is
    /// spawned. A failed fetch logs the session out again. Must be called
    /// from within a Tokio runtime.
    pub fn login(self: &Arc<Self>, token: &str) -> Result<IdentityFetch, SessionError> {
        if token.trim().is_empty() {
            return Err(SessionError::EmptyToken);
        }

        let generation = {
            let _guard = self.lock();
            self.storage.store(token)?;
            self.begin(token)
        };
        info!(generation, "Session started");

        Ok(self.spawn_identity_fetch(token.to_string(), generation))
    }

    /// Restore the session left in durable storage by a previous run.
    ///
    /// The token is set immediately so a returning user is treated as logged
    /// in while the identity fetch runs. Returns `None` when nothing is stored.
    pub fn rehydrate(self: &Arc<Self>) -> Result<Option<IdentityFetch>, SessionError> {
        let (token, generation) = {
            let _guard = self.lock();
            let Some(token) = self.storage.load()? else {
                debug!("No stored session token");
                return Ok(None);
            };
            let generation = self.begin(&token);
            (token, generation)
        };
        info!(generation, "Session restored from storage");

        Ok(Some(self.spawn_identity_fetch(token, generation)))
    }

    /// End the session. Safe to call when already logged out.
    ///
    /// In-memory state is cleared even if clearing storage fails.
    pub fn logout(&self) -> Result<(), SessionError> {
        let _guard = self.lock();
        self.end()?;
        info!("Session ended");
        Ok(())
    }

    /// End the session only if it is still at `observed_generation`.
    ///
    /// Used when a response reveals the token is no longer accepted. Returns
    /// `true` if this call ended the session, `false` if the session had
    /// already changed since the request was issued.
    pub fn invalidate(&self, observed_generation: u64) -> Result<bool, SessionError> {
        let _guard = self.lock();
        if self.generation() != observed_generation {
            debug!(observed_generation, "Ignoring invalidation for an older session");
            return Ok(false);
        }
        self.end()?;
        warn!(generation = observed_generation, "Session invalidated");
        Ok(true)
    }

    // Caller holds the write lock.
    fn begin(&self, token: &str) -> u64 {
        let mut generation = 0;
        self.state.send_modify(|state| {
            state.generation += 1;
            state.session = Session {
                token: Some(token.to_string()),
                user: None,
            };
            generation = state.generation;
        });
        generation
    }

    // Caller holds the write lock.
    fn end(&self) -> Result<(), SessionError> {
        self.state.send_if_modified(|state| {
            state.generation += 1;
            let changed = state.session != Session::default();
            state.session = Session::default();
            changed
        });
        self.storage.clear()?;
        Ok(())
    }

    fn spawn_identity_fetch(self: &Arc<Self>, token: String, generation: u64) -> IdentityFetch {
        let store = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let result = store.identity.fetch_identity(&token).await;
            store.apply_identity(generation, result)
        });
        IdentityFetch { handle }
    }

    fn apply_identity(&self, generation: u64, result: Result<User, ApiError>) -> IdentityOutcome {
        let _guard = self.lock();
        if self.generation() != generation {
            debug!(generation, "Discarding identity fetch for an older session");
            return IdentityOutcome::Stale;
        }

        match result {
            Ok(user) => {
                self.state.send_modify(|state| {
                    state.session.user = Some(user.clone());
                });
                info!(user_id = user.id, role = %user.role, "Session identity loaded");
                IdentityOutcome::Populated(user)
            }
            Err(e) => {
                // Any failure means the token is not trusted
                warn!(error = %e, "Identity fetch failed, logging out");
                if let Err(e) = self.end() {
                    warn!(error = %e, "Failed to clear stored token");
                }
                IdentityOutcome::RolledBack
            }
        }
    }
}
