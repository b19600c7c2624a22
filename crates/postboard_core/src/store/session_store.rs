//! Session store: the process-wide view of "who is signed in".
//!
//! # Responsibility
//! - Recover an existing session once at startup.
//! - Broker sign-up/sign-in/sign-out against the auth backend.
//! - Apply backend session-change events for the lifetime of the store.
//! - Publish `SessionSnapshot` changes to subscribers.
//!
//! # Invariants
//! - `initialize` runs its body at most once; concurrent callers wait for
//!   that single run.
//! - Startup recovery failure means "signed out", never an error.
//! - Sign-in/sign-up never set the identity directly; the backend's
//!   `SignedIn` event does.
//! - Sign-out clears the identity before returning.

use crate::backend::{AuthBackend, BackendError};
use crate::model::session::{Credentials, Identity, SessionEvent, UserId};
use log::{debug, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch, OnceCell};
use tokio::task::JoinHandle;

/// Auth operation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Operation requires a signed-in session.
    NotAuthenticated,
    /// Backend refused the credentials or request; carries its reason.
    Rejected(String),
    /// Backend could not be reached or answered unexpectedly.
    Backend(BackendError),
}

impl Display for AuthError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAuthenticated => write!(f, "user must be signed in"),
            Self::Rejected(reason) => write!(f, "authentication rejected: {reason}"),
            Self::Backend(err) => write!(f, "{err}"),
        }
    }
}

impl Error for AuthError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Backend(err) => Some(err),
            Self::NotAuthenticated | Self::Rejected(_) => None,
        }
    }
}

impl From<BackendError> for AuthError {
    fn from(value: BackendError) -> Self {
        match value {
            BackendError::Rejected { message, .. } => Self::Rejected(message),
            other => Self::Backend(other),
        }
    }
}

/// Lifecycle phase of the session store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Uninitialized,
    Initializing,
    /// Initial recovery finished; `identity` is authoritative.
    Ready,
}

/// Point-in-time session state published to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub identity: Option<Identity>,
}

impl SessionSnapshot {
    fn uninitialized() -> Self {
        Self {
            phase: SessionPhase::Uninitialized,
            identity: None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.phase == SessionPhase::Ready
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }

    /// Whether the signed-in user is `user_id`.
    pub fn holds(&self, user_id: UserId) -> bool {
        self.identity.as_ref().is_some_and(|identity| identity.id == user_id)
    }
}

/// Outcome of a successful sign-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignUpStatus {
    /// Backend issued a session right away.
    SignedIn,
    /// Account exists but must be confirmed before signing in.
    ConfirmationRequired,
}

/// Typed stream of session snapshots.
///
/// Dropping the subscription (or calling `unsubscribe`) ends it.
pub struct SessionSubscription {
    rx: watch::Receiver<SessionSnapshot>,
}

impl SessionSubscription {
    pub fn current(&self) -> SessionSnapshot {
        self.rx.borrow().clone()
    }

    /// Waits for the next change. Returns `None` once the store is gone.
    pub async fn changed(&mut self) -> Option<SessionSnapshot> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// Waits until a snapshot satisfies `predicate`, checking the current
    /// one first. Returns `None` once the store is gone.
    pub async fn wait_for<F>(&mut self, mut predicate: F) -> Option<SessionSnapshot>
    where
        F: FnMut(&SessionSnapshot) -> bool,
    {
        let snapshot = self.rx.wait_for(|snapshot| predicate(snapshot)).await.ok()?;
        Some(snapshot.clone())
    }

    pub fn unsubscribe(self) {}
}

/// Holder of the current authenticated identity.
pub struct SessionStore {
    auth: Arc<dyn AuthBackend>,
    state: Arc<watch::Sender<SessionSnapshot>>,
    init: OnceCell<()>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl SessionStore {
    pub fn new(auth: Arc<dyn AuthBackend>) -> Self {
        let (state, _) = watch::channel(SessionSnapshot::uninitialized());
        Self {
            auth,
            state: Arc::new(state),
            init: OnceCell::new(),
            listener: Mutex::new(None),
        }
    }

    /// Recovers any existing session and starts listening for changes.
    ///
    /// Idempotent. Must be called from within a tokio runtime.
    pub async fn initialize(&self) {
        self.init.get_or_init(|| self.run_initialize()).await;
    }

    async fn run_initialize(&self) {
        self.state
            .send_modify(|snapshot| snapshot.phase = SessionPhase::Initializing);

        // Subscribe before recovering so no change is lost in between.
        let events = self.auth.session_events();
        let identity = match self.auth.get_current_session().await {
            Ok(session) => session.map(|session| session.user),
            Err(err) => {
                warn!(
                    "event=session_init module=session status=recover_failed error={}",
                    err
                );
                None
            }
        };

        let authenticated = identity.is_some();
        self.state.send_modify(|snapshot| {
            snapshot.identity = identity;
            snapshot.phase = SessionPhase::Ready;
        });
        info!(
            "event=session_init module=session status=ok authenticated={}",
            authenticated
        );

        let handle = tokio::spawn(forward_session_events(events, Arc::clone(&self.state)));
        match self.listener.lock() {
            Ok(mut slot) => *slot = Some(handle),
            Err(poisoned) => *poisoned.into_inner() = Some(handle),
        }
    }

    /// Registers a new account.
    ///
    /// # Errors
    /// - `Rejected` with the backend's reason when the account cannot be
    ///   created.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpStatus, AuthError> {
        let credentials = Credentials::new(email, password);
        let session = self.auth.sign_up(&credentials).await.map_err(|err| {
            info!("event=sign_up module=session status=error error={}", err);
            AuthError::from(err)
        })?;
        Ok(match session {
            Some(_) => SignUpStatus::SignedIn,
            None => SignUpStatus::ConfirmationRequired,
        })
    }

    /// Signs in with email and password and returns the backend's identity.
    ///
    /// The store holds that identity once the backend's `SignedIn` event has
    /// been applied; a previously held identity stays visible until then.
    /// Await `wait_for_identity` to observe it.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let credentials = Credentials::new(email, password);
        let session = self.auth.sign_in(&credentials).await.map_err(|err| {
            info!("event=sign_in module=session status=error error={}", err);
            AuthError::from(err)
        })?;
        Ok(session.user)
    }

    /// Resolves once the store holds the user `identity` refers to.
    ///
    /// Returns `None` if the listener stops first.
    pub async fn wait_for_identity(&self, identity: &Identity) -> Option<SessionSnapshot> {
        self.subscribe()
            .wait_for(|snapshot| snapshot.holds(identity.id))
            .await
    }

    /// Ends the session and clears the identity immediately.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        self.auth.sign_out().await.map_err(|err| {
            warn!("event=sign_out module=session status=error error={}", err);
            AuthError::from(err)
        })?;
        self.state.send_if_modified(|snapshot| snapshot.identity.take().is_some());
        info!("event=sign_out module=session status=ok");
        Ok(())
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    pub fn current_identity(&self) -> Option<Identity> {
        self.state.borrow().identity.clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    /// Resolves once initial session recovery has finished.
    ///
    /// Does not trigger initialization itself.
    pub async fn wait_until_ready(&self) -> SessionSnapshot {
        let mut rx = self.state.subscribe();
        let snapshot = match rx.wait_for(SessionSnapshot::is_ready).await {
            Ok(snapshot) => snapshot.clone(),
            // Unreachable while `self` holds the sender.
            Err(_) => self.snapshot(),
        };
        snapshot
    }

    pub fn subscribe(&self) -> SessionSubscription {
        SessionSubscription {
            rx: self.state.subscribe(),
        }
    }

    /// Stops applying backend session events.
    pub fn shutdown(&self) {
        let handle = match self.listener.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            handle.abort();
            debug!("event=session_listener module=session status=stopped");
        }
    }
}

impl Drop for SessionStore {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn forward_session_events(
    mut events: broadcast::Receiver<SessionEvent>,
    state: Arc<watch::Sender<SessionSnapshot>>,
) {
    loop {
        match events.recv().await {
            Ok(event) => {
                let identity = event.session.map(|session| session.user);
                debug!(
                    "event=session_change module=session kind={} authenticated={}",
                    event.kind.as_str(),
                    identity.is_some()
                );
                state.send_if_modified(|snapshot| {
                    if snapshot.identity == identity {
                        return false;
                    }
                    snapshot.identity = identity;
                    true
                });
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(
                    "event=session_change module=session status=lagged skipped={}",
                    skipped
                );
            }
            Err(RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AuthError, SessionPhase, SessionSnapshot};
    use crate::backend::BackendError;
    use crate::model::session::Identity;
    use uuid::Uuid;

    #[test]
    fn rejected_backend_error_keeps_reason() {
        let err = AuthError::from(BackendError::Rejected {
            status: 400,
            message: "Invalid login credentials".to_string(),
        });
        assert_eq!(
            err,
            AuthError::Rejected("Invalid login credentials".to_string())
        );

        let err = AuthError::from(BackendError::Transport("timeout".to_string()));
        assert!(matches!(err, AuthError::Backend(_)));
    }

    #[test]
    fn snapshot_derives_authentication_from_identity() {
        let mut snapshot = SessionSnapshot::uninitialized();
        assert!(!snapshot.is_authenticated());
        assert!(!snapshot.is_ready());

        snapshot.phase = SessionPhase::Ready;
        let identity = Identity::new(Uuid::new_v4(), None);
        snapshot.identity = Some(identity.clone());
        assert!(snapshot.is_authenticated());
        assert!(snapshot.is_ready());
        assert!(snapshot.holds(identity.id));
        assert!(!snapshot.holds(Uuid::new_v4()));
    }
}
