//! Article store: reactive local collection synchronized with the backend.
//!
//! # Responsibility
//! - Hold the newest-first article collection and operation status.
//! - Reconcile local state with confirmed gateway results.
//! - Derive author labels and ownership from the session store.
//!
//! # Invariants
//! - Local state changes only after the backend confirmed the operation.
//! - In-flight is raised before every backend call and lowered on every exit
//!   path, including a dropped future.
//! - `last_error` is cleared when an operation starts and set at most once,
//!   when it fails.
//! - Author labels always match the identity they were derived for. Once
//!   `follow_session` runs, identity changes relabel the collection and
//!   notify subscribers; reads also re-derive stale labels.

use crate::gateway::article_gateway::{ArticleGateway, GatewayError};
use crate::model::article::{ArticleId, DisplayArticle, ImageUpload};
use crate::model::session::Identity;
use crate::store::session_store::{AuthError, SessionStore, SessionSubscription};
use log::{debug, error, info};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Failure of one article store operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArticleStoreError {
    Auth(AuthError),
    Gateway(GatewayError),
}

impl Display for ArticleStoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auth(err) => write!(f, "{err}"),
            Self::Gateway(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ArticleStoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Auth(err) => Some(err),
            Self::Gateway(err) => Some(err),
        }
    }
}

impl From<AuthError> for ArticleStoreError {
    fn from(value: AuthError) -> Self {
        Self::Auth(value)
    }
}

impl From<GatewayError> for ArticleStoreError {
    fn from(value: GatewayError) -> Self {
        Self::Gateway(value)
    }
}

/// Transient per-store operation flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationStatus {
    pub in_flight: bool,
    pub last_error: Option<String>,
}

/// Local article state published to subscribers.
#[derive(Debug, Clone, Default)]
pub struct ArticleState {
    articles: Vec<DisplayArticle>,
    labeled_for: Option<Identity>,
    pending: usize,
    last_error: Option<String>,
}

impl ArticleState {
    pub fn articles(&self) -> &[DisplayArticle] {
        &self.articles
    }

    pub fn status(&self) -> OperationStatus {
        OperationStatus {
            in_flight: self.pending > 0,
            last_error: self.last_error.clone(),
        }
    }

    /// Re-derives author labels when `identity` differs from the one they
    /// were computed for. Returns whether anything changed.
    fn sync_labels(&mut self, identity: Option<&Identity>) -> bool {
        if self.labeled_for.as_ref() == identity {
            return false;
        }
        for article in &mut self.articles {
            article.relabel(identity);
        }
        self.labeled_for = identity.cloned();
        true
    }
}

/// Raises the in-flight count for the lifetime of one operation.
struct InFlight<'a> {
    state: &'a watch::Sender<ArticleState>,
}

impl<'a> InFlight<'a> {
    fn begin(state: &'a watch::Sender<ArticleState>) -> Self {
        state.send_modify(|state| {
            state.pending += 1;
            state.last_error = None;
        });
        Self { state }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.state
            .send_modify(|state| state.pending = state.pending.saturating_sub(1));
    }
}

/// Client-side article collection bound to one session store.
pub struct ArticleStore {
    gateway: ArticleGateway,
    session: Arc<SessionStore>,
    state: Arc<watch::Sender<ArticleState>>,
    follower: Mutex<Option<JoinHandle<()>>>,
}

impl ArticleStore {
    pub fn new(gateway: ArticleGateway, session: Arc<SessionStore>) -> Self {
        let (state, _) = watch::channel(ArticleState::default());
        Self {
            gateway,
            session,
            state: Arc::new(state),
            follower: Mutex::new(None),
        }
    }

    /// Relabels the collection on every session identity change.
    ///
    /// Idempotent. Must be called from within a tokio runtime.
    pub fn follow_session(&self) {
        let mut slot = match self.follower.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        if slot.is_some() {
            return;
        }
        let subscription = self.session.subscribe();
        *slot = Some(tokio::spawn(relabel_on_session_change(
            subscription,
            Arc::clone(&self.state),
        )));
        debug!("event=article_follow module=store status=started");
    }

    /// Stops following the session.
    pub fn shutdown(&self) {
        let handle = match self.follower.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            handle.abort();
            debug!("event=article_follow module=store status=stopped");
        }
    }

    /// Replaces the local collection with the backend's article list.
    ///
    /// # Errors
    /// Records and returns the gateway failure; the previous collection is
    /// kept.
    pub async fn fetch_all(&self) -> Result<(), ArticleStoreError> {
        let _in_flight = InFlight::begin(&self.state);
        let articles = self
            .gateway
            .list()
            .await
            .map_err(|err| self.record_failure("article_fetch", err.into()))?;

        let identity = self.session.current_identity();
        let enriched: Vec<DisplayArticle> = articles
            .into_iter()
            .map(|article| DisplayArticle::enrich(article, identity.as_ref()))
            .collect();
        let count = enriched.len();
        self.state.send_modify(|state| {
            state.articles = enriched;
            state.labeled_for = identity;
        });
        info!(
            "event=article_fetch module=store status=ok count={}",
            count
        );
        Ok(())
    }

    /// Creates an article owned by the signed-in user and prepends it.
    ///
    /// # Errors
    /// - `Auth(NotAuthenticated)` without a session; no backend call is made.
    /// - `Gateway(..)` when upload or insert fails.
    pub async fn create(
        &self,
        content: impl Into<String>,
        image: Option<ImageUpload>,
    ) -> Result<DisplayArticle, ArticleStoreError> {
        let Some(owner) = self.session.current_identity() else {
            return Err(AuthError::NotAuthenticated.into());
        };

        let _in_flight = InFlight::begin(&self.state);
        let article = self
            .gateway
            .create(owner.id, content, image)
            .await
            .map_err(|err| self.record_failure("article_create", err.into()))?;

        let identity = self.session.current_identity();
        let display = DisplayArticle::enrich(article, identity.as_ref());
        self.state.send_modify(|state| {
            state.sync_labels(identity.as_ref());
            state.articles.insert(0, display.clone());
        });
        info!(
            "event=article_create module=store status=ok article_id={}",
            display.id()
        );
        Ok(display)
    }

    /// Updates article content and replaces the local entry in place.
    ///
    /// When no local entry has `id`, the confirmed record is returned but
    /// not inserted.
    pub async fn update(
        &self,
        id: ArticleId,
        content: impl Into<String>,
    ) -> Result<DisplayArticle, ArticleStoreError> {
        let _in_flight = InFlight::begin(&self.state);
        let article = self
            .gateway
            .update(id, content)
            .await
            .map_err(|err| self.record_failure("article_update", err.into()))?;

        let identity = self.session.current_identity();
        let display = DisplayArticle::enrich(article, identity.as_ref());
        let mut replaced = false;
        self.state.send_modify(|state| {
            state.sync_labels(identity.as_ref());
            if let Some(slot) = state.articles.iter_mut().find(|entry| entry.id() == id) {
                *slot = display.clone();
                replaced = true;
            }
        });
        if replaced {
            info!(
                "event=article_update module=store status=ok article_id={}",
                id
            );
        } else {
            debug!(
                "event=article_update module=store status=skipped reason=not_in_local_state article_id={}",
                id
            );
        }
        Ok(display)
    }

    /// Deletes an article (and its image) and drops the local entry.
    pub async fn delete(
        &self,
        id: ArticleId,
        image_url: Option<&str>,
    ) -> Result<(), ArticleStoreError> {
        let _in_flight = InFlight::begin(&self.state);
        self.gateway
            .remove(id, image_url)
            .await
            .map_err(|err| self.record_failure("article_delete", err.into()))?;

        self.state
            .send_modify(|state| state.articles.retain(|entry| entry.id() != id));
        info!(
            "event=article_delete module=store status=ok article_id={}",
            id
        );
        Ok(())
    }

    /// Returns whether the signed-in user owns `article`.
    ///
    /// Always `false` without a session.
    pub fn is_owner(&self, article: &DisplayArticle) -> bool {
        self.session
            .current_identity()
            .is_some_and(|identity| identity.id == article.article.user_id)
    }

    /// Returns the collection with labels derived for the current identity.
    pub fn articles(&self) -> Vec<DisplayArticle> {
        let identity = self.session.current_identity();
        self.state
            .send_if_modified(|state| state.sync_labels(identity.as_ref()));
        self.state.borrow().articles.clone()
    }

    pub fn status(&self) -> OperationStatus {
        self.state.borrow().status()
    }

    /// Subscribes to every local state change.
    pub fn subscribe(&self) -> watch::Receiver<ArticleState> {
        self.state.subscribe()
    }

    fn record_failure(&self, event: &str, err: ArticleStoreError) -> ArticleStoreError {
        let message = err.to_string();
        error!(
            "event={} module=store status=error error={}",
            event, message
        );
        self.state
            .send_modify(|state| state.last_error = Some(message));
        err
    }
}

impl Drop for ArticleStore {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn relabel_on_session_change(
    mut session: SessionSubscription,
    state: Arc<watch::Sender<ArticleState>>,
) {
    let current = session.current().identity;
    state.send_if_modified(|state| state.sync_labels(current.as_ref()));
    while let Some(snapshot) = session.changed().await {
        let identity = snapshot.identity.as_ref();
        if state.send_if_modified(|state| state.sync_labels(identity)) {
            debug!(
                "event=article_relabel module=store authenticated={}",
                snapshot.is_authenticated()
            );
        }
    }
}
