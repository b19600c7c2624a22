//! Supabase Auth (GoTrue) adapter.
//!
//! # Responsibility
//! - Exchange credentials for sessions and end sessions.
//! - Restore, refresh and persist the held session.
//! - Publish a `SessionEvent` for every session change it causes.
//!
//! # Invariants
//! - Events are published only after the held session has been updated, so
//!   a subscriber reading `get_current_session` sees the new state.
//! - The shared access-token slot always mirrors the held session.

use super::{send, send_json, SessionFile, SupabaseClient};
use crate::backend::{AuthBackend, BackendError, BackendFuture, BackendResult};
use crate::model::session::{Credentials, Identity, Session, SessionEvent};
use chrono::{DateTime, Duration, Utc};
use log::{info, warn};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Mutex;
use tokio::sync::broadcast;
use uuid::Uuid;

const SESSION_EVENT_CAPACITY: usize = 16;

#[derive(Debug, Deserialize)]
struct UserPayload {
    id: Uuid,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenPayload {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: UserPayload,
}

impl TokenPayload {
    fn into_session(self, now: DateTime<Utc>) -> Session {
        let expires_at = self
            .expires_at
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .or_else(|| self.expires_in.map(|secs| now + Duration::seconds(secs)));
        Session {
            user: Identity::new(self.user.id, self.user.email),
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
        }
    }
}

/// GoTrue-backed `AuthBackend`.
pub struct SupabaseAuth {
    client: SupabaseClient,
    events: broadcast::Sender<SessionEvent>,
    current: Mutex<Option<Session>>,
    session_file: Option<SessionFile>,
}

impl SupabaseAuth {
    pub fn new(client: SupabaseClient) -> Self {
        let (events, _) = broadcast::channel(SESSION_EVENT_CAPACITY);
        Self {
            client,
            events,
            current: Mutex::new(None),
            session_file: None,
        }
    }

    /// Persists sessions to `file` and restores them on startup.
    #[must_use]
    pub fn with_session_file(mut self, file: SessionFile) -> Self {
        self.session_file = Some(file);
        self
    }

    /// Exchanges the held refresh token for a new session.
    ///
    /// Publishes `TokenRefreshed` on success.
    pub async fn refresh_session(&self) -> BackendResult<Session> {
        let refresh_token = self
            .held()
            .and_then(|session| session.refresh_token)
            .ok_or_else(|| BackendError::Rejected {
                status: 401,
                message: "no refresh token held".to_string(),
            })?;

        let mut url = self.client.endpoint("auth/v1/token")?;
        url.query_pairs_mut()
            .append_pair("grant_type", "refresh_token");
        let request = self
            .client
            .request(Method::POST, url)
            .json(&json!({ "refresh_token": refresh_token }));
        let payload: TokenPayload = serde_json::from_value(send_json(request).await?)?;
        let session = payload.into_session(Utc::now());

        self.store(Some(session.clone()));
        info!("event=session_refresh module=auth status=ok");
        self.publish(SessionEvent::token_refreshed(session.clone()));
        Ok(session)
    }

    fn held(&self) -> Option<Session> {
        match self.current.lock() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn store(&self, session: Option<Session>) {
        self.client
            .set_access_token(session.as_ref().map(|s| s.access_token.clone()));

        if let Some(file) = self.session_file.as_ref() {
            let result = match session.as_ref() {
                Some(session) => file.save(session),
                None => file.clear(),
            };
            if let Err(err) = result {
                warn!(
                    "event=session_file_write module=auth status=error error={}",
                    err
                );
            }
        }

        match self.current.lock() {
            Ok(mut slot) => *slot = session,
            Err(poisoned) => *poisoned.into_inner() = session,
        }
    }

    fn publish(&self, event: SessionEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }

    async fn password_grant(&self, credentials: &Credentials) -> BackendResult<Session> {
        let mut url = self.client.endpoint("auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", "password");
        let request = self.client.request(Method::POST, url).json(credentials);
        let payload: TokenPayload = serde_json::from_value(send_json(request).await?)?;
        Ok(payload.into_session(Utc::now()))
    }

    async fn restore(&self) -> BackendResult<Option<Session>> {
        let held = match self.held() {
            Some(session) => Some(session),
            None => {
                let restored = self.session_file.as_ref().and_then(SessionFile::load);
                if let Some(session) = restored.as_ref() {
                    self.client
                        .set_access_token(Some(session.access_token.clone()));
                    match self.current.lock() {
                        Ok(mut slot) => *slot = Some(session.clone()),
                        Err(poisoned) => *poisoned.into_inner() = Some(session.clone()),
                    }
                }
                restored
            }
        };

        let Some(session) = held else {
            return Ok(None);
        };
        if !session.is_expired_at(Utc::now()) {
            return Ok(Some(session));
        }
        if session.refresh_token.is_none() {
            info!("event=session_restore module=auth status=expired");
            self.store(None);
            return Ok(None);
        }

        match self.refresh_session().await {
            Ok(session) => Ok(Some(session)),
            Err(BackendError::Rejected { .. }) => {
                info!("event=session_restore module=auth status=refresh_rejected");
                self.store(None);
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}

impl AuthBackend for SupabaseAuth {
    fn get_current_session(&self) -> BackendFuture<'_, Option<Session>> {
        Box::pin(self.restore())
    }

    fn session_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    fn sign_up<'a>(&'a self, credentials: &'a Credentials) -> BackendFuture<'a, Option<Session>> {
        Box::pin(async move {
            let url = self.client.endpoint("auth/v1/signup")?;
            let request = self.client.request(Method::POST, url).json(credentials);
            let body = send_json(request).await?;

            // Projects with email confirmation return only the user object.
            if body.get("access_token").and_then(Value::as_str).is_none() {
                info!("event=sign_up module=auth status=pending_confirmation");
                return Ok(None);
            }

            let payload: TokenPayload = serde_json::from_value(body)?;
            let session = payload.into_session(Utc::now());
            self.store(Some(session.clone()));
            info!("event=sign_up module=auth status=ok");
            self.publish(SessionEvent::signed_in(session.clone()));
            Ok(Some(session))
        })
    }

    fn sign_in<'a>(&'a self, credentials: &'a Credentials) -> BackendFuture<'a, Session> {
        Box::pin(async move {
            let session = self.password_grant(credentials).await?;
            self.store(Some(session.clone()));
            info!("event=sign_in module=auth status=ok");
            self.publish(SessionEvent::signed_in(session.clone()));
            Ok(session)
        })
    }

    fn sign_out(&self) -> BackendFuture<'_, ()> {
        Box::pin(async move {
            if let Some(session) = self.held() {
                let url = self.client.endpoint("auth/v1/logout")?;
                let request = self
                    .client
                    .request_with_bearer(Method::POST, url, &session.access_token);
                match send(request).await {
                    Ok(_) => {}
                    // The server no longer knows this session; it is already over.
                    Err(BackendError::Rejected { status: 401, .. })
                    | Err(BackendError::NotFound(_)) => {
                        info!("event=sign_out module=auth status=already_ended");
                    }
                    Err(err) => return Err(err),
                }
            }

            self.store(None);
            info!("event=sign_out module=auth status=ok");
            self.publish(SessionEvent::signed_out());
            Ok(())
        })
    }
}
