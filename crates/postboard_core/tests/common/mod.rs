//! In-process backend doubles shared by the integration suites.

#![allow(dead_code)]

use postboard_core::backend::{
    AuthBackend, BackendError, BackendFuture, ObjectStorage, RecordBackend, SelectQuery,
};
use postboard_core::db::LocalRecordBackend;
use postboard_core::model::session::{Credentials, Identity, Session, SessionEvent};
use postboard_core::{AppContext, ArticleGateway};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, Notify};
use uuid::Uuid;

pub const WRONG_PASSWORD: &str = "wrong-password";

fn transport_error() -> BackendError {
    BackendError::Transport("connection reset by peer".to_string())
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap()
}

/// Auth double: accepts any password except `WRONG_PASSWORD`.
pub struct FakeAuth {
    events: broadcast::Sender<SessionEvent>,
    current: Mutex<Option<Session>>,
    users: Mutex<HashMap<String, Uuid>>,
    restore_gate: Mutex<Option<Arc<Notify>>>,
    pub restore_calls: AtomicUsize,
    pub fail_restore: AtomicBool,
    pub fail_sign_out: AtomicBool,
    pub require_confirmation: AtomicBool,
}

impl FakeAuth {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            events,
            current: Mutex::new(None),
            users: Mutex::new(HashMap::new()),
            restore_gate: Mutex::new(None),
            restore_calls: AtomicUsize::new(0),
            fail_restore: AtomicBool::new(false),
            fail_sign_out: AtomicBool::new(false),
            require_confirmation: AtomicBool::new(false),
        }
    }

    /// Starts with a recoverable session for `email`.
    pub fn with_session(email: &str) -> Self {
        let auth = Self::new();
        let session = auth.session_for(email);
        *lock(&auth.current) = Some(session);
        auth
    }

    /// Makes `get_current_session` wait until the returned gate is notified.
    pub fn gate_restore(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *lock(&self.restore_gate) = Some(Arc::clone(&gate));
        gate
    }

    /// Stable identity for `email`.
    pub fn identity_for(&self, email: &str) -> Identity {
        let id = *lock(&self.users)
            .entry(email.to_string())
            .or_insert_with(Uuid::new_v4);
        Identity::new(id, Some(email.to_string()))
    }

    pub fn session_for(&self, email: &str) -> Session {
        Session {
            user: self.identity_for(email),
            access_token: format!("access-{email}"),
            refresh_token: Some(format!("refresh-{email}")),
            expires_at: None,
        }
    }

    /// Publishes a session change that did not come from a store call.
    pub fn emit(&self, event: SessionEvent) {
        *lock(&self.current) = event.session.clone();
        let _ = self.events.send(event);
    }

    fn start_session(&self, email: &str) -> Session {
        let session = self.session_for(email);
        *lock(&self.current) = Some(session.clone());
        let _ = self.events.send(SessionEvent::signed_in(session.clone()));
        session
    }
}

impl AuthBackend for FakeAuth {
    fn get_current_session(&self) -> BackendFuture<'_, Option<Session>> {
        Box::pin(async move {
            self.restore_calls.fetch_add(1, Ordering::SeqCst);
            let gate = lock(&self.restore_gate).clone();
            if let Some(gate) = gate {
                gate.notified().await;
            }
            if self.fail_restore.load(Ordering::SeqCst) {
                return Err(transport_error());
            }
            Ok(lock(&self.current).clone())
        })
    }

    fn session_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    fn sign_up<'a>(&'a self, credentials: &'a Credentials) -> BackendFuture<'a, Option<Session>> {
        Box::pin(async move {
            if lock(&self.users).contains_key(&credentials.email) {
                return Err(BackendError::Rejected {
                    status: 422,
                    message: "User already registered".to_string(),
                });
            }
            if self.require_confirmation.load(Ordering::SeqCst) {
                self.identity_for(&credentials.email);
                return Ok(None);
            }
            Ok(Some(self.start_session(&credentials.email)))
        })
    }

    fn sign_in<'a>(&'a self, credentials: &'a Credentials) -> BackendFuture<'a, Session> {
        Box::pin(async move {
            if credentials.password == WRONG_PASSWORD {
                return Err(BackendError::Rejected {
                    status: 400,
                    message: "Invalid login credentials".to_string(),
                });
            }
            Ok(self.start_session(&credentials.email))
        })
    }

    fn sign_out(&self) -> BackendFuture<'_, ()> {
        Box::pin(async move {
            if self.fail_sign_out.load(Ordering::SeqCst) {
                return Err(transport_error());
            }
            self.emit(SessionEvent::signed_out());
            Ok(())
        })
    }
}

/// SQLite-backed records with per-operation failure switches.
pub struct FlakyRecords {
    inner: LocalRecordBackend,
    pub fail_select: AtomicBool,
    pub fail_insert: AtomicBool,
    pub fail_update: AtomicBool,
    pub fail_delete: AtomicBool,
    pub insert_calls: AtomicUsize,
}

impl FlakyRecords {
    pub fn new() -> Self {
        Self {
            inner: LocalRecordBackend::open_in_memory().unwrap(),
            fail_select: AtomicBool::new(false),
            fail_insert: AtomicBool::new(false),
            fail_update: AtomicBool::new(false),
            fail_delete: AtomicBool::new(false),
            insert_calls: AtomicUsize::new(0),
        }
    }

    pub fn local(&self) -> &LocalRecordBackend {
        &self.inner
    }
}

impl RecordBackend for FlakyRecords {
    fn select<'a>(
        &'a self,
        table: &'a str,
        query: &'a SelectQuery,
    ) -> BackendFuture<'a, Vec<Value>> {
        if self.fail_select.load(Ordering::SeqCst) {
            return Box::pin(async { Err(transport_error()) });
        }
        self.inner.select(table, query)
    }

    fn insert<'a>(&'a self, table: &'a str, row: Value) -> BackendFuture<'a, Value> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_insert.load(Ordering::SeqCst) {
            return Box::pin(async { Err(transport_error()) });
        }
        self.inner.insert(table, row)
    }

    fn update<'a>(
        &'a self,
        table: &'a str,
        id: &'a str,
        patch: Value,
    ) -> BackendFuture<'a, Option<Value>> {
        if self.fail_update.load(Ordering::SeqCst) {
            return Box::pin(async { Err(transport_error()) });
        }
        self.inner.update(table, id, patch)
    }

    fn delete<'a>(&'a self, table: &'a str, id: &'a str) -> BackendFuture<'a, ()> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Box::pin(async { Err(transport_error()) });
        }
        self.inner.delete(table, id)
    }
}

pub const PUBLIC_BASE: &str = "https://files.test/storage/v1/object/public";

/// Object storage held in memory, keyed by `bucket/path`.
pub struct MemoryStorage {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    upload_gate: Mutex<Option<Arc<Notify>>>,
    pub fail_upload: AtomicBool,
    pub fail_remove: AtomicBool,
    pub upload_calls: AtomicUsize,
    pub remove_calls: AtomicUsize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            upload_gate: Mutex::new(None),
            fail_upload: AtomicBool::new(false),
            fail_remove: AtomicBool::new(false),
            upload_calls: AtomicUsize::new(0),
            remove_calls: AtomicUsize::new(0),
        }
    }

    /// Makes uploads wait until the returned gate is notified.
    pub fn gate_uploads(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *lock(&self.upload_gate) = Some(Arc::clone(&gate));
        gate
    }

    pub fn object_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = lock(&self.objects).keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl ObjectStorage for MemoryStorage {
    fn upload<'a>(
        &'a self,
        bucket: &'a str,
        path: &'a str,
        bytes: Vec<u8>,
        _content_type: &'a str,
    ) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            self.upload_calls.fetch_add(1, Ordering::SeqCst);
            let gate = lock(&self.upload_gate).clone();
            if let Some(gate) = gate {
                gate.notified().await;
            }
            if self.fail_upload.load(Ordering::SeqCst) {
                return Err(BackendError::Status {
                    status: 503,
                    message: "storage unavailable".to_string(),
                });
            }
            lock(&self.objects).insert(format!("{bucket}/{path}"), bytes);
            Ok(())
        })
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{PUBLIC_BASE}/{bucket}/{path}")
    }

    fn remove<'a>(&'a self, bucket: &'a str, paths: &'a [String]) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            self.remove_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_remove.load(Ordering::SeqCst) {
                return Err(transport_error());
            }
            let mut objects = lock(&self.objects);
            for path in paths {
                objects.remove(&format!("{bucket}/{path}"));
            }
            Ok(())
        })
    }
}

/// App context over in-process doubles.
pub struct Harness {
    pub auth: Arc<FakeAuth>,
    pub records: Arc<FlakyRecords>,
    pub storage: Arc<MemoryStorage>,
    pub app: AppContext,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_auth(FakeAuth::new())
    }

    pub fn with_auth(auth: FakeAuth) -> Self {
        let auth = Arc::new(auth);
        let records = Arc::new(FlakyRecords::new());
        let storage = Arc::new(MemoryStorage::new());
        let gateway = ArticleGateway::new(
            Arc::clone(&records) as Arc<dyn RecordBackend>,
            Arc::clone(&storage) as Arc<dyn ObjectStorage>,
        );
        let app = AppContext::with_backends(Arc::clone(&auth) as Arc<dyn AuthBackend>, gateway);
        Self {
            auth,
            records,
            storage,
            app,
        }
    }

    pub fn gateway(&self) -> ArticleGateway {
        ArticleGateway::new(
            Arc::clone(&self.records) as Arc<dyn RecordBackend>,
            Arc::clone(&self.storage) as Arc<dyn ObjectStorage>,
        )
    }

    /// Initializes the app and signs in as `email`.
    pub async fn signed_in(email: &str) -> (Self, Identity) {
        let harness = Self::new();
        harness.app.initialize().await;
        harness.sign_in(email).await;
        let identity = harness.auth.identity_for(email);
        (harness, identity)
    }

    /// Signs in and waits until the session store holds the identity.
    pub async fn sign_in(&self, email: &str) {
        let identity = self.app.session.sign_in(email, "secret").await.unwrap();
        self.app.session.wait_for_identity(&identity).await.unwrap();
    }
}
