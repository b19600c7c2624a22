//! Boundary contracts for the hosted backend.
//!
//! # Responsibility
//! - Define the auth, record and object-storage interfaces the core consumes.
//! - Keep transport details (HTTP, SQLite) behind object-safe traits.
//!
//! # Invariants
//! - Every trait method returns a boxed `Send` future so implementations can
//!   be shared as `Arc<dyn …>` across tasks.
//! - Implementations report semantic failures (`Rejected`, `NotFound`)
//!   separately from transport failures.

use crate::model::session::{Credentials, Session, SessionEvent};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use tokio::sync::broadcast;

pub mod supabase;

pub type BackendResult<T> = Result<T, BackendError>;

/// Boxed future returned by backend trait methods.
pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = BackendResult<T>> + Send + 'a>>;

/// Failure reported by a backend collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Request never produced a response (connect, TLS, timeout, body read).
    Transport(String),
    /// Backend refused the request (bad credentials, policy violation).
    Rejected { status: u16, message: String },
    /// Addressed resource does not exist.
    NotFound(String),
    /// Any other non-success status.
    Status { status: u16, message: String },
    /// Response arrived but could not be decoded.
    InvalidResponse(String),
}

impl BackendError {
    /// Human-readable reason without the status prefix.
    pub fn reason(&self) -> &str {
        match self {
            Self::Transport(message)
            | Self::NotFound(message)
            | Self::InvalidResponse(message) => message,
            Self::Rejected { message, .. } | Self::Status { message, .. } => message,
        }
    }
}

impl Display for BackendError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(message) => write!(f, "backend unreachable: {message}"),
            Self::Rejected { status, message } => {
                write!(f, "backend rejected request ({status}): {message}")
            }
            Self::NotFound(message) => write!(f, "not found: {message}"),
            Self::Status { status, message } => write!(f, "backend error ({status}): {message}"),
            Self::InvalidResponse(message) => write!(f, "invalid backend response: {message}"),
        }
    }
}

impl Error for BackendError {}

impl From<serde_json::Error> for BackendError {
    fn from(value: serde_json::Error) -> Self {
        Self::InvalidResponse(value.to_string())
    }
}

/// Sort direction for one ordered column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

/// Equality filter on one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub column: String,
    pub value: String,
}

/// Row selection options for `RecordBackend::select`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectQuery {
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
    pub limit: Option<u32>,
}

impl SelectQuery {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn eq(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push(Filter {
            column: column.into(),
            value: value.into(),
        });
        self
    }

    #[must_use]
    pub fn order_by(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.order = Some(Order {
            column: column.into(),
            ascending,
        });
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Managed authentication service.
pub trait AuthBackend: Send + Sync {
    /// Recovers the currently valid session, if any.
    fn get_current_session(&self) -> BackendFuture<'_, Option<Session>>;

    /// Subscribes to session-change events published by this backend.
    fn session_events(&self) -> broadcast::Receiver<SessionEvent>;

    /// Registers a new account.
    ///
    /// Returns `None` when the account needs confirmation before a session
    /// is issued.
    fn sign_up<'a>(&'a self, credentials: &'a Credentials) -> BackendFuture<'a, Option<Session>>;

    fn sign_in<'a>(&'a self, credentials: &'a Credentials) -> BackendFuture<'a, Session>;

    fn sign_out(&self) -> BackendFuture<'_, ()>;
}

/// Relational row storage addressed by table name and row id.
pub trait RecordBackend: Send + Sync {
    fn select<'a>(&'a self, table: &'a str, query: &'a SelectQuery)
        -> BackendFuture<'a, Vec<Value>>;

    /// Inserts one row and returns it as persisted.
    fn insert<'a>(&'a self, table: &'a str, row: Value) -> BackendFuture<'a, Value>;

    /// Applies `patch` to the row with `id`.
    ///
    /// Returns `None` when no row matched.
    fn update<'a>(&'a self, table: &'a str, id: &'a str, patch: Value)
        -> BackendFuture<'a, Option<Value>>;

    fn delete<'a>(&'a self, table: &'a str, id: &'a str) -> BackendFuture<'a, ()>;
}

/// Bucketed object storage with public URLs.
pub trait ObjectStorage: Send + Sync {
    fn upload<'a>(
        &'a self,
        bucket: &'a str,
        path: &'a str,
        bytes: Vec<u8>,
        content_type: &'a str,
    ) -> BackendFuture<'a, ()>;

    /// Durable public URL for an object; does not check existence.
    fn public_url(&self, bucket: &str, path: &str) -> String;

    fn remove<'a>(&'a self, bucket: &'a str, paths: &'a [String]) -> BackendFuture<'a, ()>;
}
