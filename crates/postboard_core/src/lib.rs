//! Core client logic for Postboard.
//! Sessions, articles and navigation rules over a hosted backend live here;
//! front ends only render store state and forward user intents.

pub mod app;
pub mod backend;
pub mod config;
pub mod db;
pub mod gateway;
pub mod logging;
pub mod model;
pub mod nav;
pub mod store;

pub use app::{AppContext, RecordSource};
pub use backend::supabase::SessionFile;
pub use backend::{AuthBackend, BackendError, ObjectStorage, RecordBackend, SelectQuery};
pub use config::{BackendConfig, ConfigError};
pub use gateway::article_gateway::{ArticleGateway, GatewayError};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::article::{Article, ArticleId, DisplayArticle, ImageUpload};
pub use model::session::{Identity, Session, UserId};
pub use nav::guard::{NavigationDecision, NavigationGuard};
pub use nav::routes::{RouteAccess, RouteTable};
pub use store::article_store::{ArticleStore, ArticleStoreError, OperationStatus};
pub use store::session_store::{AuthError, SessionSnapshot, SessionStore, SignUpStatus};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
