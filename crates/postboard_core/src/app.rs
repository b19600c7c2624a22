//! Application context wiring stores, gateway and guard together.
//!
//! # Responsibility
//! - Build the session store, article store and navigation guard once at
//!   startup over shared backend handles.
//! - Own their lifetime; `shutdown` stops background work.

use crate::backend::supabase::{
    SessionFile, SupabaseAuth, SupabaseClient, SupabaseRecords, SupabaseStorage,
};
use crate::backend::{AuthBackend, RecordBackend};
use crate::config::BackendConfig;
use crate::db::{DbResult, LocalRecordBackend};
use crate::gateway::article_gateway::ArticleGateway;
use crate::nav::guard::NavigationGuard;
use crate::nav::routes::RouteTable;
use crate::store::article_store::ArticleStore;
use crate::store::session_store::SessionStore;
use log::info;
use std::path::PathBuf;
use std::sync::Arc;

/// Where article rows are kept.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RecordSource {
    /// The project's REST API.
    #[default]
    Hosted,
    /// A local SQLite file; auth and images still use the project.
    LocalDb(PathBuf),
}

impl RecordSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hosted => "hosted",
            Self::LocalDb(_) => "local",
        }
    }
}

/// Explicitly passed replacement for process-wide store singletons.
pub struct AppContext {
    pub session: Arc<SessionStore>,
    pub articles: Arc<ArticleStore>,
    pub guard: NavigationGuard,
}

impl AppContext {
    /// Wires the Supabase HTTP adapters for `config`.
    ///
    /// # Errors
    /// Fails only when a local record database cannot be opened.
    pub fn connect(
        config: &BackendConfig,
        session_file: Option<SessionFile>,
        record_source: RecordSource,
    ) -> DbResult<Self> {
        let client = SupabaseClient::new(config);
        let mut auth = SupabaseAuth::new(client.clone());
        if let Some(file) = session_file {
            auth = auth.with_session_file(file);
        }
        let records: Arc<dyn RecordBackend> = match &record_source {
            RecordSource::Hosted => Arc::new(SupabaseRecords::new(client.clone())),
            RecordSource::LocalDb(path) => Arc::new(LocalRecordBackend::open(path)?),
        };
        let gateway =
            ArticleGateway::from_config(config, records, Arc::new(SupabaseStorage::new(client)));
        info!(
            "event=app_context module=app status=ok records={} table={} bucket={}",
            record_source.as_str(),
            config.articles_table,
            config.images_bucket
        );
        Ok(Self::with_backends(Arc::new(auth), gateway))
    }

    pub fn with_backends(auth: Arc<dyn AuthBackend>, gateway: ArticleGateway) -> Self {
        let session = Arc::new(SessionStore::new(auth));
        let articles = Arc::new(ArticleStore::new(gateway, Arc::clone(&session)));
        let guard = NavigationGuard::new(Arc::clone(&session), RouteTable::default_app());
        Self {
            session,
            articles,
            guard,
        }
    }

    /// Recovers the session and starts the session listeners.
    pub async fn initialize(&self) {
        self.session.initialize().await;
        self.articles.follow_session();
    }

    pub fn shutdown(&self) {
        self.articles.shutdown();
        self.session.shutdown();
    }
}
