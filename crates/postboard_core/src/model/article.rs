//! Article domain model.
//!
//! # Responsibility
//! - Define the persisted `articles` row shape and its insert payload.
//! - Derive the session-dependent `DisplayArticle` projection.
//!
//! # Invariants
//! - Serde field names match the `articles` table columns.
//! - `DisplayArticle` is never persisted; its label is recomputed whenever
//!   the identity it was derived for changes.

use crate::model::session::{Identity, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Server-assigned article identifier.
pub type ArticleId = Uuid;

const ANONYMOUS_LABEL_PREFIX_CHARS: usize = 8;
const SELF_LABEL_FALLBACK: &str = "User";
const DEFAULT_IMAGE_EXTENSION: &str = "bin";
const DEFAULT_IMAGE_CONTENT_TYPE: &str = "application/octet-stream";

/// Persisted article record as returned by the record backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    /// Assigned by the backend on insert.
    pub id: ArticleId,
    /// Owning user; immutable after creation and the basis for edit rights.
    pub user_id: UserId,
    /// Plain text body.
    pub content: String,
    /// Public URL of the attached image, if any.
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert payload for one article row.
///
/// `id`, `created_at` and `updated_at` are filled in by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewArticle {
    pub user_id: UserId,
    pub content: String,
    pub image_url: Option<String>,
}

/// Image bytes attached to an article create request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    /// Original file name; only its extension is kept in storage.
    pub file_name: String,
    /// MIME type sent to object storage.
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl ImageUpload {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: None,
            bytes,
        }
    }

    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Returns the lowercase file extension used for the storage object name.
    ///
    /// Only ASCII alphanumeric extensions are kept, so the object path needs
    /// no URL escaping. Anything else falls back to `bin`.
    pub fn extension(&self) -> String {
        match self.file_name.rsplit_once('.') {
            Some((stem, ext))
                if !stem.is_empty()
                    && !ext.is_empty()
                    && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
            {
                ext.to_ascii_lowercase()
            }
            _ => DEFAULT_IMAGE_EXTENSION.to_string(),
        }
    }

    pub fn content_type(&self) -> &str {
        self.content_type
            .as_deref()
            .unwrap_or(DEFAULT_IMAGE_CONTENT_TYPE)
    }
}

/// Article enriched with a transient author label for presentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayArticle {
    pub article: Article,
    /// `email` of the current identity for own articles, otherwise an
    /// anonymized `User xxxxxxxx` placeholder.
    pub author_label: String,
}

impl DisplayArticle {
    /// Enriches one article against the given identity.
    pub fn enrich(article: Article, identity: Option<&Identity>) -> Self {
        let author_label = author_label(&article, identity);
        Self {
            article,
            author_label,
        }
    }

    pub fn id(&self) -> ArticleId {
        self.article.id
    }

    /// Recomputes the author label in place.
    pub fn relabel(&mut self, identity: Option<&Identity>) {
        self.author_label = author_label(&self.article, identity);
    }
}

/// Derives the display label for an article's author.
pub fn author_label(article: &Article, identity: Option<&Identity>) -> String {
    match identity {
        Some(identity) if identity.id == article.user_id => identity
            .email
            .clone()
            .filter(|email| !email.is_empty())
            .unwrap_or_else(|| SELF_LABEL_FALLBACK.to_string()),
        _ => {
            let owner = article.user_id.to_string();
            let prefix: String = owner.chars().take(ANONYMOUS_LABEL_PREFIX_CHARS).collect();
            format!("User {prefix}")
        }
    }
}
