//! Article resource gateway.
//!
//! # Responsibility
//! - Translate typed article CRUD calls into record/storage backend calls.
//! - Own the image upload/delete side effects of the article lifecycle.
//!
//! # Invariants
//! - `list` returns newest-first by `created_at`.
//! - `create` never inserts a row when the image upload fails.
//! - `remove` always attempts the row delete; image delete failures are
//!   logged and swallowed.
//! - Image object paths are `{owner_id}/{unix_millis}.{ext}`, and
//!   `image_path_from_url` inverts `ObjectStorage::public_url` for them.

use crate::backend::{BackendError, ObjectStorage, RecordBackend, SelectQuery};
use crate::config::{BackendConfig, DEFAULT_ARTICLES_TABLE, DEFAULT_IMAGES_BUCKET};
use crate::model::article::{Article, ArticleId, ImageUpload, NewArticle};
use crate::model::session::UserId;
use chrono::Utc;
use log::{error, info, warn};
use serde_json::{json, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Instant;

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Failure of one gateway operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Listing articles failed.
    Fetch(BackendError),
    /// Image upload failed; no article row was created.
    Upload(BackendError),
    /// Inserting the article row failed.
    Create(BackendError),
    /// No article row matches the id.
    NotFound(ArticleId),
    /// Patching the article row failed.
    Update(BackendError),
    /// Deleting the article row failed.
    Delete(BackendError),
    /// Backend returned a row that is not a valid article.
    InvalidRecord(String),
}

impl Display for GatewayError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fetch(err) => write!(f, "failed to load articles: {err}"),
            Self::Upload(err) => write!(f, "failed to upload image: {err}"),
            Self::Create(err) => write!(f, "failed to create article: {err}"),
            Self::NotFound(id) => write!(f, "article not found: {id}"),
            Self::Update(err) => write!(f, "failed to update article: {err}"),
            Self::Delete(err) => write!(f, "failed to delete article: {err}"),
            Self::InvalidRecord(details) => write!(f, "invalid article record: {details}"),
        }
    }
}

impl Error for GatewayError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Fetch(err)
            | Self::Upload(err)
            | Self::Create(err)
            | Self::Update(err)
            | Self::Delete(err) => Some(err),
            Self::NotFound(_) | Self::InvalidRecord(_) => None,
        }
    }
}

/// Stateless article gateway over shared backend handles.
#[derive(Clone)]
pub struct ArticleGateway {
    records: Arc<dyn RecordBackend>,
    storage: Arc<dyn ObjectStorage>,
    table: String,
    bucket: String,
}

impl ArticleGateway {
    /// Creates a gateway using the default `articles` table and
    /// `article-images` bucket.
    pub fn new(records: Arc<dyn RecordBackend>, storage: Arc<dyn ObjectStorage>) -> Self {
        Self {
            records,
            storage,
            table: DEFAULT_ARTICLES_TABLE.to_string(),
            bucket: DEFAULT_IMAGES_BUCKET.to_string(),
        }
    }

    pub fn from_config(
        config: &BackendConfig,
        records: Arc<dyn RecordBackend>,
        storage: Arc<dyn ObjectStorage>,
    ) -> Self {
        Self {
            records,
            storage,
            table: config.articles_table.clone(),
            bucket: config.images_bucket.clone(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Returns all articles, newest first.
    pub async fn list(&self) -> GatewayResult<Vec<Article>> {
        let started_at = Instant::now();
        let query = SelectQuery::new().order_by("created_at", false);
        let rows = match self.records.select(&self.table, &query).await {
            Ok(rows) => rows,
            Err(err) => {
                error!(
                    "event=article_list module=gateway status=error duration_ms={} error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                return Err(GatewayError::Fetch(err));
            }
        };

        let articles = rows
            .into_iter()
            .map(decode_article)
            .collect::<GatewayResult<Vec<_>>>()?;
        info!(
            "event=article_list module=gateway status=ok count={} duration_ms={}",
            articles.len(),
            started_at.elapsed().as_millis()
        );
        Ok(articles)
    }

    /// Creates one article, uploading its image first when given.
    ///
    /// # Errors
    /// - `Upload` when the image cannot be stored; nothing is inserted.
    /// - `Create` when the row insert fails.
    pub async fn create(
        &self,
        owner_id: UserId,
        content: impl Into<String>,
        image: Option<ImageUpload>,
    ) -> GatewayResult<Article> {
        let image_url = match image {
            Some(image) => Some(self.upload_image(owner_id, image).await?),
            None => None,
        };

        let row = NewArticle {
            user_id: owner_id,
            content: content.into(),
            image_url,
        };
        let row = serde_json::to_value(&row)
            .map_err(|err| GatewayError::Create(BackendError::from(err)))?;

        let inserted = self.records.insert(&self.table, row).await.map_err(|err| {
            error!(
                "event=article_create module=gateway status=error error={}",
                err
            );
            GatewayError::Create(err)
        })?;
        let article = decode_article(inserted)?;
        info!(
            "event=article_create module=gateway status=ok article_id={} has_image={}",
            article.id,
            article.image_url.is_some()
        );
        Ok(article)
    }

    /// Replaces article content and refreshes `updated_at`.
    pub async fn update(
        &self,
        id: ArticleId,
        content: impl Into<String>,
    ) -> GatewayResult<Article> {
        let patch = json!({
            "content": content.into(),
            "updated_at": Utc::now(),
        });
        let id_text = id.to_string();
        let updated = match self.records.update(&self.table, &id_text, patch).await {
            Ok(Some(row)) => row,
            Ok(None) | Err(BackendError::NotFound(_)) => {
                warn!(
                    "event=article_update module=gateway status=not_found article_id={}",
                    id
                );
                return Err(GatewayError::NotFound(id));
            }
            Err(err) => {
                error!(
                    "event=article_update module=gateway status=error article_id={} error={}",
                    id, err
                );
                return Err(GatewayError::Update(err));
            }
        };

        let article = decode_article(updated)?;
        info!(
            "event=article_update module=gateway status=ok article_id={}",
            article.id
        );
        Ok(article)
    }

    /// Deletes one article and, best effort, its stored image.
    pub async fn remove(&self, id: ArticleId, image_url: Option<&str>) -> GatewayResult<()> {
        if let Some(image_url) = image_url {
            self.delete_image(image_url).await;
        }

        let id_text = id.to_string();
        self.records
            .delete(&self.table, &id_text)
            .await
            .map_err(|err| {
                error!(
                    "event=article_delete module=gateway status=error article_id={} error={}",
                    id, err
                );
                GatewayError::Delete(err)
            })?;
        info!(
            "event=article_delete module=gateway status=ok article_id={}",
            id
        );
        Ok(())
    }

    async fn upload_image(&self, owner_id: UserId, image: ImageUpload) -> GatewayResult<String> {
        let path = image_object_path(owner_id, Utc::now().timestamp_millis(), &image.extension());
        let content_type = image.content_type().to_string();
        let size_bytes = image.bytes.len();

        if let Err(err) = self
            .storage
            .upload(&self.bucket, &path, image.bytes, &content_type)
            .await
        {
            error!(
                "event=image_upload module=gateway status=error size_bytes={} error={}",
                size_bytes, err
            );
            return Err(GatewayError::Upload(err));
        }

        info!(
            "event=image_upload module=gateway status=ok size_bytes={}",
            size_bytes
        );
        Ok(self.storage.public_url(&self.bucket, &path))
    }

    async fn delete_image(&self, image_url: &str) {
        let Some(path) = image_path_from_url(image_url, &self.bucket) else {
            info!("event=image_delete module=gateway status=skipped reason=foreign_url");
            return;
        };

        let paths = [path.to_string()];
        match self.storage.remove(&self.bucket, &paths).await {
            Ok(()) => info!("event=image_delete module=gateway status=ok"),
            // Orphaned images are acceptable; the row delete must still run.
            Err(err) => warn!(
                "event=image_delete module=gateway status=error error={}",
                err
            ),
        }
    }
}

/// Builds the per-user storage path for an uploaded image.
pub fn image_object_path(owner_id: UserId, unix_millis: i64, extension: &str) -> String {
    format!("{owner_id}/{unix_millis}.{extension}")
}

/// Extracts the bucket-relative object path from a stored public URL.
///
/// Returns `None` when the URL does not contain the `/{bucket}/` segment or
/// nothing follows it.
pub fn image_path_from_url<'a>(url: &'a str, bucket: &str) -> Option<&'a str> {
    let marker = format!("/{bucket}/");
    let start = url.find(&marker)? + marker.len();
    let path = &url[start..];
    if path.is_empty() {
        None
    } else {
        Some(path)
    }
}

fn decode_article(row: Value) -> GatewayResult<Article> {
    serde_json::from_value(row).map_err(|err| GatewayError::InvalidRecord(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::{image_object_path, image_path_from_url};
    use uuid::Uuid;

    const BUCKET: &str = "article-images";

    #[test]
    fn path_extraction_inverts_public_url_naming() {
        let owner = Uuid::new_v4();
        let path = image_object_path(owner, 1_700_000_000_123, "png");
        let url = format!("https://demo.supabase.co/storage/v1/object/public/{BUCKET}/{path}");
        assert_eq!(image_path_from_url(&url, BUCKET), Some(path.as_str()));
    }

    #[test]
    fn url_without_bucket_segment_yields_none() {
        assert_eq!(
            image_path_from_url("https://cdn.example.com/images/a.png", BUCKET),
            None
        );
        assert_eq!(
            image_path_from_url("https://demo.supabase.co/article-images-old/a.png", BUCKET),
            None
        );
    }

    #[test]
    fn url_ending_at_bucket_segment_yields_none() {
        assert_eq!(
            image_path_from_url("https://demo.supabase.co/public/article-images/", BUCKET),
            None
        );
    }
}
