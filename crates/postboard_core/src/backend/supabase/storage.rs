//! Supabase Storage adapter.

use super::{send, SupabaseClient};
use crate::backend::{BackendFuture, ObjectStorage};
use reqwest::Method;
use serde_json::json;

/// `ObjectStorage` over Supabase's `/storage/v1` endpoint.
pub struct SupabaseStorage {
    client: SupabaseClient,
}

impl SupabaseStorage {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }
}

impl ObjectStorage for SupabaseStorage {
    fn upload<'a>(
        &'a self,
        bucket: &'a str,
        path: &'a str,
        bytes: Vec<u8>,
        content_type: &'a str,
    ) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            let url = self
                .client
                .endpoint(&format!("storage/v1/object/{bucket}/{path}"))?;
            let request = self
                .client
                .request(Method::POST, url)
                .header("Content-Type", content_type)
                .header("x-upsert", "false")
                .body(bytes);
            send(request).await?;
            Ok(())
        })
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!(
            "{}storage/v1/object/public/{bucket}/{path}",
            self.client.base_url()
        )
    }

    fn remove<'a>(&'a self, bucket: &'a str, paths: &'a [String]) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            let url = self
                .client
                .endpoint(&format!("storage/v1/object/{bucket}"))?;
            let request = self
                .client
                .request(Method::DELETE, url)
                .json(&json!({ "prefixes": paths }));
            send(request).await?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::SupabaseStorage;
    use crate::backend::supabase::SupabaseClient;
    use crate::backend::ObjectStorage;
    use crate::config::BackendConfig;

    #[test]
    fn public_url_is_under_public_object_path() {
        let config = BackendConfig::new("https://demo.supabase.co", "anon").unwrap();
        let storage = SupabaseStorage::new(SupabaseClient::new(&config));
        assert_eq!(
            storage.public_url("article-images", "u1/1700000000000.png"),
            "https://demo.supabase.co/storage/v1/object/public/article-images/u1/1700000000000.png"
        );
    }
}
