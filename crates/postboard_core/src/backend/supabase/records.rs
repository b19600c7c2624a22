//! PostgREST record adapter.

use super::{send, send_json, SupabaseClient};
use crate::backend::{BackendError, BackendFuture, BackendResult, RecordBackend, SelectQuery};
use reqwest::Method;
use serde_json::Value;
use url::Url;

const RETURN_REPRESENTATION: &str = "return=representation";

/// `RecordBackend` over Supabase's `/rest/v1` endpoint.
pub struct SupabaseRecords {
    client: SupabaseClient,
}

impl SupabaseRecords {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }

    fn table_url(&self, table: &str) -> BackendResult<Url> {
        self.client.endpoint(&format!("rest/v1/{table}"))
    }

    fn row_url(&self, table: &str, id: &str) -> BackendResult<Url> {
        let mut url = self.table_url(table)?;
        url.query_pairs_mut().append_pair("id", &format!("eq.{id}"));
        Ok(url)
    }
}

fn into_rows(body: Value) -> BackendResult<Vec<Value>> {
    match body {
        Value::Array(rows) => Ok(rows),
        Value::Null => Ok(Vec::new()),
        other => Err(BackendError::InvalidResponse(format!(
            "expected row array, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl RecordBackend for SupabaseRecords {
    fn select<'a>(
        &'a self,
        table: &'a str,
        query: &'a SelectQuery,
    ) -> BackendFuture<'a, Vec<Value>> {
        Box::pin(async move {
            let mut url = self.table_url(table)?;
            {
                let mut pairs = url.query_pairs_mut();
                pairs.append_pair("select", "*");
                for filter in &query.filters {
                    pairs.append_pair(&filter.column, &format!("eq.{}", filter.value));
                }
                if let Some(order) = query.order.as_ref() {
                    let direction = if order.ascending { "asc" } else { "desc" };
                    pairs.append_pair("order", &format!("{}.{direction}", order.column));
                }
                if let Some(limit) = query.limit {
                    pairs.append_pair("limit", &limit.to_string());
                }
            }
            into_rows(send_json(self.client.request(Method::GET, url)).await?)
        })
    }

    fn insert<'a>(&'a self, table: &'a str, row: Value) -> BackendFuture<'a, Value> {
        Box::pin(async move {
            let url = self.table_url(table)?;
            let request = self
                .client
                .request(Method::POST, url)
                .header("Prefer", RETURN_REPRESENTATION)
                .json(&row);
            into_rows(send_json(request).await?)?
                .into_iter()
                .next()
                .ok_or_else(|| {
                    BackendError::InvalidResponse("insert returned no representation".to_string())
                })
        })
    }

    fn update<'a>(
        &'a self,
        table: &'a str,
        id: &'a str,
        patch: Value,
    ) -> BackendFuture<'a, Option<Value>> {
        Box::pin(async move {
            let url = self.row_url(table, id)?;
            let request = self
                .client
                .request(Method::PATCH, url)
                .header("Prefer", RETURN_REPRESENTATION)
                .json(&patch);
            Ok(into_rows(send_json(request).await?)?.into_iter().next())
        })
    }

    fn delete<'a>(&'a self, table: &'a str, id: &'a str) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            let url = self.row_url(table, id)?;
            send(self.client.request(Method::DELETE, url)).await?;
            Ok(())
        })
    }
}
