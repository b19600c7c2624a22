//! SQLite-backed `RecordBackend`.
//!
//! # Responsibility
//! - Store rows of any table as JSON objects keyed by `(table, id)`.
//! - Fill server-side defaults (`id`, `created_at`, `updated_at`) the way
//!   the hosted database's column defaults do.
//!
//! # Invariants
//! - `updated_at` is re-stamped on every update.
//! - Ordering ties are broken by insertion sequence in the same direction.
//! - Deleting a missing row is not an error.

use super::{open_db, open_db_in_memory, DbError, DbResult};
use crate::backend::{BackendError, BackendFuture, BackendResult, RecordBackend, SelectQuery};
use chrono::{SecondsFormat, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// Local stand-in for the hosted record store.
pub struct LocalRecordBackend {
    conn: Mutex<Connection>,
}

impl LocalRecordBackend {
    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        Ok(Self::from_connection(open_db(path)?))
    }

    pub fn open_in_memory() -> DbResult<Self> {
        Ok(Self::from_connection(open_db_in_memory()?))
    }

    /// Wraps an already migrated connection.
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(conn) => conn,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn select_rows(&self, table: &str, query: &SelectQuery) -> BackendResult<Vec<Value>> {
        let mut sql = String::from("SELECT id, body FROM records WHERE table_name = ?");
        let mut bind_values = vec![SqlValue::Text(table.to_string())];

        for filter in &query.filters {
            sql.push_str(" AND CAST(json_extract(body, ?) AS TEXT) = ?");
            bind_values.push(SqlValue::Text(json_path(&filter.column)?));
            bind_values.push(SqlValue::Text(filter.value.clone()));
        }

        match query.order.as_ref() {
            Some(order) => {
                let direction = if order.ascending { "ASC" } else { "DESC" };
                sql.push_str(&format!(
                    " ORDER BY json_extract(body, ?) {direction}, seq {direction}"
                ));
                bind_values.push(SqlValue::Text(json_path(&order.column)?));
            }
            None => sql.push_str(" ORDER BY seq ASC"),
        }

        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            bind_values.push(SqlValue::Integer(i64::from(limit)));
        }

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql).map_err(DbError::from)?;
        let mut rows = stmt
            .query(params_from_iter(bind_values))
            .map_err(DbError::from)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(DbError::from)? {
            let id: String = row.get("id").map_err(DbError::from)?;
            let body: String = row.get("body").map_err(DbError::from)?;
            out.push(parse_body(table, &id, &body)?);
        }
        Ok(out)
    }

    fn insert_row(&self, table: &str, row: Value) -> BackendResult<Value> {
        let Value::Object(mut fields) = row else {
            return Err(BackendError::Rejected {
                status: 400,
                message: "row must be a JSON object".to_string(),
            });
        };

        let now = now_timestamp();
        let id = match fields.get("id") {
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            _ => {
                let id = Uuid::new_v4().to_string();
                fields.insert("id".to_string(), Value::String(id.clone()));
                id
            }
        };
        for column in ["created_at", "updated_at"] {
            if !matches!(fields.get(column), Some(Value::String(_))) {
                fields.insert(column.to_string(), Value::String(now.clone()));
            }
        }

        let body = Value::Object(fields);
        self.conn()
            .execute(
                "INSERT INTO records (table_name, id, body) VALUES (?1, ?2, ?3);",
                params![table, id, body.to_string()],
            )
            .map_err(DbError::from)?;
        Ok(body)
    }

    fn update_row(&self, table: &str, id: &str, patch: Value) -> BackendResult<Option<Value>> {
        let Value::Object(patch) = patch else {
            return Err(BackendError::Rejected {
                status: 400,
                message: "patch must be a JSON object".to_string(),
            });
        };

        let conn = self.conn();
        let stored: Option<String> = conn
            .query_row(
                "SELECT body FROM records WHERE table_name = ?1 AND id = ?2;",
                params![table, id],
                |row| row.get(0),
            )
            .optional()
            .map_err(DbError::from)?;
        let Some(stored) = stored else {
            return Ok(None);
        };

        let mut fields = into_object(table, id, parse_body(table, id, &stored)?)?;
        for (column, value) in patch {
            if column != "id" {
                fields.insert(column, value);
            }
        }
        fields.insert("updated_at".to_string(), Value::String(now_timestamp()));

        let body = Value::Object(fields);
        conn.execute(
            "UPDATE records SET body = ?3 WHERE table_name = ?1 AND id = ?2;",
            params![table, id, body.to_string()],
        )
        .map_err(DbError::from)?;
        Ok(Some(body))
    }

    fn delete_row(&self, table: &str, id: &str) -> BackendResult<()> {
        self.conn()
            .execute(
                "DELETE FROM records WHERE table_name = ?1 AND id = ?2;",
                params![table, id],
            )
            .map_err(DbError::from)?;
        Ok(())
    }
}

impl RecordBackend for LocalRecordBackend {
    fn select<'a>(
        &'a self,
        table: &'a str,
        query: &'a SelectQuery,
    ) -> BackendFuture<'a, Vec<Value>> {
        Box::pin(async move { self.select_rows(table, query) })
    }

    fn insert<'a>(&'a self, table: &'a str, row: Value) -> BackendFuture<'a, Value> {
        Box::pin(async move { self.insert_row(table, row) })
    }

    fn update<'a>(
        &'a self,
        table: &'a str,
        id: &'a str,
        patch: Value,
    ) -> BackendFuture<'a, Option<Value>> {
        Box::pin(async move { self.update_row(table, id, patch) })
    }

    fn delete<'a>(&'a self, table: &'a str, id: &'a str) -> BackendFuture<'a, ()> {
        Box::pin(async move { self.delete_row(table, id) })
    }
}

/// RFC 3339 UTC timestamp with microsecond precision; sorts lexically.
fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn json_path(column: &str) -> BackendResult<String> {
    let valid = !column.is_empty()
        && column
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_');
    if !valid {
        return Err(BackendError::Rejected {
            status: 400,
            message: format!("invalid column name `{column}`"),
        });
    }
    Ok(format!("$.{column}"))
}

fn parse_body(table: &str, id: &str, body: &str) -> BackendResult<Value> {
    let value: Value = serde_json::from_str(body)?;
    if !value.is_object() {
        return Err(DbError::CorruptRow {
            table: table.to_string(),
            id: id.to_string(),
        }
        .into());
    }
    Ok(value)
}

fn into_object(table: &str, id: &str, value: Value) -> BackendResult<Map<String, Value>> {
    match value {
        Value::Object(fields) => Ok(fields),
        _ => Err(DbError::CorruptRow {
            table: table.to_string(),
            id: id.to_string(),
        }
        .into()),
    }
}
