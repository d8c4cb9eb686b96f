use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;

use crate::application::errors::StorageError;
use crate::domain::traits::store::Row;

/// One persisted record of a successful command invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditLogEntry {
    pub id: i64,
    pub group_id: String,
    pub user_id: String,
    pub command_id: Option<String>,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AuditLogEntry {
    /// Decode an untyped storage row. Anything that does not match the
    /// audit schema is a [`StorageError::Decode`].
    pub fn from_row(row: &Row) -> Result<Self, StorageError> {
        Ok(Self {
            id: required_i64(row, "id")?,
            group_id: required_str(row, "group_id")?,
            user_id: required_str(row, "user_id")?,
            command_id: optional_str(row, "command_id")?,
            message: optional_str(row, "message")?,
            created_at: timestamp(row, "created_at")?,
        })
    }
}

fn decode_err(field: &str, reason: impl Into<String>) -> StorageError {
    StorageError::Decode {
        field: field.to_string(),
        reason: reason.into(),
    }
}

fn required<'a>(row: &'a Row, field: &str) -> Result<&'a Value, StorageError> {
    match row.get(field) {
        None => Err(decode_err(field, "column missing")),
        Some(Value::Null) => Err(decode_err(field, "unexpected null")),
        Some(value) => Ok(value),
    }
}

fn required_i64(row: &Row, field: &str) -> Result<i64, StorageError> {
    required(row, field)?
        .as_i64()
        .ok_or_else(|| decode_err(field, "expected integer"))
}

fn required_str(row: &Row, field: &str) -> Result<String, StorageError> {
    required(row, field)?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| decode_err(field, "expected text"))
}

fn optional_str(row: &Row, field: &str) -> Result<Option<String>, StorageError> {
    match row.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(decode_err(field, "expected text or null")),
    }
}

fn timestamp(row: &Row, field: &str) -> Result<DateTime<Utc>, StorageError> {
    let raw = required_str(row, field)?;
    // SQLite's datetime('now') format, with RFC 3339 accepted for rows written elsewhere
    if let Ok(naive) = NaiveDateTime::parse_from_str(&raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(naive.and_utc());
    }
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| decode_err(field, format!("bad timestamp '{}': {}", raw, e)))
}
