//! Audit log service - writes and reads invocation records

use std::sync::Arc;

use serde_json::{json, Value};

use crate::application::errors::StorageError;
use crate::domain::entities::AuditLogEntry;
use crate::domain::traits::StorageGateway;

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS audit_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    group_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    command_id TEXT,
    message TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
)";

const CREATE_INDEX: &str = "CREATE INDEX IF NOT EXISTS idx_audit_log_group ON audit_log(group_id)";

const COLUMNS: &str = "id, group_id, user_id, command_id, message, created_at";

/// Access to the audit table through the storage gateway
#[derive(Clone)]
pub struct AuditLog {
    store: Arc<dyn StorageGateway>,
}

impl AuditLog {
    pub fn new(store: Arc<dyn StorageGateway>) -> Self {
        Self { store }
    }

    /// Idempotent schema bootstrap
    pub async fn ensure_schema(&self) -> Result<(), StorageError> {
        self.store.execute(CREATE_TABLE, vec![]).await?;
        self.store.execute(CREATE_INDEX, vec![]).await?;
        Ok(())
    }

    /// Best-effort insert: failures are logged and swallowed so the command
    /// that already ran is not affected.
    pub async fn record_invocation(
        &self,
        group_id: &str,
        user_id: &str,
        command_id: Option<&str>,
        raw_text: Option<&str>,
    ) {
        let result = self
            .store
            .execute(
                "INSERT INTO audit_log (group_id, user_id, command_id, message) VALUES (?1, ?2, ?3, ?4)",
                vec![json!(group_id), json!(user_id), json!(command_id), json!(raw_text)],
            )
            .await;

        if let Err(e) = result {
            tracing::warn!(
                group_id,
                user_id,
                command_id = command_id.unwrap_or("-"),
                "Failed to write audit entry: {}",
                e
            );
        }
    }

    /// Every entry of a group, oldest first
    pub async fn entries(&self, group_id: &str) -> Result<Vec<AuditLogEntry>, StorageError> {
        let result = self
            .store
            .execute(
                &format!("SELECT {COLUMNS} FROM audit_log WHERE group_id = ?1 ORDER BY id ASC"),
                vec![json!(group_id)],
            )
            .await?;

        result.rows.iter().map(AuditLogEntry::from_row).collect()
    }

    pub async fn entry(&self, group_id: &str, id: i64) -> Result<Option<AuditLogEntry>, StorageError> {
        let result = self
            .store
            .execute(
                &format!("SELECT {COLUMNS} FROM audit_log WHERE group_id = ?1 AND id = ?2"),
                vec![json!(group_id), Value::from(id)],
            )
            .await?;

        result.rows.first().map(AuditLogEntry::from_row).transpose()
    }
}
