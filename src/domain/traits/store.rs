use async_trait::async_trait;
use serde_json::Value;

use crate::application::errors::StorageError;

/// One untyped result row, column name to value
pub type Row = serde_json::Map<String, Value>;

/// Outcome of a single statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    /// Rows changed for writes, rows returned for reads
    pub row_count: usize,
    pub rows: Vec<Row>,
}

/// Store trait - parameterized access to the relational store.
///
/// Each call runs on one pooled connection, acquired and released within
/// the call.
#[async_trait]
pub trait StorageGateway: Send + Sync {
    async fn execute(&self, query: &str, params: Vec<Value>) -> Result<QueryResult, StorageError>;
}
