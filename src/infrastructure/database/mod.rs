//! SQLite-backed storage gateway over an r2d2 connection pool

use std::path::Path;

use async_trait::async_trait;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection};
use serde_json::Value;

use crate::application::errors::StorageError;
use crate::domain::traits::{QueryResult, Row, StorageGateway};

/// [`StorageGateway`] over a pool of SQLite connections; statements run on
/// the blocking pool
#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteStore {
    pub fn new(pool: Pool<SqliteConnectionManager>) -> Self {
        Self { pool }
    }

    pub fn open(path: impl AsRef<Path>, pool_size: usize) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let max_size = u32::try_from(pool_size)
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| StorageError::Pool(format!("invalid pool size {}", pool_size)))?;

        let manager = SqliteConnectionManager::file(path)
            .with_init(|conn| conn.execute_batch("PRAGMA busy_timeout=5000; PRAGMA journal_mode=WAL;"));
        let pool = Pool::builder()
            .max_size(max_size)
            .build(manager)
            .map_err(|e| StorageError::Pool(e.to_string()))?;

        tracing::info!("Opened database {} with {} connection(s)", path.display(), max_size);
        Ok(Self::new(pool))
    }

    /// Single shared in-memory connection. It is never recycled, since a
    /// fresh connection would start on an empty database.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let pool = Pool::builder()
            .max_size(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .build(SqliteConnectionManager::memory())
            .map_err(|e| StorageError::Pool(e.to_string()))?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &Pool<SqliteConnectionManager> {
        &self.pool
    }
}

#[async_trait]
impl StorageGateway for SqliteStore {
    async fn execute(&self, query: &str, params: Vec<Value>) -> Result<QueryResult, StorageError> {
        let pool = self.pool.clone();
        let query = query.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get().map_err(|e| StorageError::Pool(e.to_string()))?;
            run_statement(&conn, &query, params)
        })
        .await
        .map_err(|e| StorageError::Join(e.to_string()))?
    }
}

fn run_statement(conn: &Connection, query: &str, params: Vec<Value>) -> Result<QueryResult, StorageError> {
    let params = params.into_iter().map(to_sql_value).collect::<Result<Vec<_>, _>>()?;
    let mut stmt = conn.prepare(query)?;

    if stmt.column_count() == 0 {
        let changed = stmt.execute(params_from_iter(params))?;
        return Ok(QueryResult {
            row_count: changed,
            rows: Vec::new(),
        });
    }

    let columns: Vec<String> = stmt.column_names().into_iter().map(str::to_string).collect();
    let mut rows = stmt.query(params_from_iter(params))?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut record = Row::new();
        for (idx, name) in columns.iter().enumerate() {
            record.insert(name.clone(), from_sql_value(row.get_ref(idx)?));
        }
        out.push(record);
    }

    Ok(QueryResult {
        row_count: out.len(),
        rows: out,
    })
}

fn to_sql_value(value: Value) -> Result<SqlValue, StorageError> {
    Ok(match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(b as i64),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s),
        other => {
            return Err(StorageError::Decode {
                field: "parameter".to_string(),
                reason: format!("unsupported parameter value: {}", other),
            })
        }
    })
}

fn from_sql_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Value::from(f),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Array(b.iter().map(|byte| Value::from(*byte)).collect()),
    }
}
