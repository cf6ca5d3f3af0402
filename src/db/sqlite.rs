use super::{DataStore, Row, SqlValue, Statement};
use crate::errors::{AppError, AppResult};
use async_trait::async_trait;
use rusqlite::{params_from_iter, Connection};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

const SCHEMA_SQL: &str = include_str!("schema.sql");

/// SQLite-backed store. Statements run on the blocking pool so the calling task only
/// yields while a query is outstanding.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    ready: AtomicBool,
    db_path: Option<PathBuf>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::bootstrap(conn, Some(path.to_path_buf()))
    }

    pub fn open_in_memory() -> AppResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::bootstrap(conn, None)
    }

    fn bootstrap(conn: Connection, db_path: Option<PathBuf>) -> AppResult<Self> {
        conn.execute_batch(SCHEMA_SQL)?;
        tracing::info!(
            path = %db_path.as_deref().map(|p| p.to_string_lossy().to_string()).unwrap_or_else(|| ":memory:".to_string()),
            "activity store schema ready"
        );
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            ready: AtomicBool::new(true),
            db_path,
        })
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Toggles the readiness flag, e.g. while the host runs maintenance on the file.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    async fn with_conn<T, F>(&self, op: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> AppResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
            op(&mut guard)
        })
        .await?
    }
}

fn read_rows(conn: &Connection, sql: &str, params: &[SqlValue], limit: Option<usize>) -> AppResult<Vec<Row>> {
    let mut statement = conn.prepare(sql)?;
    let names: Vec<String> = statement
        .column_names()
        .into_iter()
        .map(ToString::to_string)
        .collect();
    let mut rows = statement.query(params_from_iter(params.iter()))?;
    let mut result = Vec::new();
    while let Some(row) = rows.next()? {
        let mut record = Row::new();
        for (index, name) in names.iter().enumerate() {
            record.insert(name, SqlValue::from(row.get_ref(index)?));
        }
        result.push(record);
        if limit.is_some_and(|limit| result.len() >= limit) {
            break;
        }
    }
    Ok(result)
}

#[async_trait]
impl DataStore for SqliteStore {
    fn is_initialized(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn fetch_one(&self, sql: &str, params: &[SqlValue]) -> AppResult<Option<Row>> {
        let sql = sql.to_string();
        let params = params.to_vec();
        self.with_conn(move |conn| Ok(read_rows(conn, &sql, &params, Some(1))?.into_iter().next()))
            .await
    }

    async fn fetch_all(&self, sql: &str, params: &[SqlValue]) -> AppResult<Vec<Row>> {
        let sql = sql.to_string();
        let params = params.to_vec();
        self.with_conn(move |conn| read_rows(conn, &sql, &params, None)).await
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> AppResult<u64> {
        let sql = sql.to_string();
        let params = params.to_vec();
        self.with_conn(move |conn| {
            let affected = conn.execute(&sql, params_from_iter(params.iter()))?;
            Ok(affected as u64)
        })
        .await
    }

    async fn execute_in_transaction(&self, statements: Vec<Statement>) -> AppResult<Option<Vec<u64>>> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let mut counts = Vec::with_capacity(statements.len());
            for statement in &statements {
                let affected = tx.execute(&statement.sql, params_from_iter(statement.params.iter()))? as u64;
                if statement.required && affected == 0 {
                    return Ok(None);
                }
                counts.push(affected);
            }
            tx.commit()?;
            Ok(Some(counts))
        })
        .await
    }
}
