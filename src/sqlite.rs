use crate::error::{Error, Result, StatementError};
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{Connection, Statement, ToSql};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::{collections::HashMap, time::Duration};

/// Path understood as "transient in-memory store".
pub const IN_MEMORY: &str = ":memory:";

/// Core value types for SQLite operations
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    Boolean(bool),
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Real(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Blob(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl From<ValueRef<'_>> for Value {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(v) => Value::Integer(v),
            ValueRef::Real(v) => Value::Real(v),
            ValueRef::Text(v) => Value::Text(String::from_utf8_lossy(v).into_owned()),
            ValueRef::Blob(v) => Value::Blob(v.to_vec()),
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::from(rusqlite::types::Null),
            Value::Integer(v) => ToSqlOutput::from(*v),
            Value::Real(v) => ToSqlOutput::from(*v),
            Value::Text(v) => ToSqlOutput::from(v.as_str()),
            Value::Blob(v) => ToSqlOutput::from(v.as_slice()),
            Value::Boolean(v) => ToSqlOutput::from(*v),
        })
    }
}

/// Parameter bindings for SQL statements.
///
/// Positional values bind to `?1`, `?2`, ... in order. Named values bind to
/// `:name` (a bare name gets the `:` prefix).
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Params {
    pub values: HashMap<String, Value>,
    pub positional: Vec<Value>,
}

impl Params {
    /// Create a new Params object
    pub fn new() -> Self {
        Self::default()
    }
    /// Add a named value
    pub fn with_value(mut self, name: &str, value: impl Into<Value>) -> Self {
        let name = if name.starts_with([':', '@', '$']) {
            name.to_string()
        } else {
            format!(":{name}")
        };
        self.values.insert(name, value.into());
        self
    }
    /// Append a positional value
    pub fn with_positional(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }
    pub fn len(&self) -> usize {
        self.values.len() + self.positional.len()
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// SQL statement with typed parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    pub statement: String,
    pub params: Params,
}

impl SqlQuery {
    pub fn new(statement: &str) -> Self {
        Self {
            statement: statement.to_string(),
            params: Params::new(),
        }
    }
    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }
}

impl From<&str> for SqlQuery {
    fn from(statement: &str) -> Self {
        SqlQuery::new(statement)
    }
}

impl From<String> for SqlQuery {
    fn from(statement: String) -> Self {
        Self {
            statement,
            params: Params::new(),
        }
    }
}

impl From<&SqlQuery> for SqlQuery {
    fn from(query: &SqlQuery) -> Self {
        query.clone()
    }
}

/// Outcome of a non-query statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MutationResult {
    /// Row id produced by the most recent successful INSERT on this handle.
    pub last_insert_id: i64,
    /// Rows written by this statement; 0 for DDL.
    pub changes: usize,
}

/// One row of a result set. Columns keep the order of the SELECT list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    columns: Vec<(String, Value)>,
}

impl Record {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            columns: iter.into_iter().collect(),
        }
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (name, value) in &self.columns {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// SQLite connection configuration
#[derive(Debug, Clone, PartialEq)]
pub struct SqliteConfig {
    /// Path to the SQLite database file, or `:memory:`
    pub db_path: String,
    /// How long a statement waits on a locked database before failing
    pub busy_timeout: Duration,
}

impl SqliteConfig {
    /// Create a new SQLite config for a database file
    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
            ..Self::default()
        }
    }

    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }

    pub fn is_in_memory(&self) -> bool {
        self.db_path == IN_MEMORY
    }
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            db_path: IN_MEMORY.to_string(),
            busy_timeout: Duration::from_millis(5000),
        }
    }
}

/// An exclusively owned SQLite handle.
///
/// Every call blocks until the store reports completion. After [`close`]
/// every operation fails with [`Error::HandleClosed`].
///
/// [`close`]: Database::close
pub struct Database {
    path: String,
    connection: Option<Connection>,
}

impl Database {
    pub fn open(config: &SqliteConfig) -> Result<Self> {
        let opened = if config.is_in_memory() {
            Connection::open_in_memory()
        } else {
            Connection::open(&config.db_path)
        };
        let connection = opened
            .and_then(|conn| {
                conn.busy_timeout(config.busy_timeout)?;
                Ok(conn)
            })
            .map_err(|err| Error::Connection {
                path: config.db_path.clone(),
                message: err.to_string(),
            })?;

        log::debug!("opened sqlite database at {}", config.db_path);
        Ok(Self {
            path: config.db_path.clone(),
            connection: Some(connection),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open(&SqliteConfig::in_memory())
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.connection.is_some()
    }

    /// Run a non-query statement.
    ///
    /// `changes` counts only rows written by this statement, so DDL reports 0.
    pub fn execute(&self, query: impl Into<SqlQuery>) -> Result<MutationResult> {
        let query = query.into();
        let conn = self.connection()?;
        log::trace!("execute: {}", query.statement);
        let sql_err = |err| StatementError::from_sqlite(err, &query.statement);

        let mut stmt = prepare(conn, &query)?;
        if stmt.column_count() > 0 {
            return Err(sql_err(rusqlite::Error::ExecuteReturnedResults).into());
        }
        let before = total_changes(conn).map_err(sql_err)?;
        stmt.raw_execute().map_err(sql_err)?;
        let last_insert_id = conn.last_insert_rowid();
        let after = total_changes(conn).map_err(sql_err)?;

        Ok(MutationResult {
            last_insert_id,
            changes: usize::try_from(after - before).unwrap_or(0),
        })
    }

    /// Run a query and collect every row before returning.
    pub fn query(&self, query: impl Into<SqlQuery>) -> Result<Vec<Record>> {
        let query = query.into();
        let conn = self.connection()?;
        log::trace!("query: {}", query.statement);

        let mut stmt = prepare(conn, &query)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let sql_err = |err| StatementError::from_sqlite(err, &query.statement);

        let mut rows = stmt.raw_query();
        let mut records = Vec::new();
        while let Some(row) = rows.next().map_err(sql_err)? {
            let mut values = Vec::with_capacity(columns.len());
            for (index, name) in columns.iter().enumerate() {
                let value = row.get_ref(index).map_err(sql_err)?;
                values.push((name.clone(), Value::from(value)));
            }
            records.push(Record { columns: values });
        }
        log::trace!("query returned {} rows", records.len());
        Ok(records)
    }

    /// Release the connection. Returns once the store has finished closing.
    pub fn close(&mut self) -> Result<()> {
        let connection = self.connection.take().ok_or(Error::HandleClosed)?;
        match connection.close() {
            Ok(()) => {
                log::debug!("closed sqlite database at {}", self.path);
                Ok(())
            }
            Err((_connection, err)) => Err(Error::Close {
                message: err.to_string(),
            }),
        }
    }

    fn connection(&self) -> Result<&Connection> {
        self.connection.as_ref().ok_or(Error::HandleClosed)
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if self.connection.is_some() {
            log::warn!("sqlite database at {} dropped without close", self.path);
        }
    }
}

fn prepare<'c>(
    conn: &'c Connection,
    query: &SqlQuery,
) -> std::result::Result<Statement<'c>, StatementError> {
    let sql = query.statement.as_str();
    let params = &query.params;
    let mut stmt = conn
        .prepare(sql)
        .map_err(|err| StatementError::from_sqlite(err, sql))?;

    // empty or comment-only text prepares to a null statement
    if stmt.expanded_sql().is_none() {
        return Err(StatementError::new("statement contains no SQL", sql));
    }
    if !params.positional.is_empty() && !params.values.is_empty() {
        return Err(StatementError::new(
            "cannot mix positional and named parameters in one statement",
            sql,
        ));
    }
    let expected = stmt.parameter_count();
    if params.len() != expected {
        return Err(StatementError::new(
            format!(
                "wrong number of parameters: statement expects {expected}, got {}",
                params.len()
            ),
            sql,
        ));
    }

    for (index, value) in params.positional.iter().enumerate() {
        stmt.raw_bind_parameter(index + 1, value)
            .map_err(|err| StatementError::from_sqlite(err, sql))?;
    }
    for (name, value) in &params.values {
        let index = stmt
            .parameter_index(name)
            .map_err(|err| StatementError::from_sqlite(err, sql))?
            .ok_or_else(|| StatementError::new(format!("unknown parameter {name}"), sql))?;
        stmt.raw_bind_parameter(index, value)
            .map_err(|err| StatementError::from_sqlite(err, sql))?;
    }
    Ok(stmt)
}

/// Rows written by INSERT, UPDATE and DELETE since the connection opened.
fn total_changes(conn: &Connection) -> rusqlite::Result<i64> {
    conn.prepare_cached("SELECT total_changes()")?
        .query_row([], |row| row.get(0))
}
