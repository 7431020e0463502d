//! Idempotent write adapter with a per-connection statement cache

use thiserror::Error;
use tracing::debug;

use super::error::StoreError;
use super::statement::Statement;
use super::value::{Record, Value};

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("duplicate entry: {0}")]
    Duplicate(String),

    #[error("value coercion failed: {0}")]
    Coercion(String),

    #[error("record fields {found:?} do not match cached statement columns {expected:?}")]
    FieldSetMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("store error: {0}")]
    Store(StoreError),
}

impl PersistError {
    /// Constraint violations and coercion warnings leave the row untouched
    /// and are safe to skip; everything else is a real write failure.
    pub fn is_ignorable(&self) -> bool {
        matches!(self, PersistError::Duplicate(_) | PersistError::Coercion(_))
    }
}

impl From<StoreError> for PersistError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation { .. } => PersistError::Duplicate(err.to_string()),
            StoreError::Coercion { .. } => PersistError::Coercion(err.to_string()),
            other => PersistError::Store(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, PersistError>;

/// Sink for processed records.
///
/// Both operations are idempotent: repeating one leaves the stored state
/// as the first successful application left it.
pub trait PersistenceAdapter: Send {
    /// Create a row for `record`; a duplicate reports `PersistError::Duplicate`
    /// and writes nothing.
    fn insert_if_absent(&mut self, record: &Record) -> Result<()>;

    /// Apply `fields` to the row whose primary key equals `key`.
    fn update_by_key(&mut self, key: &Value, fields: &Record) -> Result<()>;
}

/// Opens one exclusively owned adapter per Worker.
///
/// Failing here is fatal for the pool being constructed.
pub trait AdapterFactory: Send + Sync {
    fn connect(&self, worker_id: usize) -> Result<Box<dyn PersistenceAdapter>>;
}

/// A single store connection that executes compiled statements.
///
/// Every call is committed on its own; there is no multi-statement
/// transaction.
pub trait Connection: Send {
    /// Execute `statement` with `params` (and the row `key` for updates),
    /// returning the number of affected rows.
    fn execute(
        &mut self,
        statement: &Statement,
        params: &Record,
        key: Option<&Value>,
    ) -> std::result::Result<u64, StoreError>;
}

/// Table-bound [`PersistenceAdapter`] over one exclusively owned connection.
///
/// The insert and update statements are compiled from the first record
/// each operation sees and reused for the lifetime of the writer.
pub struct TableWriter<C> {
    conn: C,
    table: String,
    key_column: String,
    insert_stmt: Option<Statement>,
    update_stmt: Option<Statement>,
    compiled: usize,
}

impl<C: Connection> TableWriter<C> {
    pub fn new(conn: C, table: impl Into<String>, key_column: impl Into<String>) -> Self {
        Self {
            conn,
            table: table.into(),
            key_column: key_column.into(),
            insert_stmt: None,
            update_stmt: None,
            compiled: 0,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Number of statements compiled by this writer so far
    pub fn statements_compiled(&self) -> usize {
        self.compiled
    }

    pub fn connection(&self) -> &C {
        &self.conn
    }

    fn check_binds(statement: &Statement, record: &Record) -> Result<()> {
        if statement.binds(record) {
            return Ok(());
        }
        Err(PersistError::FieldSetMismatch {
            expected: statement.columns().to_vec(),
            found: record.keys().cloned().collect(),
        })
    }
}

impl<C: Connection> PersistenceAdapter for TableWriter<C> {
    fn insert_if_absent(&mut self, record: &Record) -> Result<()> {
        let stmt = self.insert_stmt.get_or_insert_with(|| {
            let stmt = Statement::insert(&self.table, record);
            debug!(table = %self.table, statement = %stmt, "Compiled insert statement");
            self.compiled += 1;
            stmt
        });

        Self::check_binds(stmt, record)?;
        self.conn.execute(stmt, record, None)?;
        Ok(())
    }

    fn update_by_key(&mut self, key: &Value, fields: &Record) -> Result<()> {
        let stmt = self.update_stmt.get_or_insert_with(|| {
            let stmt = Statement::update(&self.table, &self.key_column, fields);
            debug!(table = %self.table, statement = %stmt, "Compiled update statement");
            self.compiled += 1;
            stmt
        });

        Self::check_binds(stmt, fields)?;
        let affected = self.conn.execute(stmt, fields, Some(key))?;
        if affected == 0 {
            debug!(table = %self.table, %key, "Update matched no row");
        }
        Ok(())
    }
}
