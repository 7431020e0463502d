use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use tracing::{debug, info};

use super::adapter::{AdapterFactory, Connection, PersistError, PersistenceAdapter, TableWriter};
use super::error::{Result, StoreError};
use super::partitions::{
    encode_counter_key, encode_row_key, encode_row_prefix, encode_unique_key, encode_value,
};
use super::schema::TableSchema;
use super::statement::{Statement, StatementKind};
use super::value::{Record, Value};

/// Fjall-backed table store.
///
/// Cloning is cheap and shares the keyspace. Each Worker gets its own
/// [`FjallConnection`]; constraint checks and the write that follows them
/// are serialized by a store-wide latch so two connections cannot claim
/// the same unique value.
#[derive(Clone)]
pub struct FjallStore {
    keyspace: Keyspace,
    rows: PartitionHandle,
    unique: PartitionHandle,
    metadata: PartitionHandle,
    tables: Arc<BTreeMap<String, TableSchema>>,
    write_latch: Arc<Mutex<()>>,
}

impl FjallStore {
    /// Open or create a Fjall store at the given path with the declared tables
    pub fn open<P: AsRef<Path>>(path: P, tables: BTreeMap<String, TableSchema>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening Fjall store at: {}", path.display());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let keyspace = Config::new(path).open()?;

        let rows = keyspace.open_partition("rows", PartitionCreateOptions::default())?;
        let unique = keyspace.open_partition("unique", PartitionCreateOptions::default())?;
        let metadata = keyspace.open_partition("metadata", PartitionCreateOptions::default())?;

        info!(tables = tables.len(), "Fjall store opened successfully");
        Ok(Self {
            keyspace,
            rows,
            unique,
            metadata,
            tables: Arc::new(tables),
            write_latch: Arc::new(Mutex::new(())),
        })
    }

    pub fn schema(&self, table: &str) -> Result<&TableSchema> {
        self.tables
            .get(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))
    }

    /// Open a new connection to this store
    pub fn connect(&self) -> FjallConnection {
        FjallConnection {
            store: self.clone(),
        }
    }

    /// Open a table writer over a fresh connection
    pub fn writer(&self, table: &str) -> Result<TableWriter<FjallConnection>> {
        let key_column = self.schema(table)?.primary_key.clone();
        Ok(TableWriter::new(self.connect(), table, key_column))
    }

    /// Fetch one row by primary key
    pub fn get(&self, table: &str, pk: &Value) -> Result<Option<Record>> {
        self.schema(table)?;
        let Some(key) = encode_row_key(table, pk) else {
            return Ok(None);
        };
        match self.rows.get(key)? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    /// All rows of `table` in key order
    pub fn rows(&self, table: &str) -> Result<Vec<Record>> {
        self.schema(table)?;
        let mut rows = Vec::new();
        for item in self.rows.prefix(encode_row_prefix(table)) {
            let (_, value) = item?;
            rows.push(serde_json::from_slice(&value)?);
        }
        Ok(rows)
    }

    /// Number of rows in `table`
    pub fn count(&self, table: &str) -> Result<usize> {
        self.schema(table)?;
        let mut count = 0;
        for item in self.rows.prefix(encode_row_prefix(table)) {
            item?;
            count += 1;
        }
        Ok(count)
    }

    /// Persist all pending writes to disk
    pub fn persist(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }

    fn next_id(&self, table: &str) -> Result<i64> {
        let current = self
            .metadata
            .get(encode_counter_key(table))?
            .map(|bytes| i64::from_be_bytes(bytes.as_ref().try_into().unwrap_or([0u8; 8])))
            .unwrap_or(1);
        Ok(current)
    }

    fn unique_owner(&self, key: &[u8]) -> Result<Option<String>> {
        Ok(self
            .unique
            .get(key)?
            .map(|v| String::from_utf8_lossy(&v).to_string()))
    }

    fn insert_row(&self, table: &str, schema: &TableSchema, params: &Record) -> Result<u64> {
        let mut row = schema.coerce_record(table, params)?;
        let pk_column = &schema.primary_key;

        let mut next_counter = None;
        let pk = match row.get(pk_column) {
            Some(Value::Int(n)) if schema.auto_increment => {
                let next = self.next_id(table)?;
                if *n >= next {
                    next_counter = Some(n + 1);
                }
                Value::Int(*n)
            }
            Some(v) if !v.is_null() => v.clone(),
            _ if schema.auto_increment => {
                let id = self.next_id(table)?;
                next_counter = Some(id + 1);
                Value::Int(id)
            }
            _ => return Err(StoreError::MissingKey(table.to_string())),
        };
        row.insert(pk_column.clone(), pk.clone());

        for (column, spec) in &schema.columns {
            if !spec.nullable && row.get(column).is_none_or(Value::is_null) {
                return Err(StoreError::Coercion {
                    table: table.to_string(),
                    column: column.clone(),
                    reason: "field has no default value".to_string(),
                });
            }
        }

        let row_key = encode_row_key(table, &pk).ok_or_else(|| StoreError::MissingKey(table.to_string()))?;
        if self.rows.get(&row_key)?.is_some() {
            return Err(StoreError::UniqueViolation {
                table: table.to_string(),
                column: pk_column.clone(),
                value: pk.to_string(),
            });
        }

        let owner = encode_value(&pk).unwrap_or_default();
        let mut unique_keys = Vec::new();
        for column in &schema.unique {
            let Some(value) = row.get(column) else { continue };
            let Some(key) = encode_unique_key(table, column, value) else { continue };
            if self.unique_owner(&key)?.is_some() {
                return Err(StoreError::UniqueViolation {
                    table: table.to_string(),
                    column: column.clone(),
                    value: value.to_string(),
                });
            }
            unique_keys.push(key);
        }

        let mut batch = self.keyspace.batch();
        batch.insert(&self.rows, row_key, serde_json::to_vec(&row)?);
        for key in unique_keys {
            batch.insert(&self.unique, key, owner.clone().into_bytes());
        }
        if let Some(next) = next_counter {
            batch.insert(&self.metadata, encode_counter_key(table), next.to_be_bytes().to_vec());
        }
        batch.commit()?;

        debug!(table, pk = %pk, "Row inserted");
        Ok(1)
    }

    fn update_row(
        &self,
        table: &str,
        schema: &TableSchema,
        key: &Value,
        fields: &Record,
    ) -> Result<u64> {
        let pk_column = &schema.primary_key;
        if fields.contains_key(pk_column) {
            return Err(StoreError::KeyUpdate {
                table: table.to_string(),
                column: pk_column.clone(),
            });
        }

        let pk = match schema.columns.get(pk_column) {
            Some(spec) => spec.coerce(key).map_err(|reason| StoreError::Coercion {
                table: table.to_string(),
                column: pk_column.clone(),
                reason,
            })?,
            None => key.clone(),
        };
        let fields = schema.coerce_record(table, fields)?;

        let row_key = encode_row_key(table, &pk).ok_or_else(|| StoreError::MissingKey(table.to_string()))?;
        let mut row: Record = match self.rows.get(&row_key)? {
            Some(value) => serde_json::from_slice(&value)?,
            None => return Ok(0),
        };

        let owner = encode_value(&pk).unwrap_or_default();
        let mut released = Vec::new();
        let mut claimed = Vec::new();
        for column in &schema.unique {
            let Some(new_value) = fields.get(column) else { continue };
            let old_value = row.get(column).cloned().unwrap_or(Value::Null);
            if *new_value == old_value {
                continue;
            }
            if let Some(key) = encode_unique_key(table, column, new_value) {
                match self.unique_owner(&key)? {
                    Some(existing) if existing != owner => {
                        return Err(StoreError::UniqueViolation {
                            table: table.to_string(),
                            column: column.clone(),
                            value: new_value.to_string(),
                        });
                    }
                    _ => claimed.push(key),
                }
            }
            if let Some(key) = encode_unique_key(table, column, &old_value) {
                released.push(key);
            }
        }

        row.extend(fields);

        let mut batch = self.keyspace.batch();
        for key in released {
            batch.remove(&self.unique, key);
        }
        for key in claimed {
            batch.insert(&self.unique, key, owner.clone().into_bytes());
        }
        batch.insert(&self.rows, row_key, serde_json::to_vec(&row)?);
        batch.commit()?;

        debug!(table, pk = %pk, "Row updated");
        Ok(1)
    }
}

/// One connection to a [`FjallStore`], owned by a single Worker
pub struct FjallConnection {
    store: FjallStore,
}

impl Connection for FjallConnection {
    fn execute(&mut self, statement: &Statement, params: &Record, key: Option<&Value>) -> Result<u64> {
        let table = statement.table();
        let schema = self.store.schema(table)?;
        let _latch = self
            .store
            .write_latch
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        match (statement.kind(), key) {
            (StatementKind::Insert, _) => self.store.insert_row(table, schema, params),
            (StatementKind::Update, Some(key)) => self.store.update_row(table, schema, key, params),
            (StatementKind::Update, None) => Err(StoreError::MissingKey(table.to_string())),
        }
    }
}

impl Drop for FjallConnection {
    fn drop(&mut self) {
        debug!("Fjall connection released");
    }
}

/// Hands every Worker its own [`TableWriter`] over a fresh connection
#[derive(Clone)]
pub struct FjallWriterFactory {
    store: FjallStore,
    table: String,
}

impl FjallWriterFactory {
    pub fn new(store: FjallStore, table: impl Into<String>) -> Result<Self> {
        let table = table.into();
        store.schema(&table)?;
        Ok(Self { store, table })
    }
}

impl AdapterFactory for FjallWriterFactory {
    fn connect(&self, worker_id: usize) -> std::result::Result<Box<dyn PersistenceAdapter>, PersistError> {
        let writer = self.store.writer(&self.table)?;
        debug!(worker_id, table = %self.table, "Opened table writer");
        Ok(Box::new(writer))
    }
}
