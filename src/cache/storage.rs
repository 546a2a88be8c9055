//! Store trait and SQLite implementation.

use rusqlite::{params, types::ToSql, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::error::StorageError;

use super::traits::{IndexValue, Record, Table};

type Result<T> = std::result::Result<T, StorageError>;

/// Trait for durable storage backends.
///
/// Every method runs as one critical section, so two writers can never
/// interleave (e.g. a clear-then-repopulate racing an append).
pub trait Store: Send + Sync + 'static {
  /// Clear the table and install `items` atomically.
  fn replace_all<T: Record>(&self, items: &[T]) -> Result<()>;

  /// Read the table, transform it, and install the result, all in one
  /// transaction. Returns what was installed.
  fn replace_with<T, F>(&self, f: F) -> Result<Vec<T>>
  where
    T: Record,
    F: FnOnce(Vec<T>) -> Vec<T>;

  /// All rows in key order.
  fn get_all<T: Record>(&self) -> Result<Vec<T>>;

  /// All rows ordered by a secondary index, ties broken by key.
  fn get_all_ordered<T: Record>(&self, index: &str) -> Result<Vec<T>>;

  /// Rows whose secondary index equals `value`.
  fn find_by<T: Record>(&self, index: &str, value: IndexValue) -> Result<Vec<T>>;

  fn get<T: Record>(&self, key: i64) -> Result<Option<T>>;

  /// Insert a row, returning its key (assigned when the item has none).
  fn add<T: Record>(&self, item: &T) -> Result<i64>;

  /// Overwrite an existing row.
  fn update<T: Record>(&self, item: &T) -> Result<()>;

  /// Read-modify-write one row without releasing the store in between.
  fn modify<T, F>(&self, key: i64, f: F) -> Result<T>
  where
    T: Record,
    F: FnOnce(&mut T);

  /// Delete one row. Returns whether it existed.
  fn remove<T: Record>(&self, key: i64) -> Result<bool>;

  fn clear<T: Record>(&self) -> Result<()>;

  fn count<T: Record>(&self) -> Result<usize>;

  /// Empty every table.
  fn clear_all(&self) -> Result<()>;
}

/// SQLite-based store.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open (or create) the store at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(path)?;
    Self::with_connection(conn)
  }

  /// Open the store at the default location.
  pub fn open_default() -> Result<Self> {
    Self::open(&Self::default_path()?)
  }

  /// Non-durable store, used by tests and when no data directory exists.
  pub fn open_in_memory() -> Result<Self> {
    Self::with_connection(Connection::open_in_memory()?)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| {
        StorageError::Io(std::io::Error::new(
          std::io::ErrorKind::NotFound,
          "could not determine data directory",
        ))
      })?;

    Ok(data_dir.join("storefront-offline").join("offline.db"))
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    conn.execute_batch(SCHEMA)?;
    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|_| StorageError::LockPoisoned)
  }
}

/// Schema for the three durable tables.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS products (
    id INTEGER PRIMARY KEY,
    category TEXT NOT NULL,
    data BLOB NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_products_category ON products(category);

CREATE TABLE IF NOT EXISTS cart_items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    product_id INTEGER NOT NULL,
    data BLOB NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_cart_items_product ON cart_items(product_id);

CREATE TABLE IF NOT EXISTS sync_queue (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    action_type TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    data BLOB NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sync_queue_type ON sync_queue(action_type);
CREATE INDEX IF NOT EXISTS idx_sync_queue_timestamp ON sync_queue(timestamp);
"#;

impl Store for SqliteStore {
  fn replace_all<T: Record>(&self, items: &[T]) -> Result<()> {
    let mut conn = self.lock()?;
    let tx = conn.transaction()?;

    tx.execute(&format!("DELETE FROM {}", T::table().name()), [])?;
    for item in items {
      install_row(&tx, item)?;
    }

    // Dropping an uncommitted transaction rolls it back, so an error above
    // leaves the previous rows in place.
    tx.commit()?;
    Ok(())
  }

  fn replace_with<T, F>(&self, f: F) -> Result<Vec<T>>
  where
    T: Record,
    F: FnOnce(Vec<T>) -> Vec<T>,
  {
    let mut conn = self.lock()?;
    let tx = conn.transaction()?;

    let table = T::table().name();
    let sql = format!("SELECT id, data FROM {} ORDER BY id", table);
    let current: Vec<T> = query_rows(&tx, &sql, [])?;
    let mut next = f(current);

    tx.execute(&format!("DELETE FROM {}", table), [])?;
    for item in &mut next {
      let key = install_row(&tx, item)?;
      item.set_key(key);
    }

    tx.commit()?;
    Ok(next)
  }

  fn get_all<T: Record>(&self) -> Result<Vec<T>> {
    let conn = self.lock()?;
    let sql = format!("SELECT id, data FROM {} ORDER BY id", T::table().name());
    query_rows(&conn, &sql, [])
  }

  fn get_all_ordered<T: Record>(&self, index: &str) -> Result<Vec<T>> {
    let table = T::table();
    let column = table
      .check_index(index)
      .ok_or_else(|| StorageError::UnknownIndex {
        table: table.name(),
        index: index.to_string(),
      })?;

    let conn = self.lock()?;
    let sql = format!(
      "SELECT id, data FROM {} ORDER BY {}, id",
      table.name(),
      column
    );
    query_rows(&conn, &sql, [])
  }

  fn find_by<T: Record>(&self, index: &str, value: IndexValue) -> Result<Vec<T>> {
    let table = T::table();
    let column = table
      .check_index(index)
      .ok_or_else(|| StorageError::UnknownIndex {
        table: table.name(),
        index: index.to_string(),
      })?;

    let conn = self.lock()?;
    let sql = format!(
      "SELECT id, data FROM {} WHERE {} = ? ORDER BY id",
      table.name(),
      column
    );
    query_rows(&conn, &sql, params![value])
  }

  fn get<T: Record>(&self, key: i64) -> Result<Option<T>> {
    let conn = self.lock()?;
    get_row(&conn, key)
  }

  fn add<T: Record>(&self, item: &T) -> Result<i64> {
    let conn = self.lock()?;
    insert_row(&conn, item, item.key(), "INSERT")
  }

  fn update<T: Record>(&self, item: &T) -> Result<()> {
    let table = T::table();
    let key = item.key().ok_or(StorageError::MissingKey {
      table: table.name(),
    })?;

    let conn = self.lock()?;
    update_row(&conn, key, item)
  }

  fn modify<T, F>(&self, key: i64, f: F) -> Result<T>
  where
    T: Record,
    F: FnOnce(&mut T),
  {
    let mut conn = self.lock()?;
    let tx = conn.transaction()?;

    let mut item: T = get_row(&tx, key)?.ok_or(StorageError::NotFound {
      table: T::table().name(),
      key,
    })?;
    f(&mut item);
    item.set_key(key);
    update_row(&tx, key, &item)?;

    tx.commit()?;
    Ok(item)
  }

  fn remove<T: Record>(&self, key: i64) -> Result<bool> {
    let conn = self.lock()?;
    let deleted = conn.execute(
      &format!("DELETE FROM {} WHERE id = ?", T::table().name()),
      params![key],
    )?;
    Ok(deleted > 0)
  }

  fn clear<T: Record>(&self) -> Result<()> {
    let conn = self.lock()?;
    conn.execute(&format!("DELETE FROM {}", T::table().name()), [])?;
    Ok(())
  }

  fn count<T: Record>(&self) -> Result<usize> {
    let conn = self.lock()?;
    let count: i64 = conn.query_row(
      &format!("SELECT COUNT(*) FROM {}", T::table().name()),
      [],
      |row| row.get(0),
    )?;
    Ok(usize::try_from(count).unwrap_or_default())
  }

  fn clear_all(&self) -> Result<()> {
    let mut conn = self.lock()?;
    let tx = conn.transaction()?;
    for table in Table::ALL {
      tx.execute(&format!("DELETE FROM {}", table.name()), [])?;
    }
    tx.commit()?;
    Ok(())
  }
}

/// Insert one row of a replacement set. Auto-keyed rows get fresh keys so
/// key order follows the order of the set.
fn install_row<T: Record>(conn: &Connection, item: &T) -> Result<i64> {
  let key = if T::table().auto_key() {
    None
  } else {
    item.key()
  };
  // Upstream payloads may repeat a key; the last one wins.
  insert_row(conn, item, key, "INSERT OR REPLACE")
}

/// Insert one row with the given verb (`INSERT` or `INSERT OR REPLACE`).
fn insert_row<T: Record>(
  conn: &Connection,
  item: &T,
  key: Option<i64>,
  verb: &str,
) -> Result<i64> {
  let table = T::table();
  if key.is_none() && !table.auto_key() {
    return Err(StorageError::MissingKey {
      table: table.name(),
    });
  }

  let data = serde_json::to_vec(item)?;
  let indexes = item.index_values();

  let columns = table.indexes().join(", ");
  let placeholders = vec!["?"; table.indexes().len() + 2].join(", ");
  let sql = format!(
    "{} INTO {} (id, {}, data) VALUES ({})",
    verb,
    table.name(),
    columns,
    placeholders
  );

  let mut values: Vec<&dyn ToSql> = Vec::with_capacity(indexes.len() + 2);
  values.push(&key);
  for value in &indexes {
    values.push(value);
  }
  values.push(&data);

  conn.execute(&sql, values.as_slice())?;

  Ok(key.unwrap_or_else(|| conn.last_insert_rowid()))
}

fn update_row<T: Record>(conn: &Connection, key: i64, item: &T) -> Result<()> {
  let table = T::table();
  let data = serde_json::to_vec(item)?;
  let indexes = item.index_values();

  let assignments: Vec<String> = table
    .indexes()
    .iter()
    .map(|column| format!("{} = ?", column))
    .collect();
  let sql = format!(
    "UPDATE {} SET {}, data = ? WHERE id = ?",
    table.name(),
    assignments.join(", ")
  );

  let mut values: Vec<&dyn ToSql> = Vec::with_capacity(indexes.len() + 2);
  for value in &indexes {
    values.push(value);
  }
  values.push(&data);
  values.push(&key);

  let updated = conn.execute(&sql, values.as_slice())?;
  if updated == 0 {
    return Err(StorageError::NotFound {
      table: table.name(),
      key,
    });
  }
  Ok(())
}

fn get_row<T: Record>(conn: &Connection, key: i64) -> Result<Option<T>> {
  let sql = format!("SELECT data FROM {} WHERE id = ?", T::table().name());
  let data: Option<Vec<u8>> = conn
    .query_row(&sql, params![key], |row| row.get(0))
    .optional()?;

  match data {
    Some(data) => {
      let mut item: T = serde_json::from_slice(&data)?;
      item.set_key(key);
      Ok(Some(item))
    }
    None => Ok(None),
  }
}

fn query_rows<T: Record, P: rusqlite::Params>(
  conn: &Connection,
  sql: &str,
  params: P,
) -> Result<Vec<T>> {
  let mut stmt = conn.prepare(sql)?;
  let rows = stmt.query_map(params, |row| {
    let key: i64 = row.get(0)?;
    let data: Vec<u8> = row.get(1)?;
    Ok((key, data))
  })?;

  let mut items = Vec::new();
  for row in rows {
    let (key, data) = row?;
    let mut item: T = serde_json::from_slice(&data)?;
    item.set_key(key);
    items.push(item);
  }
  Ok(items)
}
