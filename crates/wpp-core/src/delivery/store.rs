//! Delivery log persistence using SQLite

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};
use tracing::debug;

use crate::delivery::{DeliveryLogRecord, DeliveryOutcome};
use crate::{Error, Result};

/// SQLite-based delivery log
///
/// Rows are only ever inserted; nothing in the gateway updates or deletes them.
pub struct DeliveryStore {
    conn: Mutex<Connection>,
}

impl DeliveryStore {
    /// Open (or create) the delivery log at the given database path
    pub fn open(db_path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(db_path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_tables()?;
        Ok(store)
    }

    /// Create an in-memory delivery log (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_tables()?;
        Ok(store)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Other("delivery store lock poisoned".to_string()))
    }

    /// Initialize database tables
    fn init_tables(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS delivery_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                contact TEXT NOT NULL,
                sentmsg TEXT NOT NULL,
                resultmsg TEXT NOT NULL,
                result INTEGER NOT NULL,
                date TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_delivery_log_contact ON delivery_log(contact)",
            [],
        )?;

        Ok(())
    }

    /// Append a record and return its row id
    pub fn append(&self, record: &DeliveryLogRecord) -> Result<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO delivery_log (contact, sentmsg, resultmsg, result, date)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.contact,
                record.sent_message,
                record.result_message,
                record.outcome.code(),
                record.date.to_rfc3339(),
            ],
        )?;
        let id = conn.last_insert_rowid();
        debug!("Delivery log row {} written for {}", id, record.contact);
        Ok(id)
    }

    /// Most recent records first
    pub fn recent(&self, limit: usize) -> Result<Vec<DeliveryLogRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, contact, sentmsg, resultmsg, result, date FROM delivery_log
             ORDER BY id DESC LIMIT ?1",
        )?;

        let rows = stmt.query_map(params![limit as i64], row_to_record)?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// Records for one contact, most recent first
    pub fn list_by_contact(&self, contact: &str, limit: usize) -> Result<Vec<DeliveryLogRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, contact, sentmsg, resultmsg, result, date FROM delivery_log
             WHERE contact = ?1 ORDER BY id DESC LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![contact, limit as i64], row_to_record)?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// Total number of records
    pub fn count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM delivery_log", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<DeliveryLogRecord> {
    let code: i64 = row.get(4)?;
    let outcome = DeliveryOutcome::from_code(code).ok_or(rusqlite::Error::InvalidQuery)?;

    let date_str: String = row.get(5)?;
    let date = DateTime::parse_from_rfc3339(&date_str)
        .map_err(|_| rusqlite::Error::InvalidQuery)?
        .with_timezone(&Utc);

    Ok(DeliveryLogRecord {
        id: Some(row.get(0)?),
        contact: row.get(1)?,
        sent_message: row.get(2)?,
        result_message: row.get(3)?,
        outcome,
        date,
    })
}
