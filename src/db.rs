use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {:?}", dir))?;
    }
    let conn = Connection::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS websites (
            id          INTEGER PRIMARY KEY,
            domain      TEXT UNIQUE NOT NULL,
            source_url  TEXT NOT NULL,
            phone       TEXT NOT NULL DEFAULT '[]',
            email       TEXT NOT NULL DEFAULT '[]',
            other_links TEXT NOT NULL DEFAULT '[]',
            saved_at    TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );
        ",
    )?;
    Ok(())
}

// ── Records ──

/// One stored website, keyed by its normalized domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebsiteRecord {
    /// Assigned by the store on insert.
    pub id: Option<i64>,
    pub domain: String,
    pub source_url: String,
    pub phone: Vec<String>,
    pub email: Vec<String>,
    pub other_links: Vec<Value>,
    pub saved_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const COLUMNS: &str =
    "id, domain, source_url, phone, email, other_links, saved_at, created_at, updated_at";

/// Raw column values; JSON and timestamps are decoded in `into_record`.
struct StoredRow {
    id: i64,
    domain: String,
    source_url: String,
    phone: String,
    email: String,
    other_links: String,
    saved_at: String,
    created_at: String,
    updated_at: String,
}

impl StoredRow {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(StoredRow {
            id: row.get(0)?,
            domain: row.get(1)?,
            source_url: row.get(2)?,
            phone: row.get(3)?,
            email: row.get(4)?,
            other_links: row.get(5)?,
            saved_at: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn into_record(self) -> Result<WebsiteRecord> {
        let ctx = |field: &str| format!("Corrupt {} for website {}", field, self.id);
        Ok(WebsiteRecord {
            id: Some(self.id),
            phone: serde_json::from_str(&self.phone).with_context(|| ctx("phone"))?,
            email: serde_json::from_str(&self.email).with_context(|| ctx("email"))?,
            other_links: serde_json::from_str(&self.other_links)
                .with_context(|| ctx("other_links"))?,
            saved_at: parse_ts(&self.saved_at).with_context(|| ctx("saved_at"))?,
            created_at: parse_ts(&self.created_at).with_context(|| ctx("created_at"))?,
            updated_at: parse_ts(&self.updated_at).with_context(|| ctx("updated_at"))?,
            domain: self.domain,
            source_url: self.source_url,
        })
    }
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}

fn query_one<P: rusqlite::ToSql>(
    conn: &Connection,
    column: &str,
    value: P,
) -> Result<Option<WebsiteRecord>> {
    let sql = format!("SELECT {} FROM websites WHERE {} = ?1", COLUMNS, column);
    let row = conn
        .query_row(&sql, rusqlite::params![value], StoredRow::from_row)
        .optional()?;
    row.map(StoredRow::into_record).transpose()
}

pub fn find_by_domain(conn: &Connection, domain: &str) -> Result<Option<WebsiteRecord>> {
    query_one(conn, "domain", domain)
}

pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<WebsiteRecord>> {
    query_one(conn, "id", id)
}

/// Insert a new record and return the id assigned to it.
pub fn insert_record(conn: &Connection, r: &WebsiteRecord) -> Result<i64> {
    conn.execute(
        "INSERT INTO websites
         (domain, source_url, phone, email, other_links, saved_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            r.domain,
            r.source_url,
            serde_json::to_string(&r.phone)?,
            serde_json::to_string(&r.email)?,
            serde_json::to_string(&r.other_links)?,
            r.saved_at.to_rfc3339(),
            r.created_at.to_rfc3339(),
            r.updated_at.to_rfc3339(),
        ],
    )
    .with_context(|| format!("Failed to insert website {}", r.domain))?;
    Ok(conn.last_insert_rowid())
}

/// Overwrite the mutable fields of an existing record. `domain` and
/// `created_at` are never rewritten.
pub fn replace_record(conn: &Connection, r: &WebsiteRecord) -> Result<()> {
    let Some(id) = r.id else {
        bail!("Cannot replace website {} without an id", r.domain);
    };
    let changed = conn.execute(
        "UPDATE websites
         SET source_url = ?2, phone = ?3, email = ?4, other_links = ?5,
             saved_at = ?6, updated_at = ?7
         WHERE id = ?1",
        rusqlite::params![
            id,
            r.source_url,
            serde_json::to_string(&r.phone)?,
            serde_json::to_string(&r.email)?,
            serde_json::to_string(&r.other_links)?,
            r.saved_at.to_rfc3339(),
            r.updated_at.to_rfc3339(),
        ],
    )?;
    if changed == 0 {
        bail!("Website {} vanished before update", id);
    }
    Ok(())
}

pub fn fetch_all(conn: &Connection) -> Result<Vec<WebsiteRecord>> {
    let mut stmt = conn.prepare(&format!("SELECT {} FROM websites ORDER BY id", COLUMNS))?;
    let rows = stmt
        .query_map([], StoredRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(StoredRow::into_record).collect()
}

// ── Stats ──

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub websites: usize,
    pub phones: usize,
    pub emails: usize,
    pub links: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let stats = conn.query_row(
        "SELECT COUNT(*),
                COALESCE(SUM(json_array_length(phone)), 0),
                COALESCE(SUM(json_array_length(email)), 0),
                COALESCE(SUM(json_array_length(other_links)), 0)
         FROM websites",
        [],
        |r| {
            Ok(Stats {
                websites: r.get(0)?,
                phones: r.get(1)?,
                emails: r.get(2)?,
                links: r.get(3)?,
            })
        },
    )?;
    Ok(stats)
}

#[cfg(test)]
pub fn open_in_memory() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    init_schema(&conn).unwrap();
    conn
}
