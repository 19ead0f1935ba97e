use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use rusqlite::Connection;

use crate::error::{Result, ScrapeError};
use crate::parser::normalize::NormalizedRecord;

/// Insert-only SQLite sink for discovered URLs and extracted records.
///
/// Table names are chosen per job, so every statement is built per call after
/// the name has been checked.
pub struct Store {
    conn: Mutex<Connection>,
}

pub fn check_table(name: &str) -> Result<&str> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(name)
    } else {
        Err(ScrapeError::InvalidTable(name.to_string()))
    }
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn init_frontier_table(&self, table: &str) -> Result<()> {
        let table = check_table(table)?;
        self.conn().execute_batch(&format!(
            "
            CREATE TABLE IF NOT EXISTS \"{table}\" (
                id            INTEGER PRIMARY KEY,
                url           TEXT NOT NULL,
                city          TEXT NOT NULL,
                discovered_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            CREATE INDEX IF NOT EXISTS \"idx_{table}_url\" ON \"{table}\"(url);
            "
        ))?;
        Ok(())
    }

    pub fn init_records_table(&self, table: &str) -> Result<()> {
        let table = check_table(table)?;
        self.conn().execute_batch(&format!(
            "
            CREATE TABLE IF NOT EXISTS \"{table}\" (
                id             INTEGER PRIMARY KEY,
                nombre         TEXT,
                resumen        TEXT,
                telefono       TEXT,
                tamano         TEXT,
                ubicaciones    TEXT,
                fundacion      TEXT,
                sector         TEXT NOT NULL DEFAULT '[]',
                sitio_web      TEXT NOT NULL DEFAULT '[]',
                sede           TEXT NOT NULL DEFAULT '[]',
                especialidades TEXT NOT NULL DEFAULT '[]',
                codigo_postal  TEXT,
                ciudad         TEXT,
                scraped_at     TEXT NOT NULL DEFAULT (datetime('now'))
            );
            "
        ))?;
        Ok(())
    }

    // ── Frontier ──

    pub fn insert_frontier(&self, table: &str, url: &str, city: &str) -> Result<()> {
        let table = check_table(table)?;
        self.conn().execute(
            &format!("INSERT INTO \"{table}\" (url, city) VALUES (?1, ?2)"),
            rusqlite::params![url, city],
        )?;
        Ok(())
    }

    /// Distinct URLs in discovery order, each with the city of its first row.
    pub fn fetch_frontier(&self, table: &str) -> Result<Vec<(String, String)>> {
        let table = check_table(table)?;
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT url, city FROM \"{table}\"
             WHERE id IN (SELECT MIN(id) FROM \"{table}\" GROUP BY url)
             ORDER BY id"
        ))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ── Records ──

    pub fn insert_record(&self, table: &str, r: &NormalizedRecord) -> Result<()> {
        let table = check_table(table)?;
        self.conn().execute(
            &format!(
                "INSERT INTO \"{table}\"
                 (nombre, resumen, telefono, tamano, ubicaciones, fundacion,
                  sector, sitio_web, sede, especialidades, codigo_postal, ciudad)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
            ),
            rusqlite::params![
                r.name,
                r.summary,
                r.phone,
                r.company_size,
                r.locations,
                r.founding_year,
                serde_json::to_string(&r.sector)?,
                serde_json::to_string(&r.website)?,
                serde_json::to_string(&r.headquarters)?,
                serde_json::to_string(&r.specialties)?,
                r.postal_code,
                r.city,
            ],
        )?;
        Ok(())
    }

    // ── Stats ──

    pub fn count(&self, table: &str) -> Result<usize> {
        let table = check_table(table)?;
        let n = self
            .conn()
            .query_row(&format!("SELECT COUNT(*) FROM \"{table}\""), [], |r| r.get(0))?;
        Ok(n)
    }
}
