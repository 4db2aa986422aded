use crate::models::{
    Application, ApplicationPage, ApplicationStats, ApplicationStatus, NewApplication,
};
use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Persistence for applications. Every write touches exactly one row.
pub trait ApplicationStore: Send + Sync {
    fn create(&self, application: &NewApplication) -> Result<Application>;
    fn get(&self, id: i64) -> Result<Option<Application>>;
    fn list(
        &self,
        status: Option<ApplicationStatus>,
        page: u32,
        per_page: u32,
    ) -> Result<ApplicationPage>;
    /// Move an application to `processed`. Returns `None` when the id is unknown.
    fn mark_processed(&self, id: i64) -> Result<Option<Application>>;
    /// Creation times of applications whose phone OR IP equals `identifier`, created after `since`.
    fn recent_submissions(
        &self,
        identifier: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>>;
    fn stats(&self) -> Result<ApplicationStats>;
    fn ping(&self) -> Result<()>;
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

const COLUMNS: &str =
    "id, name, phone, email, service_type, message, ip_address, created_at, status";

impl SqliteStore {
    pub fn open(db_path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create database directory: {}", parent.display())
                })?;
            }
        }

        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open applications database: {db_path}"))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS applications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                phone TEXT NOT NULL,
                email TEXT,
                service_type TEXT,
                message TEXT,
                ip_address TEXT NOT NULL,
                created_at TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'new'
            );
            CREATE INDEX IF NOT EXISTS idx_phone_created ON applications (phone, created_at);
            CREATE INDEX IF NOT EXISTS idx_ip_created ON applications (ip_address, created_at);
            CREATE INDEX IF NOT EXISTS idx_status_created ON applications (status, created_at);",
        )
        .context("Failed to initialize applications schema")?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("applications database lock poisoned"))
    }

    pub(crate) fn insert_at(
        &self,
        application: &NewApplication,
        created_at: DateTime<Utc>,
    ) -> Result<Application> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO applications
                (name, phone, email, service_type, message, ip_address, created_at, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                application.name,
                application.phone,
                application.email,
                application.service_type,
                application.message,
                application.ip_address,
                format_timestamp(created_at),
                ApplicationStatus::New.as_str(),
            ],
        )
        .context("Failed to insert application")?;

        let id = conn.last_insert_rowid();
        Self::fetch(&conn, id)?
            .ok_or_else(|| anyhow::anyhow!("application {id} vanished after insert"))
    }

    fn fetch(conn: &Connection, id: i64) -> Result<Option<Application>> {
        let application = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM applications WHERE id = ?1"),
                params![id],
                row_to_application,
            )
            .optional()
            .with_context(|| format!("Failed to load application {id}"))?;
        Ok(application)
    }

    fn count(conn: &Connection, status: Option<ApplicationStatus>) -> Result<u64> {
        let count: i64 = match status {
            Some(status) => conn.query_row(
                "SELECT COUNT(*) FROM applications WHERE status = ?1",
                params![status.as_str()],
                |row| row.get(0),
            )?,
            None => conn.query_row("SELECT COUNT(*) FROM applications", [], |row| row.get(0))?,
        };
        Ok(count as u64)
    }
}

impl ApplicationStore for SqliteStore {
    fn create(&self, application: &NewApplication) -> Result<Application> {
        self.insert_at(application, Utc::now())
    }

    fn get(&self, id: i64) -> Result<Option<Application>> {
        let conn = self.lock()?;
        Self::fetch(&conn, id)
    }

    fn list(
        &self,
        status: Option<ApplicationStatus>,
        page: u32,
        per_page: u32,
    ) -> Result<ApplicationPage> {
        let page = page.max(1);
        let per_page = per_page.max(1);
        let offset = i64::from(page - 1) * i64::from(per_page);

        let conn = self.lock()?;
        let total = Self::count(&conn, status)?;

        let items = match status {
            Some(status) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {COLUMNS} FROM applications WHERE status = ?1
                     ORDER BY created_at DESC, id DESC LIMIT ?2 OFFSET ?3"
                ))?;
                let rows = stmt.query_map(
                    params![status.as_str(), per_page, offset],
                    row_to_application,
                )?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {COLUMNS} FROM applications
                     ORDER BY created_at DESC, id DESC LIMIT ?1 OFFSET ?2"
                ))?;
                let rows = stmt.query_map(params![per_page, offset], row_to_application)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
        };

        let pages = total.div_ceil(u64::from(per_page)) as u32;
        Ok(ApplicationPage {
            items,
            page,
            per_page,
            total,
            pages,
        })
    }

    fn mark_processed(&self, id: i64) -> Result<Option<Application>> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE applications SET status = ?1 WHERE id = ?2",
            params![ApplicationStatus::Processed.as_str(), id],
        )
        .with_context(|| format!("Failed to mark application {id} as processed"))?;
        Self::fetch(&conn, id)
    }

    fn recent_submissions(
        &self,
        identifier: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT created_at FROM applications
             WHERE (phone = ?1 OR ip_address = ?1) AND created_at > ?2
             ORDER BY created_at",
        )?;
        let rows = stmt.query_map(params![identifier, format_timestamp(since)], |row| {
            parse_timestamp(row, 0)
        })?;
        let times = rows
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to query recent applications")?;
        Ok(times)
    }

    fn stats(&self) -> Result<ApplicationStats> {
        let conn = self.lock()?;
        let total = Self::count(&conn, None)?;
        let new = Self::count(&conn, Some(ApplicationStatus::New))?;
        let processed = Self::count(&conn, Some(ApplicationStatus::Processed))?;
        Ok(ApplicationStats {
            total,
            new,
            processed,
        })
    }

    fn ping(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .context("Database health check failed")?;
        Ok(())
    }
}

/// Fixed-width UTC form so that text comparison in SQL matches time order.
fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_application(row: &Row<'_>) -> rusqlite::Result<Application> {
    let status: String = row.get(8)?;
    let status = status.parse::<ApplicationStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(8, Type::Text, e.into())
    })?;

    Ok(Application {
        id: row.get(0)?,
        name: row.get(1)?,
        phone: row.get(2)?,
        email: row.get(3)?,
        service_type: row.get(4)?,
        message: row.get(5)?,
        ip_address: row.get(6)?,
        created_at: parse_timestamp(row, 7)?,
        status,
    })
}
