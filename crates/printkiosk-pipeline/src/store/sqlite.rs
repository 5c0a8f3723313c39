// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// SQLite-backed job record store.
//
// Job metadata and status history live in two tables. Inputs and print
// options are stored as JSON; the document bytes themselves stay on disk.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info, instrument};

use printkiosk_core::error::{KioskError, Result};
use printkiosk_core::types::{InputFile, Job, JobId, JobStatus, PrintOptions, StatusEntry};

use super::{JobStore, StatusChange};

const CREATE_TABLES_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS jobs (
        id TEXT PRIMARY KEY,
        inputs TEXT NOT NULL,
        options TEXT NOT NULL,
        status TEXT NOT NULL,
        artifact_path TEXT,
        error_detail TEXT,
        created_at TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS status_history (
        job_id TEXT NOT NULL REFERENCES jobs(id),
        seq INTEGER NOT NULL,
        status TEXT NOT NULL,
        entered_at TEXT NOT NULL,
        PRIMARY KEY (job_id, seq)
    );
"#;

/// Job store backed by a SQLite database.
pub struct SqliteJobStore {
    conn: Mutex<Connection>,
}

impl SqliteJobStore {
    /// Open (or create) the database at `path`.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path.as_ref())
            .map_err(|e| KioskError::Store(format!("open: {e}")))?;

        // Status lookups read while the pipeline writes.
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| KioskError::Store(format!("WAL pragma: {e}")))?;

        conn.execute_batch(CREATE_TABLES_SQL)
            .map_err(|e| KioskError::Store(format!("create tables: {e}")))?;

        info!("job store database opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| KioskError::Store(format!("open in-memory: {e}")))?;
        conn.execute_batch(CREATE_TABLES_SQL)
            .map_err(|e| KioskError::Store(format!("create tables: {e}")))?;

        debug!("in-memory job store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| KioskError::Store("connection lock poisoned".into()))
    }

    fn load_history(conn: &Connection, id: &JobId) -> Result<Vec<StatusEntry>> {
        let mut stmt = conn
            .prepare(
                "SELECT status, entered_at FROM status_history
                 WHERE job_id = ?1 ORDER BY seq ASC",
            )
            .map_err(|e| KioskError::Store(format!("prepare history: {e}")))?;

        stmt.query_map(params![id.to_string()], |row| {
            let status: String = row.get(0)?;
            let entered_at: String = row.get(1)?;
            Ok(StatusEntry {
                status: parse_status(&status, 0)?,
                entered_at: parse_time(&entered_at, 1)?,
            })
        })
        .map_err(|e| KioskError::Store(format!("query history: {e}")))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| KioskError::Store(format!("history rows: {e}")))
    }
}

impl JobStore for SqliteJobStore {
    #[instrument(skip(self, job), fields(job_id = %job.id))]
    fn create(&self, job: &Job) -> Result<JobId> {
        let inputs_json = serde_json::to_string(&job.inputs)?;
        let options_json = serde_json::to_string(&job.options)?;
        let created_at = job
            .timestamps
            .first()
            .map(|entry| entry.entered_at)
            .unwrap_or_else(Utc::now);

        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| KioskError::Store(format!("begin: {e}")))?;

        tx.execute(
            "INSERT INTO jobs (id, inputs, options, status, artifact_path, error_detail, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                job.id.to_string(),
                inputs_json,
                options_json,
                job.status.as_str(),
                job.artifact_path.as_deref().map(path_text),
                job.error_detail,
                created_at.to_rfc3339(),
            ],
        )
        .map_err(|e| KioskError::Store(format!("insert job: {e}")))?;

        for (seq, entry) in job.timestamps.iter().enumerate() {
            tx.execute(
                "INSERT INTO status_history (job_id, seq, status, entered_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    job.id.to_string(),
                    seq as i64,
                    entry.status.as_str(),
                    entry.entered_at.to_rfc3339()
                ],
            )
            .map_err(|e| KioskError::Store(format!("insert history: {e}")))?;
        }

        tx.commit()
            .map_err(|e| KioskError::Store(format!("commit: {e}")))?;
        debug!("job inserted");
        Ok(job.id)
    }

    #[instrument(skip(self), fields(job_id = %id))]
    fn get(&self, id: &JobId) -> Result<Option<Job>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT inputs, options, status, artifact_path, error_detail
                 FROM jobs WHERE id = ?1",
                params![id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, Option<String>>(4)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| KioskError::Store(format!("query job: {e}")))?;

        let Some((inputs_json, options_json, status, artifact_path, error_detail)) = row else {
            return Ok(None);
        };

        let inputs: Vec<InputFile> = serde_json::from_str(&inputs_json)?;
        let options: PrintOptions = serde_json::from_str(&options_json)?;
        let status = JobStatus::parse(&status)
            .ok_or_else(|| KioskError::Store(format!("unknown status '{status}'")))?;
        let timestamps = Self::load_history(&conn, id)?;

        Ok(Some(Job {
            id: *id,
            inputs,
            options,
            status,
            artifact_path: artifact_path.map(PathBuf::from),
            error_detail,
            timestamps,
        }))
    }

    #[instrument(skip(self, change), fields(job_id = %id, status = %change.status))]
    fn update_status(&self, id: &JobId, change: &StatusChange) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| KioskError::Store(format!("begin: {e}")))?;

        let rows = tx
            .execute(
                "UPDATE jobs SET status = ?1, artifact_path = ?2, error_detail = ?3
                 WHERE id = ?4",
                params![
                    change.status.as_str(),
                    change.artifact_path.as_deref().map(path_text),
                    change.error_detail,
                    id.to_string()
                ],
            )
            .map_err(|e| KioskError::Store(format!("update status: {e}")))?;

        if rows == 0 {
            return Err(KioskError::JobNotFound(*id));
        }

        tx.execute(
            "INSERT INTO status_history (job_id, seq, status, entered_at)
             SELECT ?1, COALESCE(MAX(seq) + 1, 0), ?2, ?3
             FROM status_history WHERE job_id = ?1",
            params![id.to_string(), change.status.as_str(), change.at.to_rfc3339()],
        )
        .map_err(|e| KioskError::Store(format!("append history: {e}")))?;

        tx.commit()
            .map_err(|e| KioskError::Store(format!("commit: {e}")))?;
        debug!("status persisted");
        Ok(())
    }
}

fn path_text(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn parse_status(raw: &str, column: usize) -> rusqlite::Result<JobStatus> {
    JobStatus::parse(raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            column,
            rusqlite::types::Type::Text,
            format!("unknown status '{raw}'").into(),
        )
    })
}

fn parse_time(raw: &str, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
        })
}
