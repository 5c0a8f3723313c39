// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Document record store — the durable mirror of job state.
//
// A transition is committed once the store has accepted it. Both
// implementations are synchronous; calls are short and made while the
// job's transition lock is held.

pub mod sqlite;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tracing::debug;

use printkiosk_core::error::{KioskError, Result};
use printkiosk_core::types::{Job, JobId, JobStatus, StatusEntry};

pub use sqlite::SqliteJobStore;

/// One committed status transition.
///
/// `error_detail` and `artifact_path` carry the job's values *after* the
/// transition, so a store simply overwrites its copies.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    pub status: JobStatus,
    pub at: DateTime<Utc>,
    pub error_detail: Option<String>,
    pub artifact_path: Option<PathBuf>,
}

impl StatusChange {
    /// Apply this change to an in-memory job record.
    pub fn apply_to(&self, job: &mut Job) {
        job.status = self.status;
        job.error_detail = self.error_detail.clone();
        job.artifact_path = self.artifact_path.clone();
        job.timestamps.push(StatusEntry {
            status: self.status,
            entered_at: self.at,
        });
    }
}

pub trait JobStore: Send + Sync {
    /// Record a freshly uploaded job.
    fn create(&self, job: &Job) -> Result<JobId>;

    fn get(&self, id: &JobId) -> Result<Option<Job>>;

    /// Persist a transition. Fails with `JobNotFound` for unknown ids.
    fn update_status(&self, id: &JobId, change: &StatusChange) -> Result<()>;
}

/// Process-local store, used when no database is configured.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<JobId, Job>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<JobId, Job>>> {
        self.jobs
            .lock()
            .map_err(|_| KioskError::Store("memory store lock poisoned".into()))
    }
}

impl JobStore for MemoryJobStore {
    fn create(&self, job: &Job) -> Result<JobId> {
        let mut jobs = self.lock()?;
        if jobs.contains_key(&job.id) {
            return Err(KioskError::Store(format!("job {} already exists", job.id)));
        }
        jobs.insert(job.id, job.clone());
        debug!(job_id = %job.id, "job recorded in memory");
        Ok(job.id)
    }

    fn get(&self, id: &JobId) -> Result<Option<Job>> {
        Ok(self.lock()?.get(id).cloned())
    }

    fn update_status(&self, id: &JobId, change: &StatusChange) -> Result<()> {
        let mut jobs = self.lock()?;
        let job = jobs.get_mut(id).ok_or(KioskError::JobNotFound(*id))?;
        change.apply_to(job);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use printkiosk_core::types::{InputFile, PrintOptions};

    fn sample_job() -> Job {
        Job::new(
            vec![InputFile::new("/tmp/a.pdf", "application/pdf", 1024)],
            PrintOptions::default(),
        )
        .expect("job")
    }

    #[test]
    fn create_then_get() {
        let store = MemoryJobStore::new();
        let job = sample_job();
        let id = store.create(&job).expect("create");
        assert_eq!(id, job.id);
        assert_eq!(store.get(&id).expect("get"), Some(job));
    }

    #[test]
    fn duplicate_create_is_rejected() {
        let store = MemoryJobStore::new();
        let job = sample_job();
        store.create(&job).expect("create");
        assert!(matches!(store.create(&job), Err(KioskError::Store(_))));
    }

    #[test]
    fn update_appends_timestamp() {
        let store = MemoryJobStore::new();
        let job = sample_job();
        store.create(&job).expect("create");

        let change = StatusChange {
            status: JobStatus::Queued,
            at: Utc::now(),
            error_detail: None,
            artifact_path: None,
        };
        store.update_status(&job.id, &change).expect("update");

        let stored = store.get(&job.id).expect("get").expect("present");
        assert_eq!(stored.status, JobStatus::Queued);
        assert_eq!(stored.history(), vec![JobStatus::Uploaded, JobStatus::Queued]);
    }

    #[test]
    fn unknown_job_update_is_not_found() {
        let store = MemoryJobStore::new();
        let change = StatusChange {
            status: JobStatus::Queued,
            at: Utc::now(),
            error_detail: None,
            artifact_path: None,
        };
        assert!(matches!(
            store.update_status(&JobId::new(), &change),
            Err(KioskError::JobNotFound(_))
        ));
    }
}
