// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Job state machine — the only writer of job status.
//
// Transitions for one job are serialised by a per-job async mutex held
// across validate → persist → record → publish, so observers see a job's
// events in the order they were committed. Different jobs never contend.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use printkiosk_core::error::{KioskError, Result};
use printkiosk_core::types::{Job, JobId, JobStatus};

use crate::broadcast::{StatusBroadcaster, StatusEvent};
use crate::store::{JobStore, StatusChange};

type JobSlot = Arc<tokio::sync::Mutex<Job>>;

pub struct JobStateMachine {
    store: Arc<dyn JobStore>,
    broadcaster: StatusBroadcaster,
    /// Jobs that have not reached a terminal status.
    active: Mutex<HashMap<JobId, JobSlot>>,
}

impl JobStateMachine {
    pub fn new(store: Arc<dyn JobStore>, broadcaster: StatusBroadcaster) -> Self {
        Self {
            store,
            broadcaster,
            active: Mutex::new(HashMap::new()),
        }
    }

    pub fn broadcaster(&self) -> &StatusBroadcaster {
        &self.broadcaster
    }

    /// Register a freshly uploaded job and announce it.
    #[instrument(skip_all, fields(job_id = %job.id))]
    pub fn create(&self, job: Job) -> Result<JobId> {
        if job.status != JobStatus::Uploaded {
            return Err(KioskError::Validation(format!(
                "new jobs start as uploaded, not {}",
                job.status
            )));
        }

        let id = self.store.create(&job)?;
        let at = job.entered_at(JobStatus::Uploaded).unwrap_or_else(Utc::now);
        self.active_jobs()?
            .insert(id, Arc::new(tokio::sync::Mutex::new(job)));

        self.broadcaster.publish(&StatusEvent {
            job_id: id,
            status: JobStatus::Uploaded,
            error_detail: None,
            at,
        });
        info!("job uploaded");
        Ok(id)
    }

    /// Advance a job along a forward edge.
    pub async fn advance(&self, id: &JobId, to: JobStatus) -> Result<Job> {
        if to == JobStatus::Failed {
            return self.fail(id, "unspecified failure").await;
        }
        self.apply(id, to, None, None).await
    }

    /// Enter `printing` with the artifact that is about to be dispatched.
    pub async fn start_printing(&self, id: &JobId, artifact: PathBuf) -> Result<Job> {
        self.apply(id, JobStatus::Printing, Some(artifact), None).await
    }

    /// Move a job to `failed`, recording why.
    pub async fn fail(&self, id: &JobId, detail: impl Into<String>) -> Result<Job> {
        let mut detail = detail.into();
        if detail.trim().is_empty() {
            detail = "unknown failure".to_string();
        }
        self.apply(id, JobStatus::Failed, None, Some(detail)).await
    }

    /// Current view of a job: live if in flight, otherwise from the store.
    pub async fn snapshot(&self, id: &JobId) -> Result<Job> {
        let slot = self.active_jobs()?.get(id).cloned();
        match slot {
            Some(slot) => Ok(slot.lock().await.clone()),
            None => self.store.get(id)?.ok_or(KioskError::JobNotFound(*id)),
        }
    }

    #[instrument(skip_all, fields(job_id = %id, to = %to))]
    async fn apply(
        &self,
        id: &JobId,
        to: JobStatus,
        artifact: Option<PathBuf>,
        error_detail: Option<String>,
    ) -> Result<Job> {
        let slot = self.slot(id, to)?;
        let mut job = slot.lock().await;

        let from = job.status;
        if !from.can_transition_to(to) {
            warn!(%from, "illegal transition refused");
            return Err(KioskError::IllegalTransition { from, to });
        }

        let artifact_path = match to {
            JobStatus::Printing => artifact.or_else(|| job.artifact_path.clone()),
            JobStatus::Completed => job.artifact_path.clone(),
            _ => None,
        };
        if to == JobStatus::Printing && artifact_path.is_none() {
            return Err(KioskError::Validation(
                "a job cannot start printing without an artifact".into(),
            ));
        }

        let change = StatusChange {
            status: to,
            at: Utc::now(),
            error_detail,
            artifact_path,
        };

        self.store.update_status(id, &change)?;
        change.apply_to(&mut job);

        self.broadcaster.publish(&StatusEvent {
            job_id: *id,
            status: to,
            error_detail: change.error_detail.clone(),
            at: change.at,
        });

        if to.is_terminal() {
            self.active_jobs()?.remove(id);
        }

        debug!(%from, "transition committed");
        Ok(job.clone())
    }

    fn slot(&self, id: &JobId, to: JobStatus) -> Result<JobSlot> {
        match self.active_jobs()?.get(id) {
            Some(slot) => Ok(Arc::clone(slot)),
            None => match self.store.get(id)? {
                // Known but terminal: no edges leave it.
                Some(job) => Err(KioskError::IllegalTransition {
                    from: job.status,
                    to,
                }),
                None => Err(KioskError::JobNotFound(*id)),
            },
        }
    }

    fn active_jobs(&self) -> Result<std::sync::MutexGuard<'_, HashMap<JobId, JobSlot>>> {
        self.active
            .lock()
            .map_err(|_| KioskError::Store("active job table lock poisoned".into()))
    }
}
