use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use super::repository::JobRepository;
use super::{Job, JobSpec, JobStatus};
use crate::config::{EngineConfig, MissingJobPolicy};
use crate::error::{CoreError, Result};
use crate::report::Report;

/// Change notification published after every committed mutation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    Created { job_id: String },
    StatusChanged { job_id: String, status: JobStatus },
    ReportAppended { job_id: String, report_id: String },
    Deleted { job_id: String },
}

/// Handed out when a run is admitted; identifies that run when it finishes.
#[derive(Debug, Clone)]
pub struct RunTicket {
    pub run_id: String,
    pub job_id: String,
    /// Job name when the run started.
    pub job_name: String,
    pub targets: Vec<String>,
}

pub(crate) enum BeginRun {
    Started(RunTicket),
    /// The job had been moved off `Running` while its run was still in flight;
    /// it is `Running` again and that run's result will be recorded.
    Resumed,
    AlreadyRunning,
    Missing,
}

struct Entry {
    job: Job,
    position: i64,
    // Set while an executor call is outstanding for this job.
    in_flight: Option<String>,
}

#[derive(Default)]
struct Inner {
    order: Vec<String>,
    jobs: HashMap<String, Entry>,
    next_position: i64,
}

impl Inner {
    fn insert(&mut self, job: Job, position: i64) {
        self.next_position = self.next_position.max(position + 1);
        self.order.push(job.id.clone());
        self.jobs.insert(
            job.id.clone(),
            Entry {
                job,
                position,
                in_flight: None,
            },
        );
    }
}

/// Owns every job. Mutations are serialized behind one write lock and, when a
/// repository is attached, written through before they become visible.
pub struct JobStore {
    inner: RwLock<Inner>,
    repository: Option<Arc<dyn JobRepository>>,
    policy: MissingJobPolicy,
    events: broadcast::Sender<JobEvent>,
}

impl JobStore {
    /// A store that lives only in memory.
    pub fn new(config: &EngineConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            inner: RwLock::new(Inner::default()),
            repository: None,
            policy: config.missing_job_policy,
            events,
        }
    }

    /// Loads every job from `repository` and writes through to it from then on.
    pub async fn with_repository(
        repository: Arc<dyn JobRepository>,
        config: &EngineConfig,
    ) -> Result<Self> {
        let jobs = repository.load_all().await?;
        let mut inner = Inner::default();

        for (position, mut job) in jobs.into_iter().enumerate() {
            let position = position as i64;
            if job.status == JobStatus::Running && config.recover_interrupted_runs {
                tracing::warn!(job_id = %job.id, "job was running when last stopped, marking failed");
                job.status = JobStatus::Failed;
                job.last_run = Some(Utc::now());
            }
            // 重新写入以保证位置连续
            repository.save(position, &job).await?;
            inner.insert(job, position);
        }

        tracing::info!(jobs = inner.order.len(), "job store loaded");

        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Ok(Self {
            inner: RwLock::new(inner),
            repository: Some(repository),
            policy: config.missing_job_policy,
            events,
        })
    }

    pub fn policy(&self) -> MissingJobPolicy {
        self.policy
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    pub async fn create(&self, spec: JobSpec) -> Result<String> {
        let mut job = Job::from_spec(spec)?;

        let mut inner = self.inner.write().await;
        while inner.jobs.contains_key(&job.id) {
            job.id = Uuid::new_v4().to_string();
        }
        let position = inner.next_position;
        self.persist(position, &job).await?;

        let id = job.id.clone();
        inner.insert(job, position);
        drop(inner);

        tracing::info!(job_id = %id, "job created");
        self.emit(JobEvent::Created { job_id: id.clone() });
        Ok(id)
    }

    pub async fn get(&self, id: &str) -> Result<Job> {
        let inner = self.inner.read().await;
        inner
            .jobs
            .get(id)
            .map(|entry| entry.job.clone())
            .ok_or_else(|| CoreError::NotFound(id.to_string()))
    }

    /// Jobs in insertion order.
    pub async fn list(&self) -> Vec<Job> {
        let inner = self.inner.read().await;
        inner
            .order
            .iter()
            .filter_map(|id| inner.jobs.get(id))
            .map(|entry| entry.job.clone())
            .collect()
    }

    pub async fn list_reports(&self, id: &str) -> Result<Vec<Report>> {
        let inner = self.inner.read().await;
        inner
            .jobs
            .get(id)
            .map(|entry| entry.job.reports.clone())
            .ok_or_else(|| CoreError::NotFound(id.to_string()))
    }

    /// Removes the job with its reports. Unknown ids are always a no-op.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        if !inner.jobs.contains_key(id) {
            tracing::debug!(job_id = %id, "delete of unknown job ignored");
            return Ok(());
        }
        if let Some(repository) = &self.repository {
            repository.delete(id).await?;
        }
        if let Some(entry) = inner.jobs.remove(id) {
            if entry.in_flight.is_some() {
                tracing::info!(job_id = %id, "deleted job with a run in flight");
            }
        }
        inner.order.retain(|existing| existing != id);
        drop(inner);

        tracing::info!(job_id = %id, "job deleted");
        self.emit(JobEvent::Deleted { job_id: id.to_string() });
        Ok(())
    }

    /// Sets `status` and refreshes `last_run`.
    pub async fn update_status(&self, id: &str, status: JobStatus) -> Result<()> {
        let mut inner = self.inner.write().await;
        let Some(entry) = inner.jobs.get_mut(id) else {
            return self.missing_job(id);
        };
        if status == JobStatus::Running && entry.in_flight.is_none() {
            return Err(CoreError::Validation(format!(
                "job {} has no run in flight and cannot be marked Running; start it instead",
                id
            )));
        }

        let mut updated = entry.job.clone();
        updated.status = status;
        updated.last_run = Some(Utc::now());
        self.persist(entry.position, &updated).await?;
        entry.job = updated;
        drop(inner);

        self.emit(JobEvent::StatusChanged {
            job_id: id.to_string(),
            status,
        });
        Ok(())
    }

    pub async fn append_report(&self, job_id: &str, report: Report) -> Result<()> {
        let mut inner = self.inner.write().await;
        let Some(entry) = inner.jobs.get_mut(job_id) else {
            return self.missing_job(job_id);
        };

        let report_id = report.id().to_string();
        let mut updated = entry.job.clone();
        updated.reports.push(report);
        self.persist(entry.position, &updated).await?;
        entry.job = updated;
        drop(inner);

        self.emit(JobEvent::ReportAppended {
            job_id: job_id.to_string(),
            report_id,
        });
        Ok(())
    }

    /// Admits a run unless one is already in flight. The check, the in-flight
    /// mark and the `Running` status are applied under one write lock.
    ///
    /// A job that was moved off `Running` while its run is still outstanding
    /// goes back to `Running` and adopts that run instead of dispatching a
    /// second one.
    pub(crate) async fn try_begin_run(&self, id: &str) -> Result<BeginRun> {
        let mut inner = self.inner.write().await;
        let Some(entry) = inner.jobs.get_mut(id) else {
            return Ok(BeginRun::Missing);
        };
        if entry.in_flight.is_some() {
            if entry.job.status == JobStatus::Running {
                return Ok(BeginRun::AlreadyRunning);
            }

            let mut updated = entry.job.clone();
            updated.status = JobStatus::Running;
            updated.last_run = Some(Utc::now());
            self.persist(entry.position, &updated).await?;
            entry.job = updated;
            drop(inner);

            tracing::info!(job_id = %id, "job resumed its outstanding run");
            self.emit(JobEvent::StatusChanged {
                job_id: id.to_string(),
                status: JobStatus::Running,
            });
            return Ok(BeginRun::Resumed);
        }

        let mut updated = entry.job.clone();
        updated.status = JobStatus::Running;
        updated.last_run = Some(Utc::now());
        self.persist(entry.position, &updated).await?;

        let ticket = RunTicket {
            run_id: Uuid::new_v4().to_string(),
            job_id: updated.id.clone(),
            job_name: updated.name.clone(),
            targets: updated.targets.clone(),
        };
        entry.job = updated;
        entry.in_flight = Some(ticket.run_id.clone());
        drop(inner);

        self.emit(JobEvent::StatusChanged {
            job_id: id.to_string(),
            status: JobStatus::Running,
        });
        Ok(BeginRun::Started(ticket))
    }

    /// Records the end of the run identified by `ticket`.
    ///
    /// `Ok(report)` appends the report and completes the job, `Err` fails it.
    /// Nothing is recorded if the job was deleted, or if its status was moved
    /// off `Running` externally and the job was not started again before the
    /// run returned.
    pub(crate) async fn finish_run(
        &self,
        ticket: &RunTicket,
        result: Result<Report>,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        let Some(entry) = inner.jobs.get_mut(&ticket.job_id) else {
            tracing::debug!(job_id = %ticket.job_id, "run finished for deleted job");
            return Ok(());
        };
        if entry.in_flight.as_deref() != Some(ticket.run_id.as_str()) {
            tracing::warn!(job_id = %ticket.job_id, run_id = %ticket.run_id, "stale run result ignored");
            return Ok(());
        }
        entry.in_flight = None;

        if entry.job.status != JobStatus::Running {
            tracing::info!(
                job_id = %ticket.job_id,
                status = %entry.job.status,
                "job left Running during the run, result discarded"
            );
            return Ok(());
        }

        let mut updated = entry.job.clone();
        updated.last_run = Some(Utc::now());
        let mut events = Vec::with_capacity(2);
        match result {
            Ok(report) => {
                events.push(JobEvent::ReportAppended {
                    job_id: ticket.job_id.clone(),
                    report_id: report.id().to_string(),
                });
                updated.reports.push(report);
                updated.status = JobStatus::Completed;
            }
            Err(e) => {
                tracing::warn!(job_id = %ticket.job_id, error = %e, "run failed");
                updated.status = JobStatus::Failed;
            }
        }
        events.push(JobEvent::StatusChanged {
            job_id: ticket.job_id.clone(),
            status: updated.status,
        });

        self.persist(entry.position, &updated).await?;
        entry.job = updated;
        drop(inner);

        for event in events {
            self.emit(event);
        }
        Ok(())
    }

    /// Applies the missing-job policy for mutating operations.
    pub(crate) fn missing_job(&self, id: &str) -> Result<()> {
        match self.policy {
            MissingJobPolicy::Ignore => {
                tracing::debug!(job_id = %id, "operation on unknown job ignored");
                Ok(())
            }
            MissingJobPolicy::Error => Err(CoreError::NotFound(id.to_string())),
        }
    }

    async fn persist(&self, position: i64, job: &Job) -> Result<()> {
        if let Some(repository) = &self.repository {
            repository.save(position, job).await?;
        }
        Ok(())
    }

    fn emit(&self, event: JobEvent) {
        // 没有订阅者时发送失败，忽略即可
        let _ = self.events.send(event);
    }
}
