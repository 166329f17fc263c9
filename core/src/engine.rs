// Lifecycle engine - 任务生命周期引擎
// 负责状态流转、派发扫描执行器、接收结果并生成报告

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use crate::config::EngineConfig;
use crate::error::{CoreError, Result};
use crate::job::store::{BeginRun, JobEvent, JobStore, RunTicket};
use crate::job::{Job, JobSpec, JobStatus};
use crate::report::{Report, ReportBuilder};
use crate::scanner::{Finding, ScanExecutor};
use crate::summary::{DashboardSummary, JobQuery};

/// What `start_job` did with the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StartOutcome {
    /// A new run was dispatched; the job is now `Running`.
    Started,
    /// The job was stopped while its run was still in flight. It is `Running`
    /// again and the outstanding run's result will be recorded.
    Resumed,
    /// A run was already in flight; nothing changed.
    AlreadyRunning,
    /// The job does not exist and the missing-job policy is `ignore`.
    Ignored,
}

#[derive(Clone)]
pub struct LifecycleEngine {
    store: Arc<JobStore>,
    executor: Arc<dyn ScanExecutor>,
    timeout: Option<Duration>,
}

impl LifecycleEngine {
    pub fn new(store: Arc<JobStore>, executor: Arc<dyn ScanExecutor>, config: &EngineConfig) -> Self {
        tracing::info!(
            executor = %executor.name(),
            timeout = ?config.executor_timeout(),
            "lifecycle engine ready"
        );
        Self {
            store,
            executor,
            timeout: config.executor_timeout(),
        }
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.store.subscribe()
    }

    pub async fn create_job(&self, spec: JobSpec) -> Result<String> {
        self.store.create(spec).await
    }

    pub async fn list_jobs(&self) -> Vec<Job> {
        self.store.list().await
    }

    pub async fn query_jobs(&self, query: &JobQuery) -> Vec<Job> {
        query.apply(self.store.list().await, Utc::now())
    }

    pub async fn get_job(&self, id: &str) -> Result<Job> {
        self.store.get(id).await
    }

    pub async fn delete_job(&self, id: &str) -> Result<()> {
        self.store.delete(id).await
    }

    /// The external status path, e.g. marking a job `Stopped`.
    pub async fn update_status(&self, id: &str, status: JobStatus) -> Result<()> {
        self.store.update_status(id, status).await
    }

    pub async fn list_reports(&self, job_id: &str) -> Result<Vec<Report>> {
        self.store.list_reports(job_id).await
    }

    /// Reports of every job, jobs in insertion order.
    pub async fn all_reports(&self) -> Vec<Report> {
        self.store
            .list()
            .await
            .into_iter()
            .flat_map(|job| job.reports)
            .collect()
    }

    pub async fn summary(&self) -> DashboardSummary {
        DashboardSummary::from_jobs(&self.store.list().await)
    }

    /// Moves the job to `Running` before returning and runs the executor on a
    /// separate task. Execution failures never surface here; they show up as
    /// status `Failed`.
    pub async fn start_job(&self, id: &str) -> Result<StartOutcome> {
        let ticket = match self.store.try_begin_run(id).await? {
            BeginRun::Started(ticket) => ticket,
            BeginRun::Resumed => return Ok(StartOutcome::Resumed),
            BeginRun::AlreadyRunning => {
                tracing::debug!(job_id = %id, "start requested while a run is in flight");
                return Ok(StartOutcome::AlreadyRunning);
            }
            BeginRun::Missing => {
                self.store.missing_job(id)?;
                return Ok(StartOutcome::Ignored);
            }
        };

        tracing::info!(
            job_id = %ticket.job_id,
            run_id = %ticket.run_id,
            targets = ticket.targets.len(),
            "run dispatched"
        );

        let store = Arc::clone(&self.store);
        let executor = Arc::clone(&self.executor);
        let timeout = self.timeout;
        tokio::spawn(async move {
            let result = execute(executor, &ticket, timeout).await.and_then(|findings| {
                ReportBuilder::new(ticket.job_id.clone(), ticket.job_name.clone())
                    .findings(findings)
                    .build()
            });

            if let Ok(report) = &result {
                tracing::info!(
                    job_id = %ticket.job_id,
                    findings = report.findings().len(),
                    critical = report.severity_counts().critical,
                    high = report.severity_counts().high,
                    "run completed"
                );
            }

            if let Err(e) = store.finish_run(&ticket, result).await {
                tracing::error!(job_id = %ticket.job_id, error = %e, "failed to record run result");
            }
        });

        Ok(StartOutcome::Started)
    }
}

/// Runs the executor on its own task so a panic or an expired timeout is
/// reported as an execution failure instead of leaving the job `Running`.
async fn execute(
    executor: Arc<dyn ScanExecutor>,
    ticket: &RunTicket,
    timeout: Option<Duration>,
) -> Result<Vec<Finding>> {
    let targets = ticket.targets.clone();
    let mut handle = tokio::spawn(async move {
        let count = targets.len();
        executor.execute(&targets, count).await
    });

    let joined = match timeout {
        Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
            Ok(joined) => joined,
            Err(_) => {
                handle.abort();
                return Err(CoreError::Execution(format!(
                    "executor did not finish within {:?}",
                    limit
                )));
            }
        },
        None => handle.await,
    };

    match joined {
        Ok(Ok(findings)) => Ok(findings),
        Ok(Err(e)) => Err(CoreError::Execution(e.to_string())),
        Err(e) => Err(CoreError::Execution(format!("executor task aborted: {}", e))),
    }
}
