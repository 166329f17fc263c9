// Dashboard summary and list queries, computed from the canonical job model.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::job::{Job, JobStatus};
use crate::report::{Report, SeverityCounts};

const RECENT_JOBS: usize = 3;

#[derive(Debug, Clone, Serialize)]
pub struct RecentJob {
    pub id: String,
    pub name: String,
    pub status: JobStatus,
    pub last_run: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardSummary {
    pub total_jobs: usize,
    pub running_jobs: usize,
    pub completed_jobs: usize,
    pub status_counts: HashMap<JobStatus, usize>,
    /// Sum over every report of every job.
    pub severity_totals: SeverityCounts,
    /// Sum over the latest report of each job.
    pub latest_severity_totals: SeverityCounts,
    pub recent_jobs: Vec<RecentJob>,
}

impl DashboardSummary {
    pub fn from_jobs(jobs: &[Job]) -> Self {
        let mut status_counts: HashMap<JobStatus, usize> =
            JobStatus::ALL.into_iter().map(|status| (status, 0)).collect();
        let mut severity_totals = SeverityCounts::default();
        let mut latest_severity_totals = SeverityCounts::default();

        for job in jobs {
            *status_counts.entry(job.status).or_insert(0) += 1;
            for report in &job.reports {
                severity_totals += report.severity_counts();
            }
            if let Some(latest) = job.latest_report() {
                latest_severity_totals += latest.severity_counts();
            }
        }

        let mut recent: Vec<&Job> = jobs.iter().collect();
        // stable sort keeps insertion order among equal timestamps
        recent.sort_by(|a, b| b.last_run.cmp(&a.last_run));
        let recent_jobs = recent
            .into_iter()
            .take(RECENT_JOBS)
            .map(|job| RecentJob {
                id: job.id.clone(),
                name: job.name.clone(),
                status: job.status,
                last_run: job.last_run,
            })
            .collect();

        Self {
            total_jobs: jobs.len(),
            running_jobs: status_counts[&JobStatus::Running],
            completed_jobs: status_counts[&JobStatus::Completed],
            status_counts,
            severity_totals,
            latest_severity_totals,
            recent_jobs,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LastRunFilter {
    #[default]
    All,
    Today,
    Week,
    Month,
    Never,
}

impl LastRunFilter {
    fn matches(&self, last_run: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        let window = match self {
            LastRunFilter::All => return true,
            LastRunFilter::Never => return last_run.is_none(),
            LastRunFilter::Today => Duration::days(1),
            LastRunFilter::Week => Duration::days(7),
            LastRunFilter::Month => Duration::days(30),
        };
        last_run.map_or(false, |at| at > now - window)
    }
}

/// Filters on the latest report of a job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeverityFilter {
    #[default]
    All,
    Critical,
    High,
    Medium,
    Low,
    /// No report yet, or nothing above `Log` in the latest one.
    None,
}

impl SeverityFilter {
    fn matches(&self, job: &Job) -> bool {
        let Some(latest) = job.latest_report() else {
            return matches!(self, SeverityFilter::All | SeverityFilter::None);
        };
        let counts = latest.severity_counts();
        match self {
            SeverityFilter::All => true,
            SeverityFilter::Critical => counts.critical > 0,
            SeverityFilter::High => counts.high > 0,
            SeverityFilter::Medium => counts.medium > 0,
            SeverityFilter::Low => counts.low > 0,
            SeverityFilter::None => counts.is_clean(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    Name,
    Status,
    Severity,
    Findings,
    LastRun,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    fn apply(&self, ordering: Ordering) -> Ordering {
        match self {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JobQuery {
    /// Case-insensitive match on the job name or any target.
    pub search: Option<String>,
    pub last_run: LastRunFilter,
    pub severity: SeverityFilter,
    /// Insertion order is kept when unset.
    pub sort: Option<SortField>,
    pub direction: SortDirection,
}

impl JobQuery {
    pub fn apply(&self, jobs: Vec<Job>, now: DateTime<Utc>) -> Vec<Job> {
        let needle = self
            .search
            .as_deref()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());

        let mut jobs: Vec<Job> = jobs
            .into_iter()
            .filter(|job| match &needle {
                None => true,
                Some(needle) => {
                    job.name.to_lowercase().contains(needle)
                        || job.targets.iter().any(|t| t.to_lowercase().contains(needle))
                }
            })
            .filter(|job| self.last_run.matches(job.last_run, now))
            .filter(|job| self.severity.matches(job))
            .collect();

        if let Some(field) = self.sort {
            jobs.sort_by(|a, b| self.direction.apply(compare(field, a, b)));
        }
        jobs
    }
}

fn compare(field: SortField, a: &Job, b: &Job) -> Ordering {
    match field {
        SortField::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
        SortField::Status => a.status.as_str().cmp(b.status.as_str()),
        SortField::Severity => latest_weight(a).cmp(&latest_weight(b)),
        SortField::Findings => latest_findings(a).cmp(&latest_findings(b)),
        SortField::LastRun => a.last_run.cmp(&b.last_run),
    }
}

fn latest_weight(job: &Job) -> usize {
    job.latest_report()
        .map_or(0, |report| report.severity_counts().weighted_score())
}

fn latest_findings(job: &Job) -> usize {
    job.latest_report().map_or(0, |report| report.findings().len())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportSortField {
    #[default]
    Date,
    Name,
    Severity,
}

/// Filters reports by job name snapshot and sorts them.
pub fn sort_reports(
    reports: Vec<Report>,
    search: Option<&str>,
    field: ReportSortField,
    direction: SortDirection,
) -> Vec<Report> {
    let needle = search
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty());

    let mut reports: Vec<Report> = reports
        .into_iter()
        .filter(|report| {
            needle
                .as_ref()
                .map_or(true, |needle| report.job_name().to_lowercase().contains(needle))
        })
        .collect();

    reports.sort_by(|a, b| {
        let ordering = match field {
            ReportSortField::Date => a.completed_at().cmp(&b.completed_at()),
            ReportSortField::Name => a.job_name().to_lowercase().cmp(&b.job_name().to_lowercase()),
            ReportSortField::Severity => a
                .severity_counts()
                .weighted_score()
                .cmp(&b.severity_counts().weighted_score()),
        };
        direction.apply(ordering)
    });
    reports
}
