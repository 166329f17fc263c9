// Report module - 报告与严重程度统计

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign};
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::scanner::{Finding, Severity};

/// Number of findings per severity tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub log: usize,
}

impl SeverityCounts {
    pub fn get(&self, severity: Severity) -> usize {
        match severity {
            Severity::Critical => self.critical,
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
            Severity::Log => self.log,
        }
    }

    fn bump(&mut self, severity: Severity) {
        match severity {
            Severity::Critical => self.critical += 1,
            Severity::High => self.high += 1,
            Severity::Medium => self.medium += 1,
            Severity::Low => self.low += 1,
            Severity::Log => self.log += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.critical + self.high + self.medium + self.low + self.log
    }

    /// Ranking key used when sorting jobs and reports by severity. Log
    /// findings carry no weight.
    pub fn weighted_score(&self) -> usize {
        self.critical * 4 + self.high * 3 + self.medium * 2 + self.low
    }

    /// True when nothing above `Log` was found.
    pub fn is_clean(&self) -> bool {
        self.critical == 0 && self.high == 0 && self.medium == 0 && self.low == 0
    }
}

impl AddAssign for SeverityCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.critical += rhs.critical;
        self.high += rhs.high;
        self.medium += rhs.medium;
        self.low += rhs.low;
        self.log += rhs.log;
    }
}

impl Add for SeverityCounts {
    type Output = SeverityCounts;

    fn add(mut self, rhs: Self) -> Self::Output {
        self += rhs;
        self
    }
}

/// Tallies findings per tier. Pure and order-independent.
pub fn aggregate(findings: &[Finding]) -> SeverityCounts {
    let mut counts = SeverityCounts::default();
    for finding in findings {
        counts.bump(finding.severity);
    }
    counts
}

/// Buckets findings by `floor(score)`; index `i` holds scores in `[i, i+1)`,
/// index 10 holds exact 10.0 scores.
pub fn score_histogram(findings: &[Finding]) -> [usize; 11] {
    let mut buckets = [0usize; 11];
    for finding in findings {
        let bucket = finding.score.floor();
        if (0.0..=10.0).contains(&bucket) {
            buckets[bucket as usize] += 1;
        }
    }
    buckets
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportOutcome {
    Completed,
    Failed,
}

/// The result of one execution of a job. Fields are only readable; the
/// severity counts are fixed when the report is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ReportRecord")]
pub struct Report {
    id: String,
    job_id: String,
    job_name: String,
    completed_at: DateTime<Utc>,
    outcome: ReportOutcome,
    findings: Vec<Finding>,
    severity_counts: SeverityCounts,
}

#[derive(Deserialize)]
struct ReportRecord {
    id: String,
    job_id: String,
    job_name: String,
    completed_at: DateTime<Utc>,
    outcome: ReportOutcome,
    findings: Vec<Finding>,
    severity_counts: SeverityCounts,
}

impl TryFrom<ReportRecord> for Report {
    type Error = CoreError;

    /// Stored counts must match the stored findings.
    fn try_from(record: ReportRecord) -> Result<Self> {
        let counted = aggregate(&record.findings);
        if counted != record.severity_counts {
            return Err(CoreError::Validation(format!(
                "report {} severity counts {:?} do not match its findings {:?}",
                record.id, record.severity_counts, counted
            )));
        }
        Ok(Report {
            id: record.id,
            job_id: record.job_id,
            job_name: record.job_name,
            completed_at: record.completed_at,
            outcome: record.outcome,
            findings: record.findings,
            severity_counts: record.severity_counts,
        })
    }
}

impl Report {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Job name at the time of the run.
    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    pub fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }

    pub fn outcome(&self) -> ReportOutcome {
        self.outcome
    }

    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    pub fn severity_counts(&self) -> SeverityCounts {
        self.severity_counts
    }
}

pub struct ReportBuilder {
    job_id: String,
    job_name: String,
    outcome: ReportOutcome,
    completed_at: Option<DateTime<Utc>>,
    findings: Vec<Finding>,
}

impl ReportBuilder {
    pub fn new(job_id: impl Into<String>, job_name: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            job_name: job_name.into(),
            outcome: ReportOutcome::Completed,
            completed_at: None,
            findings: Vec::new(),
        }
    }

    pub fn outcome(mut self, outcome: ReportOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn completed_at(mut self, completed_at: DateTime<Utc>) -> Self {
        self.completed_at = Some(completed_at);
        self
    }

    pub fn findings(mut self, findings: Vec<Finding>) -> Self {
        self.findings = findings;
        self
    }

    /// Validates every finding and freezes the severity tally.
    pub fn build(self) -> Result<Report> {
        for finding in &self.findings {
            finding.validate()?;
        }
        let severity_counts = aggregate(&self.findings);

        Ok(Report {
            id: Uuid::new_v4().to_string(),
            job_id: self.job_id,
            job_name: self.job_name,
            completed_at: self.completed_at.unwrap_or_else(Utc::now),
            outcome: self.outcome,
            findings: self.findings,
            severity_counts,
        })
    }
}
