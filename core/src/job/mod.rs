// Job module - 扫描任务模型、任务存储与持久化

pub mod repository;
pub mod store;

use chrono::{DateTime, Utc};
use ipnet::IpNet;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::OnceLock;
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::report::Report;

pub const UNNAMED_JOB: &str = "Unnamed Scan";
pub const LOCALHOST: &str = "127.0.0.1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    New,
    Running,
    Stopped,
    Completed,
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::New,
        JobStatus::Running,
        JobStatus::Stopped,
        JobStatus::Completed,
        JobStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::New => "New",
            JobStatus::Running => "Running",
            JobStatus::Stopped => "Stopped",
            JobStatus::Completed => "Completed",
            JobStatus::Failed => "Failed",
        }
    }

    /// Every state except `Running` accepts a new run.
    pub fn is_resting(&self) -> bool {
        !matches!(self, JobStatus::Running)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| CoreError::Validation(format!("unknown job status: {:?}", s)))
    }
}

/// How the targets of a new job are given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum TargetMode {
    /// The local machine only.
    Localhost,
    /// Hosts separated by commas or newlines.
    Multiple { hosts: String },
    /// A single CIDR range.
    Network { range: String },
}

impl Default for TargetMode {
    fn default() -> Self {
        TargetMode::Localhost
    }
}

impl TargetMode {
    pub fn resolve(&self) -> Result<Vec<String>> {
        match self {
            TargetMode::Localhost => Ok(vec![LOCALHOST.to_string()]),
            TargetMode::Multiple { hosts } => {
                let targets = parse_host_list(hosts)?;
                if targets.is_empty() {
                    return Err(CoreError::Validation(
                        "at least one host is required".to_string(),
                    ));
                }
                Ok(targets)
            }
            TargetMode::Network { range } => {
                let range = range.trim();
                if range.is_empty() {
                    return Err(CoreError::Validation("network range is required".to_string()));
                }
                range.parse::<IpNet>().map_err(|_| {
                    CoreError::Validation(format!("{:?} is not a CIDR network range", range))
                })?;
                Ok(vec![range.to_string()])
            }
        }
    }
}

/// Everything a caller supplies to create a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobSpec {
    pub name: String,
    pub comment: String,
    pub target: TargetMode,
    /// Raw exclude list, separated like `TargetMode::Multiple`.
    pub exclude_hosts: String,
    pub port_list: String,
    pub scan_config: String,
    pub scanner: String,
    pub alive_test: String,
    pub schedule: String,
    pub add_to_assets: bool,
    pub apply_overrides: bool,
    pub min_qod: u8,
    pub max_checks_per_host: u32,
    pub max_concurrent_hosts: u32,
}

impl Default for JobSpec {
    fn default() -> Self {
        Self {
            name: String::new(),
            comment: String::new(),
            target: TargetMode::Localhost,
            exclude_hosts: String::new(),
            port_list: "all".to_string(),
            scan_config: "full".to_string(),
            scanner: "default".to_string(),
            alive_test: "default".to_string(),
            schedule: "once".to_string(),
            add_to_assets: true,
            apply_overrides: true,
            min_qod: 70,
            max_checks_per_host: 4,
            max_concurrent_hosts: 20,
        }
    }
}

impl JobSpec {
    pub fn named(name: impl Into<String>, target: TargetMode) -> Self {
        Self {
            name: name.into(),
            target,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub name: String,
    pub comment: String,
    pub targets: Vec<String>,
    pub exclude_hosts: Vec<String>,
    pub port_list: String,
    pub scan_config: String,
    pub scanner: String,
    pub alive_test: String,
    pub schedule: String,
    pub add_to_assets: bool,
    pub apply_overrides: bool,
    pub min_qod: u8,
    pub max_checks_per_host: u32,
    pub max_concurrent_hosts: u32,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reports: Vec<Report>,
}

impl Job {
    /// Validates `spec` and builds a fresh job in state `New`.
    pub fn from_spec(spec: JobSpec) -> Result<Self> {
        let targets = spec.target.resolve()?;
        let exclude_hosts = parse_host_list(&spec.exclude_hosts)?;

        if spec.min_qod > 100 {
            return Err(CoreError::Validation(format!(
                "minimum QoD must be within 0-100, got {}",
                spec.min_qod
            )));
        }
        if spec.max_checks_per_host == 0 {
            return Err(CoreError::Validation(
                "max checks per host must be at least 1".to_string(),
            ));
        }
        if spec.max_concurrent_hosts == 0 {
            return Err(CoreError::Validation(
                "max concurrent hosts must be at least 1".to_string(),
            ));
        }

        let name = match spec.name.trim() {
            "" => UNNAMED_JOB.to_string(),
            name => name.to_string(),
        };

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            name,
            comment: spec.comment,
            targets,
            exclude_hosts,
            port_list: spec.port_list,
            scan_config: spec.scan_config,
            scanner: spec.scanner,
            alive_test: spec.alive_test,
            schedule: spec.schedule,
            add_to_assets: spec.add_to_assets,
            apply_overrides: spec.apply_overrides,
            min_qod: spec.min_qod,
            max_checks_per_host: spec.max_checks_per_host,
            max_concurrent_hosts: spec.max_concurrent_hosts,
            status: JobStatus::New,
            created_at: Utc::now(),
            last_run: None,
            reports: Vec::new(),
        })
    }

    pub fn latest_report(&self) -> Option<&Report> {
        self.reports.last()
    }
}

fn separator() -> &'static Regex {
    static SEPARATOR: OnceLock<Regex> = OnceLock::new();
    SEPARATOR.get_or_init(|| Regex::new(r"[\n,]").expect("separator pattern is valid"))
}

fn hostname() -> &'static Regex {
    static HOSTNAME: OnceLock<Regex> = OnceLock::new();
    HOSTNAME.get_or_init(|| {
        Regex::new(r"^(?i)[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?(\.[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?)*\.?$")
            .expect("hostname pattern is valid")
    })
}

/// Splits a comma/newline separated host list, dropping blanks. Each entry
/// must be an IP address, a CIDR range or a hostname.
pub fn parse_host_list(raw: &str) -> Result<Vec<String>> {
    separator()
        .split(raw)
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            if is_valid_target(entry) {
                Ok(entry.to_string())
            } else {
                Err(CoreError::Validation(format!("malformed host entry: {:?}", entry)))
            }
        })
        .collect()
}

fn is_valid_target(entry: &str) -> bool {
    entry.parse::<IpAddr>().is_ok()
        || entry.parse::<IpNet>().is_ok()
        || (entry.len() <= 253 && hostname().is_match(entry))
}
