// Scanner module - 扫描执行器模块
// 定义扫描执行器的核心接口和发现结果类型

pub mod catalog;
pub mod simulated;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{CoreError, Result};

/// Severity tier, ranked from most to least urgent.
///
/// Parsing is exact and case-sensitive: `"High"` is a tier, `"high"` is not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Log,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
        Severity::Log,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "Critical",
            Severity::High => "High",
            Severity::Medium => "Medium",
            Severity::Low => "Low",
            Severity::Log => "Log",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Severity::ALL
            .into_iter()
            .find(|tier| tier.as_str() == s)
            .ok_or_else(|| CoreError::Validation(format!("unknown severity tier: {:?}", s)))
    }
}

/// 漏洞发现结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "FindingRecord")]
pub struct Finding {
    pub id: String,
    pub name: String,
    pub severity: Severity,
    /// CVSS-style score in `[0, 10]`.
    pub score: f64,
    pub host: String,
    /// Port and protocol, e.g. `443/tcp` or `general/tcp`.
    pub port: String,
    pub description: String,
    pub solution: String,
    pub references: Vec<String>,
}

// 反序列化时先读入原始记录，再校验
#[derive(Deserialize)]
struct FindingRecord {
    id: String,
    name: String,
    severity: Severity,
    score: f64,
    host: String,
    port: String,
    description: String,
    solution: String,
    #[serde(default)]
    references: Vec<String>,
}

impl TryFrom<FindingRecord> for Finding {
    type Error = CoreError;

    fn try_from(record: FindingRecord) -> Result<Self> {
        let finding = Finding {
            id: record.id,
            name: record.name,
            severity: record.severity,
            score: record.score,
            host: record.host,
            port: record.port,
            description: record.description,
            solution: record.solution,
            references: record.references,
        };
        finding.validate()?;
        Ok(finding)
    }
}

impl Finding {
    pub const MIN_SCORE: f64 = 0.0;
    pub const MAX_SCORE: f64 = 10.0;

    pub fn new(name: impl Into<String>, severity: Severity, score: f64) -> Result<Self> {
        let finding = Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            severity,
            score,
            host: String::new(),
            port: String::new(),
            description: String::new(),
            solution: String::new(),
            references: Vec::new(),
        };
        finding.validate()?;
        Ok(finding)
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.port = port.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_solution(mut self, solution: impl Into<String>) -> Self {
        self.solution = solution.into();
        self
    }

    pub fn with_references(mut self, references: Vec<String>) -> Self {
        self.references = references;
        self
    }

    /// Checks the invariants that the type system cannot: a finite score inside
    /// `[0, 10]` and a non-empty name.
    pub fn validate(&self) -> Result<()> {
        if !self.score.is_finite() || self.score < Self::MIN_SCORE || self.score > Self::MAX_SCORE {
            return Err(CoreError::Validation(format!(
                "finding {:?} has score {} outside [0, 10]",
                self.name, self.score
            )));
        }
        if self.name.trim().is_empty() {
            return Err(CoreError::Validation("finding name is empty".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("scan failed: {0}")]
    Failed(String),

    #[error("no usable targets: {0}")]
    InvalidTargets(String),
}

/// 扫描执行器 trait - 真实探测或模拟实现都需要实现此接口
///
/// The lifecycle engine calls `execute` exactly once per run on a spawned task
/// and makes no assumption about how long it takes.
#[async_trait]
pub trait ScanExecutor: Send + Sync {
    /// 返回执行器名称
    fn name(&self) -> String;

    /// Scans `targets` and yields the findings of one run.
    async fn execute(
        &self,
        targets: &[String],
        target_count: usize,
    ) -> std::result::Result<Vec<Finding>, ExecutorError>;
}
