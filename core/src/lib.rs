// OpenScan Core Library
// 核心功能库，包含任务生命周期引擎、任务存储、扫描执行器接口和报告统计

mod config;
mod engine;
mod job;
mod report;
mod scanner;
mod summary;

// 重新导出常用类型
pub use config::{EngineConfig, ExecutorConfig, MissingJobPolicy};
pub use engine::{LifecycleEngine, StartOutcome};
pub use job::repository::{JobRepository, SqliteJobRepository};
pub use job::store::{JobEvent, JobStore, RunTicket};
pub use job::{parse_host_list, Job, JobSpec, JobStatus, TargetMode, LOCALHOST, UNNAMED_JOB};
pub use report::{aggregate, score_histogram, Report, ReportBuilder, ReportOutcome, SeverityCounts};
pub use scanner::catalog::{builtin_templates, load_templates_from_dir, FindingTemplate};
pub use scanner::simulated::SimulatedExecutor;
pub use scanner::{ExecutorError, Finding, ScanExecutor, Severity};
pub use summary::{
    sort_reports, DashboardSummary, JobQuery, LastRunFilter, RecentJob, ReportSortField, SeverityFilter,
    SortDirection, SortField,
};

pub mod error {
    use thiserror::Error;

    #[derive(Error, Debug)]
    pub enum CoreError {
        #[error("Validation error: {0}")]
        Validation(String),

        #[error("Job not found: {0}")]
        NotFound(String),

        #[error("Execution failed: {0}")]
        Execution(String),

        #[error("Database error: {0}")]
        Database(#[from] sqlx::Error),

        #[error("Serialization error: {0}")]
        Serialization(#[from] serde_json::Error),
    }

    pub type Result<T> = std::result::Result<T, CoreError>;
}
