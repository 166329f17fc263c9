//! Shared fixtures for the lifecycle integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use openscan_core::{
    EngineConfig, ExecutorError, Finding, JobStatus, JobStore, LifecycleEngine, ScanExecutor,
    Severity,
};

/// Returns the same findings on every run.
pub struct FixedExecutor {
    findings: Vec<Finding>,
    pub calls: AtomicUsize,
}

impl FixedExecutor {
    pub fn new(findings: Vec<Finding>) -> Self {
        Self {
            findings,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ScanExecutor for FixedExecutor {
    fn name(&self) -> String {
        "FixedExecutor".to_string()
    }

    async fn execute(&self, _targets: &[String], _count: usize) -> Result<Vec<Finding>, ExecutorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        Ok(self.findings.clone())
    }
}

pub struct FailingExecutor;

#[async_trait]
impl ScanExecutor for FailingExecutor {
    fn name(&self) -> String {
        "FailingExecutor".to_string()
    }

    async fn execute(&self, _targets: &[String], _count: usize) -> Result<Vec<Finding>, ExecutorError> {
        Err(ExecutorError::Failed("probe unreachable".to_string()))
    }
}

/// Blocks every run until `release` is called, recording what it was given.
pub struct GatedExecutor {
    findings: Vec<Finding>,
    gate: Semaphore,
    pub calls: AtomicUsize,
    pub seen_targets: std::sync::Mutex<Vec<(Vec<String>, usize)>>,
}

impl GatedExecutor {
    pub fn new(findings: Vec<Finding>) -> Self {
        Self {
            findings,
            gate: Semaphore::new(0),
            calls: AtomicUsize::new(0),
            seen_targets: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn release(&self, runs: usize) {
        self.gate.add_permits(runs);
    }
}

#[async_trait]
impl ScanExecutor for GatedExecutor {
    fn name(&self) -> String {
        "GatedExecutor".to_string()
    }

    async fn execute(&self, targets: &[String], count: usize) -> Result<Vec<Finding>, ExecutorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_targets
            .lock()
            .unwrap()
            .push((targets.to_vec(), count));
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| ExecutorError::Failed(e.to_string()))?;
        permit.forget();
        Ok(self.findings.clone())
    }
}

/// Never completes.
pub struct HangingExecutor;

#[async_trait]
impl ScanExecutor for HangingExecutor {
    fn name(&self) -> String {
        "HangingExecutor".to_string()
    }

    async fn execute(&self, _targets: &[String], _count: usize) -> Result<Vec<Finding>, ExecutorError> {
        std::future::pending::<()>().await;
        Ok(Vec::new())
    }
}

pub struct PanickingExecutor;

#[async_trait]
impl ScanExecutor for PanickingExecutor {
    fn name(&self) -> String {
        "PanickingExecutor".to_string()
    }

    async fn execute(&self, _targets: &[String], _count: usize) -> Result<Vec<Finding>, ExecutorError> {
        panic!("executor bug");
    }
}

pub fn finding(name: &str, severity: Severity, score: f64) -> Finding {
    Finding::new(name, severity, score)
        .unwrap()
        .with_host("127.0.0.1")
        .with_port("443/tcp")
        .with_description(format!("{} description", name))
        .with_solution("patch it")
        .with_references(vec!["CVE-2023-12345".to_string()])
}

/// Two High findings and one Low.
pub fn three_findings() -> Vec<Finding> {
    vec![
        finding("Apache HTTP Server Multiple Vulnerabilities", Severity::High, 7.5),
        finding("Outdated PHP Version", Severity::High, 8.1),
        finding("HTTP TRACE Method Enabled", Severity::Low, 2.6),
    ]
}

pub fn engine_with(executor: Arc<dyn ScanExecutor>, config: EngineConfig) -> LifecycleEngine {
    let store = Arc::new(JobStore::new(&config));
    LifecycleEngine::new(store, executor, &config)
}

pub fn engine(executor: Arc<dyn ScanExecutor>) -> LifecycleEngine {
    engine_with(executor, EngineConfig::default())
}

/// Polls until the job reaches `status`, panicking after five seconds.
pub async fn wait_for_status(engine: &LifecycleEngine, id: &str, status: JobStatus) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let job = engine.get_job(id).await.unwrap();
        if job.status == status {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job {} stuck in {} waiting for {}",
            id,
            job.status,
            status
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Lets spawned tasks make progress without waiting on wall-clock time.
pub async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
}
