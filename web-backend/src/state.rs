use anyhow::Context;
use openscan_core::{
    EngineConfig, JobStore, LifecycleEngine, ScanExecutor, SimulatedExecutor, SqliteJobRepository,
};
use std::sync::Arc;

use crate::config::AppConfig;

#[derive(Clone)]
pub struct AppState {
    pub engine: LifecycleEngine,
}

impl AppState {
    pub async fn new(config: &AppConfig) -> anyhow::Result<Self> {
        // 初始化任务存储
        let store = match &config.database_url {
            Some(url) => {
                let repository = SqliteJobRepository::connect(url)
                    .await
                    .with_context(|| format!("Failed to connect to database {}", url))?;
                tracing::info!(database = %url, "using sqlite job store");
                JobStore::with_repository(Arc::new(repository), &config.engine)
                    .await
                    .context("Failed to load persisted jobs")?
            }
            None => {
                tracing::warn!("OPENSCAN_DATABASE_URL not set, jobs are kept in memory only");
                JobStore::new(&config.engine)
            }
        };

        // 初始化扫描执行器
        let executor = SimulatedExecutor::from_config(&config.executor)?;
        tracing::info!(
            templates = executor.template_count(),
            delay_ms = config.executor.simulated_delay_ms,
            "simulated executor ready"
        );

        Ok(Self::from_parts(store, Arc::new(executor), &config.engine))
    }

    /// 内存存储 + 指定执行器
    pub fn in_memory(executor: Arc<dyn ScanExecutor>, config: &EngineConfig) -> Self {
        Self::from_parts(JobStore::new(config), executor, config)
    }

    fn from_parts(store: JobStore, executor: Arc<dyn ScanExecutor>, config: &EngineConfig) -> Self {
        let engine = LifecycleEngine::new(Arc::new(store), executor, config);
        Self { engine }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openscan_core::{ExecutorConfig, JobSpec, TargetMode};

    fn config(database_url: Option<String>) -> AppConfig {
        AppConfig {
            bind_address: "127.0.0.1:0".to_string(),
            database_url,
            engine: EngineConfig::default(),
            executor: ExecutorConfig {
                simulated_delay_ms: 0,
                catalog_dir: None,
            },
        }
    }

    #[actix_web::test]
    async fn sqlite_state_keeps_jobs_across_restarts() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("openscan.db").display());

        let id = {
            let state = AppState::new(&config(Some(url.clone()))).await.unwrap();
            state
                .engine
                .create_job(JobSpec::named("Persisted", TargetMode::Localhost))
                .await
                .unwrap()
        };

        let state = AppState::new(&config(Some(url))).await.unwrap();
        let job = state.engine.get_job(&id).await.unwrap();
        assert_eq!(job.name, "Persisted");
        assert_eq!(job.targets, vec!["127.0.0.1"]);
    }

    #[actix_web::test]
    async fn missing_catalog_dir_fails_startup() {
        let mut config = config(None);
        config.executor.catalog_dir = Some("/nonexistent/openscan/catalog".into());
        assert!(AppState::new(&config).await.is_err());
    }
}
