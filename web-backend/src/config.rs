use anyhow::Context;
use openscan_core::{EngineConfig, ExecutorConfig};

pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8000";

/// 服务配置，从 `OPENSCAN_*` 环境变量读取
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_address: String,
    /// 未设置时任务只保存在内存中
    pub database_url: Option<String>,
    pub engine: EngineConfig,
    pub executor: ExecutorConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_address = lookup("OPENSCAN_BIND_ADDRESS")
            .map(|addr| addr.trim().to_string())
            .filter(|addr| !addr.is_empty())
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let database_url = lookup("OPENSCAN_DATABASE_URL")
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty());

        let engine = EngineConfig::from_lookup(&lookup).context("invalid engine configuration")?;
        let executor =
            ExecutorConfig::from_lookup(&lookup).context("invalid executor configuration")?;

        Ok(Self {
            bind_address,
            database_url,
            engine,
            executor,
        })
    }
}
