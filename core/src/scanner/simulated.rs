use super::catalog::{builtin_templates, load_templates_from_dir, FindingTemplate};
use super::{ExecutorError, Finding, ScanExecutor};
use crate::config::ExecutorConfig;
use async_trait::async_trait;
use ipnet::IpNet;
use rand::Rng;
use std::net::IpAddr;
use std::ops::Range;
use std::time::Duration;

const FINDING_COUNT: Range<usize> = 15..35;
const SCORE_JITTER: f64 = 0.25;
// Upper bound on hosts taken from a single CIDR target.
const MAX_HOSTS_PER_RANGE: usize = 4096;

/// Stand-in for a real probe: after a fixed delay it reports a random
/// selection of catalog findings spread over the target hosts.
pub struct SimulatedExecutor {
    templates: Vec<FindingTemplate>,
    delay: Duration,
}

impl SimulatedExecutor {
    pub fn new(templates: Vec<FindingTemplate>, delay: Duration) -> Self {
        Self { templates, delay }
    }

    pub fn with_builtin_catalog(delay: Duration) -> Self {
        Self::new(builtin_templates(), delay)
    }

    pub fn from_config(config: &ExecutorConfig) -> anyhow::Result<Self> {
        let mut templates = builtin_templates();
        if let Some(dir) = &config.catalog_dir {
            let extra = load_templates_from_dir(dir)?;
            tracing::info!(dir = ?dir, templates = extra.len(), "loaded extra finding templates");
            templates.extend(extra);
        }
        Ok(Self::new(templates, Duration::from_millis(config.simulated_delay_ms)))
    }

    pub fn template_count(&self) -> usize {
        self.templates.len()
    }

    fn generate(&self, targets: &[String], target_count: usize) -> Result<Vec<Finding>, ExecutorError> {
        if self.templates.is_empty() {
            return Err(ExecutorError::Failed("finding catalog is empty".to_string()));
        }

        let hosts = candidate_hosts(targets, target_count);
        let mut rng = rand::rng();
        let count = rng.random_range(FINDING_COUNT);
        let mut findings = Vec::with_capacity(count);

        for _ in 0..count {
            let template = &self.templates[rng.random_range(0..self.templates.len())];
            let host = &hosts[rng.random_range(0..hosts.len())];
            let jitter = rng.random_range(-SCORE_JITTER..SCORE_JITTER);
            let score = (template.score + jitter).clamp(Finding::MIN_SCORE, Finding::MAX_SCORE);
            let cve = format!("CVE-2023-{}", rng.random_range(10000..100000));
            let nvd = format!(
                "https://nvd.nist.gov/vuln/detail/CVE-2023-{}",
                rng.random_range(10000..100000)
            );

            let finding = Finding::new(template.name.clone(), template.severity, score)
                .map_err(|e| ExecutorError::Failed(e.to_string()))?
                .with_host(host.clone())
                .with_port(template.port.clone())
                .with_description(template.description.clone())
                .with_solution(template.solution.clone())
                .with_references(vec![cve, nvd]);
            findings.push(finding);
        }

        Ok(findings)
    }
}

#[async_trait]
impl ScanExecutor for SimulatedExecutor {
    fn name(&self) -> String {
        "SimulatedExecutor".to_string()
    }

    async fn execute(
        &self,
        targets: &[String],
        target_count: usize,
    ) -> Result<Vec<Finding>, ExecutorError> {
        if targets.is_empty() && target_count == 0 {
            return Err(ExecutorError::InvalidTargets("target list is empty".to_string()));
        }
        tokio::time::sleep(self.delay).await;
        self.generate(targets, target_count)
    }
}

/// Expands targets into the addresses a finding may be attributed to. CIDR
/// ranges contribute their host addresses, anything else is taken verbatim.
fn candidate_hosts(targets: &[String], target_count: usize) -> Vec<String> {
    let mut hosts = Vec::new();
    for target in targets {
        let target = target.trim();
        if target.is_empty() {
            continue;
        }
        if let Ok(net) = target.parse::<IpNet>() {
            hosts.extend(net.hosts().take(MAX_HOSTS_PER_RANGE).map(|ip| ip.to_string()));
        } else if let Ok(ip) = target.parse::<IpAddr>() {
            hosts.push(ip.to_string());
        } else {
            hosts.push(target.to_string());
        }
    }

    if hosts.is_empty() {
        hosts = (1..=target_count.max(1))
            .map(|i| format!("192.168.1.{}", i))
            .collect();
    }
    hosts
}
