use actix_web::{web, HttpResponse, Responder};
use openscan_core::{sort_reports, ReportSortField, SortDirection};
use serde::Deserialize;

use crate::state::AppState;

/// 报告列表查询参数，默认按完成时间倒序
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ReportQuery {
    pub search: Option<String>,
    pub sort: ReportSortField,
    pub direction: Option<SortDirection>,
}

pub fn configure_report_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("", web::get().to(get_reports));
}

/// 所有任务的报告
pub async fn get_reports(
    state: web::Data<AppState>,
    query: web::Query<ReportQuery>,
) -> impl Responder {
    let query = query.into_inner();
    let reports = sort_reports(
        state.engine.all_reports().await,
        query.search.as_deref(),
        query.sort,
        query.direction.unwrap_or(SortDirection::Desc),
    );
    HttpResponse::Ok().json(reports)
}

/// 仪表盘统计
pub async fn get_summary(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(state.engine.summary().await)
}

#[cfg(test)]
mod tests {
    use actix_web::{test, web, App};
    use openscan_core::{
        EngineConfig, ExecutorError, Finding, JobSpec, JobStatus, ScanExecutor, Severity,
        TargetMode,
    };
    use serde_json::Value;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::api::create_api_router;
    use crate::state::AppState;

    /// 每次返回一个 High 和一个 Low
    struct StaticExecutor;

    #[async_trait::async_trait]
    impl ScanExecutor for StaticExecutor {
        fn name(&self) -> String {
            "StaticExecutor".to_string()
        }

        async fn execute(&self, targets: &[String], _count: usize) -> Result<Vec<Finding>, ExecutorError> {
            let host = targets.first().cloned().unwrap_or_default();
            Ok(vec![
                Finding::new("Outdated PHP Version", Severity::High, 8.1)
                    .map_err(|e| ExecutorError::Failed(e.to_string()))?
                    .with_host(host.clone()),
                Finding::new("HTTP TRACE Method Enabled", Severity::Low, 2.6)
                    .map_err(|e| ExecutorError::Failed(e.to_string()))?
                    .with_host(host),
            ])
        }
    }

    async fn run_to_completion(state: &AppState, name: &str) -> String {
        let id = state
            .engine
            .create_job(JobSpec::named(name, TargetMode::Localhost))
            .await
            .unwrap();
        state.engine.start_job(&id).await.unwrap();
        for _ in 0..500 {
            if state.engine.get_job(&id).await.unwrap().status == JobStatus::Completed {
                return id;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job {} never completed", name);
    }

    #[actix_web::test]
    async fn test_reports_default_to_newest_first() {
        let state = AppState::in_memory(Arc::new(StaticExecutor), &EngineConfig::default());
        run_to_completion(&state, "first").await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        run_to_completion(&state, "second").await;

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .service(create_api_router()),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/reports").to_request();
        let reports: Value = test::call_and_read_body_json(&app, req).await;
        let names: Vec<&str> = reports
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["job_name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["second", "first"]);

        let req = test::TestRequest::get()
            .uri("/api/reports?search=FIR&sort=name&direction=asc")
            .to_request();
        let reports: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(reports.as_array().unwrap().len(), 1);
        assert_eq!(reports[0]["severity_counts"]["high"], 1);
        assert_eq!(reports[0]["severity_counts"]["low"], 1);
    }

    #[actix_web::test]
    async fn test_summary_counts_jobs_and_findings() {
        let state = AppState::in_memory(Arc::new(StaticExecutor), &EngineConfig::default());
        run_to_completion(&state, "done").await;
        state
            .engine
            .create_job(JobSpec::named("idle", TargetMode::Localhost))
            .await
            .unwrap();

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .service(create_api_router()),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/summary").to_request();
        let summary: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(summary["total_jobs"], 2);
        assert_eq!(summary["completed_jobs"], 1);
        assert_eq!(summary["running_jobs"], 0);
        assert_eq!(summary["status_counts"]["New"], 1);
        assert_eq!(summary["severity_totals"]["high"], 1);
        assert_eq!(summary["recent_jobs"][0]["name"], "done");
    }
}
