use actix_web::{web, HttpResponse, Responder};
use openscan_core::{JobQuery, JobSpec, JobStatus};
use serde::{Deserialize, Serialize};

use super::error_response;
use crate::state::AppState;

#[derive(Serialize)]
pub struct CreateJobResponse {
    pub id: String,
}

#[derive(Deserialize)]
pub struct StatusUpdate {
    pub status: JobStatus,
}

pub fn configure_job_routes(cfg: &mut web::ServiceConfig) {
    cfg
        .route("", web::post().to(create_job))
        .route("", web::get().to(list_jobs))
        .route("/{job_id}", web::get().to(get_job))
        .route("/{job_id}", web::delete().to(delete_job))
        .route("/{job_id}/start", web::post().to(start_job))
        .route("/{job_id}/status", web::put().to(update_status))
        .route("/{job_id}/reports", web::get().to(list_reports));
}

/// 创建扫描任务
pub async fn create_job(
    state: web::Data<AppState>,
    spec: web::Json<JobSpec>,
) -> impl Responder {
    match state.engine.create_job(spec.into_inner()).await {
        Ok(id) => HttpResponse::Created().json(CreateJobResponse { id }),
        Err(e) => error_response(&e),
    }
}

/// 任务列表，支持搜索、过滤和排序；无排序参数时保持创建顺序
pub async fn list_jobs(
    state: web::Data<AppState>,
    query: web::Query<JobQuery>,
) -> impl Responder {
    let jobs = state.engine.query_jobs(&query).await;
    HttpResponse::Ok().json(jobs)
}

pub async fn get_job(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    match state.engine.get_job(&path).await {
        Ok(job) => HttpResponse::Ok().json(job),
        Err(e) => error_response(&e),
    }
}

pub async fn delete_job(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    match state.engine.delete_job(&path).await {
        Ok(()) => HttpResponse::NoContent().finish(),
        Err(e) => error_response(&e),
    }
}

/// 启动任务；扫描在后台执行，立即返回 202
pub async fn start_job(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    let job_id = path.into_inner();
    match state.engine.start_job(&job_id).await {
        Ok(outcome) => HttpResponse::Accepted().json(serde_json::json!({
            "job_id": job_id,
            "outcome": outcome,
        })),
        Err(e) => error_response(&e),
    }
}

pub async fn update_status(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<StatusUpdate>,
) -> impl Responder {
    match state.engine.update_status(&path, body.status).await {
        Ok(()) => HttpResponse::NoContent().finish(),
        Err(e) => error_response(&e),
    }
}

pub async fn list_reports(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    match state.engine.list_reports(&path).await {
        Ok(reports) => HttpResponse::Ok().json(reports),
        Err(e) => error_response(&e),
    }
}

#[cfg(test)]
mod tests {
    use actix_web::{http::StatusCode, test, web, App};
    use openscan_core::{EngineConfig, MissingJobPolicy, SimulatedExecutor};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;

    use crate::api::create_api_router;
    use crate::state::AppState;

    fn state_with(config: EngineConfig) -> AppState {
        let executor = SimulatedExecutor::with_builtin_catalog(Duration::ZERO);
        AppState::in_memory(Arc::new(executor), &config)
    }

    macro_rules! app {
        ($state:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new($state))
                    .service(create_api_router()),
            )
            .await
        };
    }

    macro_rules! create_job {
        ($app:expr, $body:expr) => {{
            let req = test::TestRequest::post().uri("/api/jobs").set_json($body).to_request();
            let resp = test::call_service(&$app, req).await;
            assert_eq!(resp.status(), StatusCode::CREATED);
            let body: Value = test::read_body_json(resp).await;
            body["id"].as_str().unwrap().to_string()
        }};
    }

    #[actix_web::test]
    async fn test_create_start_and_read_reports() {
        let app = app!(state_with(EngineConfig::default()));
        let id = create_job!(
            app,
            json!({
                "name": "Office LAN",
                "target": { "mode": "multiple", "hosts": "10.0.0.1,\n10.0.0.2" }
            })
        );

        let req = test::TestRequest::post()
            .uri(&format!("/api/jobs/{}/start", id))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["outcome"], "started");

        let mut job = Value::Null;
        for _ in 0..500 {
            let req = test::TestRequest::get().uri(&format!("/api/jobs/{}", id)).to_request();
            job = test::call_and_read_body_json(&app, req).await;
            if job["status"] == "Completed" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(job["status"], "Completed");
        assert_eq!(job["targets"], json!(["10.0.0.1", "10.0.0.2"]));

        let req = test::TestRequest::get()
            .uri(&format!("/api/jobs/{}/reports", id))
            .to_request();
        let reports: Value = test::call_and_read_body_json(&app, req).await;
        let reports = reports.as_array().unwrap();
        assert_eq!(reports.len(), 1);
        let findings = reports[0]["findings"].as_array().unwrap();
        assert!(findings.len() >= 15);
        for finding in findings {
            let host = finding["host"].as_str().unwrap();
            assert!(host == "10.0.0.1" || host == "10.0.0.2");
        }
    }

    #[actix_web::test]
    async fn test_invalid_spec_is_rejected() {
        let app = app!(state_with(EngineConfig::default()));
        for body in [
            json!({ "name": "bad qod", "min_qod": 150 }),
            json!({ "name": "no hosts", "target": { "mode": "multiple", "hosts": " , \n" } }),
            json!({ "name": "bad range", "target": { "mode": "network", "range": "10.0.0.0/99" } }),
        ] {
            let req = test::TestRequest::post().uri("/api/jobs").set_json(body).to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
            let body: Value = test::read_body_json(resp).await;
            assert!(body["error"].is_string());
        }

        let req = test::TestRequest::get().uri("/api/jobs").to_request();
        let jobs: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(jobs, json!([]));
    }

    #[actix_web::test]
    async fn test_unknown_job_reads_404_but_delete_is_idempotent() {
        let app = app!(state_with(EngineConfig::default()));

        let req = test::TestRequest::get().uri("/api/jobs/nope").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::get().uri("/api/jobs/nope/reports").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

        for _ in 0..2 {
            let req = test::TestRequest::delete().uri("/api/jobs/nope").to_request();
            assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NO_CONTENT);
        }

        let req = test::TestRequest::post().uri("/api/jobs/nope/start").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["outcome"], "ignored");
    }

    #[actix_web::test]
    async fn test_error_policy_surfaces_missing_jobs() {
        let config = EngineConfig {
            missing_job_policy: MissingJobPolicy::Error,
            ..EngineConfig::default()
        };
        let app = app!(state_with(config));

        let req = test::TestRequest::post().uri("/api/jobs/nope/start").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::put()
            .uri("/api/jobs/nope/status")
            .set_json(json!({ "status": "Stopped" }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_status_update_and_delete() {
        let app = app!(state_with(EngineConfig::default()));
        let id = create_job!(app, json!({ "name": "Edge" }));

        let req = test::TestRequest::put()
            .uri(&format!("/api/jobs/{}/status", id))
            .set_json(json!({ "status": "Stopped" }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NO_CONTENT);

        let req = test::TestRequest::get().uri(&format!("/api/jobs/{}", id)).to_request();
        let job: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(job["status"], "Stopped");
        assert!(job["last_run"].is_string());

        let req = test::TestRequest::put()
            .uri(&format!("/api/jobs/{}/status", id))
            .set_json(json!({ "status": "Paused" }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        // no run is in flight, so the job cannot be marked Running
        let req = test::TestRequest::put()
            .uri(&format!("/api/jobs/{}/status", id))
            .set_json(json!({ "status": "Running" }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
        let req = test::TestRequest::get().uri(&format!("/api/jobs/{}", id)).to_request();
        let job: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(job["status"], "Stopped");

        let req = test::TestRequest::delete().uri(&format!("/api/jobs/{}", id)).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NO_CONTENT);

        let req = test::TestRequest::get().uri(&format!("/api/jobs/{}", id)).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_list_keeps_creation_order_and_filters() {
        let app = app!(state_with(EngineConfig::default()));
        let names = ["Zulu", "alpha lab", "Mike"];
        for name in names {
            create_job!(app, json!({ "name": name }));
        }

        let req = test::TestRequest::get().uri("/api/jobs").to_request();
        let jobs: Value = test::call_and_read_body_json(&app, req).await;
        let listed: Vec<&str> = jobs
            .as_array()
            .unwrap()
            .iter()
            .map(|j| j["name"].as_str().unwrap())
            .collect();
        assert_eq!(listed, names);

        let req = test::TestRequest::get()
            .uri("/api/jobs?search=LAB&last_run=never")
            .to_request();
        let jobs: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(jobs.as_array().unwrap().len(), 1);
        assert_eq!(jobs[0]["name"], "alpha lab");

        let req = test::TestRequest::get()
            .uri("/api/jobs?sort=name&direction=desc")
            .to_request();
        let jobs: Value = test::call_and_read_body_json(&app, req).await;
        let sorted: Vec<&str> = jobs
            .as_array()
            .unwrap()
            .iter()
            .map(|j| j["name"].as_str().unwrap())
            .collect();
        assert_eq!(sorted, vec!["Zulu", "Mike", "alpha lab"]);
    }
}
