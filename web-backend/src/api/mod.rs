use actix_web::{web, HttpResponse, Scope};
use openscan_core::error::CoreError;

pub mod events;
pub mod jobs;
pub mod reports;

pub fn create_api_router() -> Scope {
    web::scope("/api")
        .service(job_routes())
        .service(report_routes())
        .service(events_routes())
        .route("/summary", web::get().to(reports::get_summary))
}

fn job_routes() -> Scope {
    web::scope("/jobs")
        .configure(jobs::configure_job_routes)
}

fn report_routes() -> Scope {
    web::scope("/reports")
        .configure(reports::configure_report_routes)
}

fn events_routes() -> Scope {
    web::scope("/events")
        .configure(events::configure_event_routes)
}

/// 将核心错误映射为 JSON 错误响应
pub fn error_response(err: &CoreError) -> HttpResponse {
    let body = serde_json::json!({ "error": err.to_string() });
    match err {
        CoreError::Validation(_) => HttpResponse::BadRequest().json(body),
        CoreError::NotFound(_) => HttpResponse::NotFound().json(body),
        _ => {
            tracing::error!(error = %err, "request failed");
            HttpResponse::InternalServerError().json(body)
        }
    }
}
