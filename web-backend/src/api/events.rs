use actix_web::http::header;
use actix_web::{web, HttpResponse, Responder};
use futures_util::stream;
use openscan_core::JobEvent;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::state::AppState;

pub fn configure_event_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("", web::get().to(stream_events));
}

/// 以 Server-Sent Events 推送任务变更
pub async fn stream_events(state: web::Data<AppState>) -> impl Responder {
    let events = event_stream(state.engine.subscribe());
    HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, "text/event-stream"))
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .streaming(events)
}

fn event_stream(
    rx: broadcast::Receiver<JobEvent>,
) -> impl futures_util::Stream<Item = Result<web::Bytes, actix_web::Error>> {
    stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let frame = match serde_json::to_string(&event) {
                        Ok(payload) => format!("data: {}\n\n", payload),
                        Err(e) => {
                            tracing::warn!(error = %e, "failed to encode job event");
                            continue;
                        }
                    };
                    return Some((Ok(web::Bytes::from(frame)), rx));
                }
                // 慢订阅者跳过丢失的事件，客户端应重新拉取列表
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
}
