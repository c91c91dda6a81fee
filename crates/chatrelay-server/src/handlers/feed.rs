use std::time::Duration;

use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse};
use tokio::time::MissedTickBehavior;

use crate::error::Result;
use crate::feed::{sse_record, MessageFeed, SessionFeed};
use crate::handlers::user_id;
use crate::state::AppState;

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

fn ticker(period: Duration) -> tokio::time::Interval {
    let mut ticker = tokio::time::interval(period.max(MIN_POLL_INTERVAL));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

fn event_stream_response() -> actix_web::HttpResponseBuilder {
    let mut builder = HttpResponse::Ok();
    builder
        .append_header((header::CONTENT_TYPE, "text/event-stream"))
        .append_header((header::CACHE_CONTROL, "no-cache"))
        .append_header((header::CONNECTION, "keep-alive"));
    builder
}

/// Poll the caller's session list and push summaries not yet seen.
pub async fn sessions(state: web::Data<AppState>, req: HttpRequest) -> Result<HttpResponse> {
    let user_id = user_id(&req)?;
    let store = state.store.clone();
    let mut ticker = ticker(state.feed_poll_interval);
    log::info!("[{}] Session feed opened", user_id);

    let stream = async_stream::stream! {
        let mut feed = SessionFeed::new();
        loop {
            ticker.tick().await;
            let sessions = match store.list_sessions(&user_id).await {
                Ok(sessions) => sessions,
                Err(error) => {
                    log::warn!("[{}] Session feed poll failed: {}", user_id, error);
                    continue;
                }
            };
            for summary in feed.diff(&sessions) {
                match sse_record(&summary) {
                    Ok(record) => yield Ok::<_, actix_web::Error>(record),
                    Err(error) => log::error!("[{}] Failed to encode session summary: {}", user_id, error),
                }
            }
        }
    };

    Ok(event_stream_response().streaming(stream))
}

/// Poll one session and push its messages not yet seen.
pub async fn messages(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let user_id = user_id(&req)?;
    let session_id = path.into_inner();
    let store = state.store.clone();
    let mut ticker = ticker(state.feed_poll_interval);
    log::info!("[{}] Message feed opened by {}", session_id, user_id);

    let stream = async_stream::stream! {
        let mut feed = MessageFeed::new();
        loop {
            ticker.tick().await;
            let session = match store.get_session(&user_id, &session_id).await {
                Ok(Some(session)) => session,
                Ok(None) => continue,
                Err(error) => {
                    log::warn!("[{}] Message feed poll failed: {}", session_id, error);
                    continue;
                }
            };
            for message in feed.diff(&session.messages) {
                match sse_record(&message) {
                    Ok(record) => yield Ok::<_, actix_web::Error>(record),
                    Err(error) => log::error!("[{}] Failed to encode message: {}", session_id, error),
                }
            }
        }
    };

    Ok(event_stream_response().streaming(stream))
}
