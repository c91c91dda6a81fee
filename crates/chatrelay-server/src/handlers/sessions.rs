use actix_web::{web, HttpRequest, HttpResponse};
use chatrelay_core::SessionSummary;

use crate::error::{AppError, Result};
use crate::handlers::user_id;
use crate::state::AppState;

/// List the caller's sessions, most recently active first.
pub async fn list(state: web::Data<AppState>, req: HttpRequest) -> Result<HttpResponse> {
    let user_id = user_id(&req)?;

    let mut summaries: Vec<SessionSummary> = state
        .store
        .list_sessions(&user_id)
        .await?
        .iter()
        .map(|session| session.summary())
        .collect();
    summaries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    Ok(HttpResponse::Ok().json(summaries))
}

pub async fn delete(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let user_id = user_id(&req)?;
    let session_id = path.into_inner();

    let deleted = {
        let _guard = state.store.lock_user(&user_id).await;
        state.store.delete_session(&user_id, &session_id).await?
    };

    if !deleted {
        log::warn!("[{}] Delete requested for unknown session by {}", session_id, user_id);
        return Err(AppError::not_found(format!("session {}", session_id)));
    }

    log::info!("[{}] Session deleted by {}", session_id, user_id);
    Ok(HttpResponse::NoContent().finish())
}
