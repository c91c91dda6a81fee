use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::hub::HubEvent;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminSessionView {
    pub id: String,
    pub owner_user_id: String,
    pub title: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub message_count: usize,
}

/// Every session across all users.
pub async fn list_all(state: web::Data<AppState>) -> Result<HttpResponse> {
    let mut sessions: Vec<AdminSessionView> = state
        .store
        .list_all_sessions()
        .await?
        .into_iter()
        .map(|session| AdminSessionView {
            message_count: session.messages.len(),
            id: session.id,
            owner_user_id: session.owner_user_id,
            title: session.title,
            timestamp: session.last_activity,
        })
        .collect();
    sessions.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    Ok(HttpResponse::Ok().json(sessions))
}

/// Delete a user's session and tell every hub client about it.
pub async fn delete(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse> {
    let (user_id, session_id) = path.into_inner();

    let deleted = {
        let _guard = state.store.lock_user(&user_id).await;
        state.store.delete_session(&user_id, &session_id).await?
    };

    if !deleted {
        return Err(AppError::not_found(format!("session {}", session_id)));
    }

    let notified = state
        .hub
        .broadcast(HubEvent::SessionDeleted {
            user_id: user_id.clone(),
            session_id: session_id.clone(),
        })
        .await;
    log::info!(
        "[{}] Admin deleted session of {}, notified {} hub clients",
        session_id,
        user_id,
        notified
    );

    Ok(HttpResponse::NoContent().finish())
}
