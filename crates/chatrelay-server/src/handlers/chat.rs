use actix_web::{web, HttpRequest, HttpResponse};
use chatrelay_loop::TurnRequest;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::handlers::user_id;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub response: String,
    pub session_id: String,
}

/// Run one turn and return the full reply.
pub async fn handler(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<ChatRequest>,
) -> Result<HttpResponse> {
    let user_id = user_id(&req)?;
    let body = body.into_inner();

    let outcome = state
        .runner
        .run(
            TurnRequest::new(user_id, body.session_id, body.message),
            Vec::new(),
            &CancellationToken::new(),
        )
        .await?;

    Ok(HttpResponse::Ok().json(ChatResponse {
        response: outcome.response,
        session_id: outcome.session_id,
    }))
}
