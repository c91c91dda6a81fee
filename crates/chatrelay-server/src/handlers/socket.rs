//! Duplex socket: one inbound text frame per user message, one outbound frame
//! per reply fragment, then the `[DONE]` sentinel.

use actix_web::{rt, web, HttpRequest, HttpResponse};
use actix_ws::{Message, MessageStream, Session};
use async_trait::async_trait;
use chatrelay_core::ChatError;
use chatrelay_loop::{FragmentSink, SinkClosed, TurnRequest};
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::handlers::user_id;
use crate::state::AppState;

pub const DONE_SENTINEL: &str = "[DONE]";
const FRAME_BUFFER: usize = 16;
const OUTBOUND_BUFFER: usize = 64;

struct SocketSink {
    frames: mpsc::Sender<String>,
}

#[async_trait]
impl FragmentSink for SocketSink {
    async fn send_fragment(&mut self, fragment: &str) -> Result<(), SinkClosed> {
        self.frames
            .send(fragment.to_string())
            .await
            .map_err(|_| SinkClosed)
    }
}

pub async fn handler(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Payload,
) -> actix_web::Result<HttpResponse> {
    let user_id = user_id(&req)?;
    let session_id = req.match_info().get("session_id").map(str::to_string);

    let (response, session, stream) = actix_ws::handle(&req, body)?;
    log::info!(
        "[{}] Socket connected (session: {})",
        user_id,
        session_id.as_deref().unwrap_or("new")
    );

    let (inbound_tx, inbound_rx) = mpsc::channel(FRAME_BUFFER);
    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);
    let cancel = CancellationToken::new();

    rt::spawn(write_frames(session.clone(), outbound_rx, cancel.clone()));
    rt::spawn(read_frames(
        session,
        stream,
        inbound_tx,
        cancel.clone(),
        user_id.clone(),
    ));
    rt::spawn(run_turns(
        state,
        inbound_rx,
        outbound_tx,
        cancel,
        user_id,
        session_id,
    ));

    Ok(response)
}

async fn write_frames(
    mut session: Session,
    mut frames: mpsc::Receiver<String>,
    cancel: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            frame = frames.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };
        if session.text(frame).await.is_err() {
            cancel.cancel();
            break;
        }
    }
}

async fn read_frames(
    mut session: Session,
    mut stream: MessageStream,
    frames: mpsc::Sender<String>,
    cancel: CancellationToken,
    user_id: String,
) {
    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => {
                if frames.send(text.to_string()).await.is_err() {
                    break;
                }
            }
            Ok(Message::Ping(bytes)) => {
                if session.pong(&bytes).await.is_err() {
                    break;
                }
            }
            Ok(Message::Close(reason)) => {
                log::debug!("[{}] Socket closed by client: {:?}", user_id, reason);
                let _ = session.close(reason).await;
                break;
            }
            Ok(_) => {}
            Err(error) => {
                log::warn!("[{}] Socket protocol error: {}", user_id, error);
                break;
            }
        }
    }

    cancel.cancel();
}

/// Run one turn per inbound message, strictly in arrival order.
///
/// The session id is fixed before the first turn runs, so a failed first turn
/// and its retry land in the same session.
async fn run_turns(
    state: web::Data<AppState>,
    mut inbound: mpsc::Receiver<String>,
    outbound: mpsc::Sender<String>,
    cancel: CancellationToken,
    user_id: String,
    mut session_id: Option<String>,
) {
    loop {
        let text = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            frame = inbound.recv() => match frame {
                Some(text) => text,
                None => break,
            },
        };

        let request = TurnRequest::new(user_id.clone(), session_id.clone(), text);
        let request = if request.message.trim().is_empty() {
            request
        } else {
            let request = request.with_resolved_session_id();
            session_id = request.session_id.clone();
            request
        };

        let sink = SocketSink {
            frames: outbound.clone(),
        };

        match state.runner.run(request, vec![Box::new(sink)], &cancel).await {
            Ok(outcome) => session_id = Some(outcome.session_id),
            Err(ChatError::Cancelled) => break,
            Err(error) => {
                let error = AppError::from(error);
                let payload = serde_json::json!({
                    "error": { "message": error.to_string(), "type": error.error_type() }
                });
                if outbound.send(payload.to_string()).await.is_err() {
                    break;
                }
            }
        }

        if outbound.send(DONE_SENTINEL.to_string()).await.is_err() {
            break;
        }
    }

    log::info!("[{}] Socket turn loop ended", user_id);
}
