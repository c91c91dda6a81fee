//! Multiplexed push hub over one socket.
//!
//! Invocations of a connection are handled one at a time, so the events of
//! two invocations never interleave. Server pushes such as `session-deleted`
//! share the same outbound queue.

use actix_web::{rt, web, HttpRequest, HttpResponse};
use actix_ws::{Message, MessageStream, Session};
use async_trait::async_trait;
use chatrelay_loop::{FragmentSink, SinkClosed, TurnRequest};
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::AppError;
use crate::handlers::user_id;
use crate::hub::{HubEvent, Invocation};
use crate::state::AppState;

const EVENT_BUFFER: usize = 64;
const INVOCATION_BUFFER: usize = 16;

struct HubSink {
    session_id: String,
    events: mpsc::Sender<HubEvent>,
}

#[async_trait]
impl FragmentSink for HubSink {
    async fn send_fragment(&mut self, fragment: &str) -> Result<(), SinkClosed> {
        self.events
            .send(HubEvent::Fragment {
                session_id: self.session_id.clone(),
                text: fragment.to_string(),
            })
            .await
            .map_err(|_| SinkClosed)
    }
}

fn error_event(error: AppError) -> HubEvent {
    HubEvent::Error {
        error_type: error.error_type().to_string(),
        message: error.to_string(),
    }
}

pub async fn handler(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Payload,
) -> actix_web::Result<HttpResponse> {
    let user_id = user_id(&req)?;
    let (response, session, stream) = actix_ws::handle(&req, body)?;

    let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
    let (invocation_tx, invocation_rx) = mpsc::channel(INVOCATION_BUFFER);
    let cancel = CancellationToken::new();
    let client_id = state.hub.register(&user_id, event_tx.clone()).await;
    log::info!("[{}] Hub client {} connected", user_id, client_id);

    rt::spawn(write_events(session.clone(), event_rx, cancel.clone()));
    rt::spawn(read_invocations(
        state.clone(),
        client_id,
        session,
        stream,
        invocation_tx,
        event_tx.clone(),
        cancel.clone(),
    ));
    rt::spawn(process_invocations(state, user_id, invocation_rx, event_tx, cancel));

    Ok(response)
}

async fn write_events(
    mut session: Session,
    mut events: mpsc::Receiver<HubEvent>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        let frame = match serde_json::to_string(&event) {
            Ok(frame) => frame,
            Err(error) => {
                log::error!("Failed to serialize {} event: {}", event.name(), error);
                continue;
            }
        };
        if session.text(frame).await.is_err() {
            cancel.cancel();
            break;
        }
    }
}

async fn read_invocations(
    state: web::Data<AppState>,
    client_id: Uuid,
    mut session: Session,
    mut stream: MessageStream,
    invocations: mpsc::Sender<Invocation>,
    events: mpsc::Sender<HubEvent>,
    cancel: CancellationToken,
) {
    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => match Invocation::parse(&text) {
                Ok(invocation) => {
                    if invocations.send(invocation).await.is_err() {
                        break;
                    }
                }
                Err(error) => {
                    let event = error_event(AppError::validation(format!(
                        "invalid invocation: {}",
                        error
                    )));
                    if events.send(event).await.is_err() {
                        break;
                    }
                }
            },
            Ok(Message::Ping(bytes)) => {
                if session.pong(&bytes).await.is_err() {
                    break;
                }
            }
            Ok(Message::Close(reason)) => {
                let _ = session.close(reason).await;
                break;
            }
            Ok(_) => {}
            Err(error) => {
                log::warn!("Hub client {} protocol error: {}", client_id, error);
                break;
            }
        }
    }

    cancel.cancel();
    state.hub.unregister(client_id).await;
    log::info!("Hub client {} disconnected", client_id);
}

async fn process_invocations(
    state: web::Data<AppState>,
    user_id: String,
    mut invocations: mpsc::Receiver<Invocation>,
    events: mpsc::Sender<HubEvent>,
    cancel: CancellationToken,
) {
    loop {
        let invocation = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            invocation = invocations.recv() => match invocation {
                Some(invocation) => invocation,
                None => break,
            },
        };

        let delivered = match invocation {
            Invocation::SendMessage {
                message,
                session_id,
            } => send_message(&state, &user_id, message, session_id, &events, &cancel).await,
            Invocation::GetHistory {
                session_id,
                offset,
                limit,
            } => get_history(&state, &user_id, session_id, offset, limit, &events).await,
        };

        if !delivered {
            break;
        }
    }
}

/// Returns false once the connection's event queue is gone.
async fn send_message(
    state: &AppState,
    user_id: &str,
    message: String,
    session_id: Option<String>,
    events: &mpsc::Sender<HubEvent>,
    cancel: &CancellationToken,
) -> bool {
    if message.trim().is_empty() {
        let event = error_event(AppError::validation("message must not be empty"));
        return events.send(event).await.is_ok();
    }

    let request = TurnRequest::new(user_id, session_id, message).with_resolved_session_id();
    let session_id = request.session_id.clone().unwrap_or_default();

    let start = HubEvent::TurnStart {
        session_id: session_id.clone(),
    };
    if events.send(start).await.is_err() {
        return false;
    }

    let sink = HubSink {
        session_id: session_id.clone(),
        events: events.clone(),
    };

    let follow_up = match state.runner.run(request, vec![Box::new(sink)], cancel).await {
        Ok(outcome) => vec![
            HubEvent::TurnEnd {
                session_id: outcome.session_id,
                response: outcome.response,
                rate_limited: outcome.rate_limited,
            },
            HubEvent::SessionUpdate(outcome.summary),
        ],
        Err(error) => {
            log::warn!("[{}] Hub turn failed: {}", session_id, error);
            vec![error_event(error.into())]
        }
    };

    for event in follow_up {
        if events.send(event).await.is_err() {
            return false;
        }
    }
    true
}

async fn get_history(
    state: &AppState,
    user_id: &str,
    session_id: String,
    offset: usize,
    limit: usize,
    events: &mpsc::Sender<HubEvent>,
) -> bool {
    let session = match state.store.get_session(user_id, &session_id).await {
        Ok(Some(session)) => session,
        Ok(None) => {
            let event = error_event(AppError::not_found(format!("session {}", session_id)));
            return events.send(event).await.is_ok();
        }
        Err(error) => return events.send(error_event(error.into())).await.is_ok(),
    };

    let page = session.history_page(offset, limit);
    let mut batch = Vec::with_capacity(page.len() + 2);
    batch.push(HubEvent::HistoryStart {
        session_id: session_id.clone(),
        offset,
        count: page.len(),
    });
    batch.extend(page.into_iter().map(|message| HubEvent::HistoryChunk {
        session_id: session_id.clone(),
        message: message.clone(),
    }));
    batch.push(HubEvent::HistoryEnd { session_id });

    for event in batch {
        if events.send(event).await.is_err() {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chatrelay_core::{HeuristicSummarizer, PlannerLimits};
    use chatrelay_llm::{ScriptedProvider, ScriptedReply};
    use chatrelay_loop::TurnConfig;
    use chatrelay_store::{MemoryDurableStore, MemorySessionCache, SessionStore};

    fn state(provider: ScriptedProvider) -> web::Data<AppState> {
        let store = Arc::new(SessionStore::new(
            Arc::new(MemorySessionCache::new(16)),
            Arc::new(MemoryDurableStore::new()),
        ));
        let turn_config = TurnConfig {
            backend_titles: false,
            ..TurnConfig::default()
        };
        web::Data::new(AppState::new(
            store,
            Arc::new(provider),
            Arc::new(HeuristicSummarizer::new()),
            PlannerLimits::default(),
            turn_config,
        ))
    }

    /// Run `invocations` through one connection's processor and collect its events.
    async fn invoke(state: web::Data<AppState>, invocations: Vec<Invocation>) -> Vec<HubEvent> {
        let (invocation_tx, invocation_rx) = mpsc::channel(INVOCATION_BUFFER);
        let (event_tx, mut event_rx) = mpsc::channel(EVENT_BUFFER);
        for invocation in invocations {
            invocation_tx.send(invocation).await.unwrap();
        }
        drop(invocation_tx);

        let collector = tokio::spawn(async move {
            let mut events = Vec::new();
            while let Some(event) = event_rx.recv().await {
                events.push(event);
            }
            events
        });

        process_invocations(
            state,
            "alice".to_string(),
            invocation_rx,
            event_tx,
            CancellationToken::new(),
        )
        .await;

        collector.await.unwrap()
    }

    fn send(message: &str, session_id: Option<&str>) -> Invocation {
        Invocation::SendMessage {
            message: message.to_string(),
            session_id: session_id.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn send_message_events_arrive_in_turn_order() {
        let provider = ScriptedProvider::with_replies([ScriptedReply::fragments(["Hel", "lo"])]);

        let events = invoke(state(provider), vec![send("hi", None)]).await;

        let names: Vec<&str> = events.iter().map(HubEvent::name).collect();
        assert_eq!(
            names,
            vec!["turn-start", "fragment", "fragment", "turn-end", "session-update"]
        );

        let HubEvent::TurnStart { session_id } = &events[0] else {
            panic!("expected turn-start, got {:?}", events[0]);
        };
        let texts: Vec<&str> = events
            .iter()
            .filter_map(|event| match event {
                HubEvent::Fragment { session_id: id, text } => {
                    assert_eq!(id, session_id);
                    Some(text.as_str())
                }
                _ => None,
            })
            .collect();
        assert_eq!(texts, vec!["Hel", "lo"]);

        match &events[3] {
            HubEvent::TurnEnd {
                session_id: id,
                response,
                rate_limited,
            } => {
                assert_eq!(id, session_id);
                assert_eq!(response, "Hello");
                assert!(!rate_limited);
            }
            other => panic!("expected turn-end, got {:?}", other),
        }
        match &events[4] {
            HubEvent::SessionUpdate(summary) => assert_eq!(&summary.id, session_id),
            other => panic!("expected session-update, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn get_history_pages_newest_first_without_system_messages() {
        let events = invoke(
            state(ScriptedProvider::new()),
            vec![
                send("first", Some("s1")),
                send("second", Some("s1")),
                Invocation::GetHistory {
                    session_id: "s1".to_string(),
                    offset: 0,
                    limit: 3,
                },
            ],
        )
        .await;

        let history: Vec<&HubEvent> = events
            .iter()
            .skip_while(|event| !matches!(event, HubEvent::HistoryStart { .. }))
            .collect();
        assert_eq!(history.len(), 5);
        assert!(matches!(
            history[0],
            HubEvent::HistoryStart { offset: 0, count: 3, .. }
        ));
        let contents: Vec<&str> = history[1..4]
            .iter()
            .map(|event| match event {
                HubEvent::HistoryChunk { message, .. } => message.content.as_str(),
                other => panic!("expected history-chunk, got {:?}", other),
            })
            .collect();
        assert_eq!(contents, vec!["You said: second", "second", "You said: first"]);
        assert!(matches!(history[4], HubEvent::HistoryEnd { session_id } if session_id == "s1"));
    }

    #[tokio::test]
    async fn history_of_unknown_session_is_an_error_event() {
        let events = invoke(
            state(ScriptedProvider::new()),
            vec![Invocation::GetHistory {
                session_id: "missing".to_string(),
                offset: 0,
                limit: 10,
            }],
        )
        .await;

        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            HubEvent::Error { error_type, .. } if error_type == "not_found"
        ));
    }

    #[tokio::test]
    async fn empty_message_is_rejected_without_turn_start() {
        let events = invoke(state(ScriptedProvider::new()), vec![send("   ", None)]).await;

        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            HubEvent::Error { error_type, .. } if error_type == "validation_error"
        ));
    }
}
