//! Per-connection WebSocket handler.
//!
//! Keeps framing and heartbeats at the edge while deferring protocol
//! behaviour to the injected [`CollabService`]. Each connection gets a fresh
//! participant identity and an unbounded outbound queue; room broadcasts are
//! forwarded from that queue onto the socket by the same select loop that
//! reads client frames. Whatever ends the loop, the participant is
//! disconnected from every room before the task finishes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use actix_ws::{CloseCode, CloseReason, Closed, Message, MessageStream, ProtocolError, Session};
use tokio::sync::mpsc;
use tokio::time;
use tracing::{debug, warn};

use crate::domain::ParticipantId;
use crate::domain::collab::{ClientEvent, CollabService, ConnectionHandle, ServerEvent};

/// Time between heartbeats to the client (5s in production, shorter in tests).
#[cfg(not(test))]
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
#[cfg(test)]
const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(50);

/// Max idle time before disconnecting the client (10s in production, shorter in tests).
#[cfg(not(test))]
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);
#[cfg(test)]
const CLIENT_TIMEOUT: Duration = Duration::from_millis(100);

pub(super) async fn handle_ws_session(
    service: Arc<CollabService>,
    session: Session,
    stream: MessageStream,
) {
    let (sender, outbound) = mpsc::unbounded_channel();
    let ws = WsSession {
        service,
        participant: ParticipantId::generate(),
        handle: ConnectionHandle::new(sender),
    };
    ws.run(session, stream, outbound).await;
}

enum SessionError {
    ClientClosed(Option<CloseReason>),
    StreamClosed,
    HeartbeatTimeout,
    Protocol(ProtocolError),
    Network(Closed),
}

enum CloseAction {
    None,
    Close(Option<CloseReason>),
}

struct WsSession {
    service: Arc<CollabService>,
    participant: ParticipantId,
    handle: ConnectionHandle,
}

impl WsSession {
    async fn run(
        &self,
        mut session: Session,
        mut stream: MessageStream,
        mut outbound: mpsc::UnboundedReceiver<ServerEvent>,
    ) {
        self.service.connect(&self.participant);

        let mut last_heartbeat = Instant::now();
        let mut heartbeat = time::interval(HEARTBEAT_INTERVAL);

        let error = loop {
            let result = tokio::select! {
                _ = heartbeat.tick() => {
                    self.handle_heartbeat_tick(&mut session, &last_heartbeat).await
                }
                message = stream.recv() => {
                    self.handle_stream_message(&mut session, &mut last_heartbeat, message)
                        .await
                }
                event = outbound.recv() => self.forward_event(&mut session, event).await,
            };

            if let Err(error) = result {
                break error;
            }
        };

        // The live set is authoritative for broadcasts; leave it before the
        // socket is torn down, whatever ended the loop.
        self.service.disconnect(&self.participant).await;

        self.log_shutdown_reason(&error);
        self.close_session_if_needed(session, self.close_action_for(&error))
            .await;
    }

    async fn handle_heartbeat_tick(
        &self,
        session: &mut Session,
        last_heartbeat: &Instant,
    ) -> Result<(), SessionError> {
        if Instant::now().duration_since(*last_heartbeat) > CLIENT_TIMEOUT {
            return Err(SessionError::HeartbeatTimeout);
        }

        session.ping(b"").await.map_err(SessionError::Network)
    }

    async fn handle_stream_message(
        &self,
        session: &mut Session,
        last_heartbeat: &mut Instant,
        message: Option<Result<Message, ProtocolError>>,
    ) -> Result<(), SessionError> {
        let Some(message) = message else {
            return Err(SessionError::StreamClosed);
        };

        match message {
            Ok(message) => self.handle_message(session, last_heartbeat, message).await,
            Err(error) => Err(SessionError::Protocol(error)),
        }
    }

    async fn handle_message(
        &self,
        session: &mut Session,
        last_heartbeat: &mut Instant,
        message: Message,
    ) -> Result<(), SessionError> {
        match message {
            Message::Ping(payload) => {
                *last_heartbeat = Instant::now();
                session
                    .pong(&payload)
                    .await
                    .map_err(SessionError::Network)?;
                Ok(())
            }
            Message::Text(text) => {
                *last_heartbeat = Instant::now();
                self.handle_text_message(text.as_ref()).await;
                Ok(())
            }
            Message::Pong(_) | Message::Binary(_) | Message::Continuation(_) | Message::Nop => {
                *last_heartbeat = Instant::now();
                Ok(())
            }
            Message::Close(reason) => Err(SessionError::ClientClosed(reason)),
        }
    }

    async fn handle_text_message(&self, text: &str) {
        // A malformed frame is dropped, not fatal: one confused client event
        // must not tear down an otherwise healthy drawing session.
        match serde_json::from_str::<ClientEvent>(text) {
            Ok(event) => {
                self.service
                    .handle_event(&self.participant, &self.handle, event)
                    .await;
            }
            Err(error) => {
                warn!(
                    participant = %self.participant,
                    error = %error,
                    "dropping malformed WebSocket payload"
                );
            }
        }
    }

    async fn forward_event(
        &self,
        session: &mut Session,
        event: Option<ServerEvent>,
    ) -> Result<(), SessionError> {
        let Some(event) = event else {
            return Err(SessionError::StreamClosed);
        };
        match serde_json::to_string(&event) {
            Ok(body) => session.text(body).await.map_err(SessionError::Network),
            Err(error) => {
                warn!(error = %error, "failed to serialize outbound event");
                Ok(())
            }
        }
    }

    fn log_shutdown_reason(&self, error: &SessionError) {
        match error {
            SessionError::HeartbeatTimeout => {
                warn!(participant = %self.participant, "WebSocket heartbeat timeout; closing connection");
            }
            SessionError::Protocol(error) => {
                warn!(participant = %self.participant, error = %error, "WebSocket protocol error");
            }
            SessionError::Network(error) => {
                debug!(participant = %self.participant, error = %error, "WebSocket send failed; closing connection");
            }
            SessionError::ClientClosed(_) | SessionError::StreamClosed => {}
        }
    }

    fn close_action_for(&self, error: &SessionError) -> CloseAction {
        match error {
            SessionError::HeartbeatTimeout => CloseAction::Close(Some(CloseReason {
                code: CloseCode::Normal,
                description: Some("heartbeat timeout".to_owned()),
            })),
            SessionError::Protocol(_) => CloseAction::Close(Some(CloseReason {
                code: CloseCode::Protocol,
                description: Some("protocol error".to_owned()),
            })),
            SessionError::ClientClosed(reason) => CloseAction::Close(reason.clone()),
            SessionError::StreamClosed | SessionError::Network(_) => CloseAction::None,
        }
    }

    async fn close_session_if_needed(&self, session: Session, close_action: CloseAction) {
        if let CloseAction::Close(reason) = close_action {
            if let Err(error) = session.close(reason).await {
                debug!(error = %error, "failed to close WebSocket session");
            }
        }
    }
}
