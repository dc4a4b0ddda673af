use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use huddle_core::admission::Credentials;
use huddle_core::error::AdmissionError;
use huddle_core::rooms::Frame;
use huddle_core::AppState;
use huddle_models::gateway::{
    ClientEvent, GatewayEvent, CLOSE_AUTHENTICATION_FAILED, CLOSE_INTERNAL_ERROR,
    CLOSE_INVALID_PROJECT, CLOSE_TRY_AGAIN_LATER,
};
use huddle_util::validation::validate_message_body;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};

use crate::session::Session;

pub async fn handle_connection(socket: WebSocket, state: AppState, credentials: Credentials) {
    let (mut sender, receiver) = socket.split();

    let Some(_slot) = state.limits.try_acquire_connection() else {
        tracing::warn!(
            active = state.limits.active_connections(),
            "connection rejected: gateway at capacity"
        );
        let _ = send_close(&mut sender, CLOSE_TRY_AGAIN_LATER, "server busy").await;
        return;
    };

    let admitted = match state.admission.admit(&credentials).await {
        Ok(admitted) => admitted,
        Err(err) => {
            match &err {
                AdmissionError::ProjectLookup(_) | AdmissionError::StoreUnavailable(_) => {
                    tracing::error!(kind = err.kind(), error = %err, "connection rejected");
                }
                _ => {
                    tracing::info!(
                        kind = err.kind(),
                        reason = %err,
                        project_id = credentials.project_id.as_deref().unwrap_or(""),
                        "connection rejected"
                    );
                }
            }
            let (code, reason) = close_for(&err);
            let _ = send_close(&mut sender, code, reason).await;
            return;
        }
    };

    let (session, outbound) = match Session::open(&state, admitted) {
        Ok(opened) => opened,
        Err(err) => {
            tracing::error!("failed to join room: {err}");
            let _ = send_close(&mut sender, CLOSE_INTERNAL_ERROR, "internal error").await;
            return;
        }
    };

    tracing::info!(
        connection_id = %session.connection.id,
        user_id = %session.connection.identity.id,
        project_id = %session.connection.room,
        "connection admitted"
    );

    if send_event(&mut sender, &session.ready_event()).await.is_err() {
        return;
    }

    let reason = run_session(&mut sender, receiver, outbound, &session, &state).await;
    tracing::info!(
        connection_id = %session.connection.id,
        project_id = %session.connection.room,
        %reason,
        "connection closed"
    );
    // Dropping `session` leaves the room.
}

/// Close code and client-facing reason for a refused handshake. The reason
/// never says why a token was refused.
pub(crate) fn close_for(err: &AdmissionError) -> (u16, &'static str) {
    match err {
        AdmissionError::InvalidRoom => (CLOSE_INVALID_PROJECT, "invalid project"),
        AdmissionError::Unauthenticated(_) | AdmissionError::StoreUnavailable(_) => {
            (CLOSE_AUTHENTICATION_FAILED, "authentication error")
        }
        AdmissionError::ProjectLookup(_) => (CLOSE_INTERNAL_ERROR, "project lookup unavailable"),
    }
}

async fn run_session(
    sender: &mut (impl SinkExt<Message> + Unpin),
    mut receiver: impl StreamExt<Item = Result<Message, axum::Error>> + Unpin,
    mut outbound: mpsc::Receiver<Frame>,
    session: &Session,
    state: &AppState,
) -> String {
    let idle_timeout = state.config.gateway.idle_timeout;
    let ping_every = state.config.gateway.ping_interval;
    let mut ping = tokio::time::interval_at(Instant::now() + ping_every, ping_every);
    ping.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let idle = tokio::time::sleep(idle_timeout);
    tokio::pin!(idle);

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        idle.as_mut().reset(Instant::now() + idle_timeout);
                        handle_text(text.as_str(), &mut *sender, session, state).await;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break match frame {
                            Some(frame) => format!("client close frame (code={})", frame.code),
                            None => "client close frame".to_string(),
                        };
                    }
                    Some(Ok(_)) => {
                        idle.as_mut().reset(Instant::now() + idle_timeout);
                    }
                    Some(Err(err)) => break format!("websocket receive error: {err}"),
                    None => break "websocket stream ended".to_string(),
                }
            }
            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    break "outbound queue closed".to_string();
                };
                if sender.send(Message::Text(frame.to_string().into())).await.is_err() {
                    break "websocket send failed".to_string();
                }
            }
            _ = ping.tick() => {
                if sender.send(Message::Ping(Default::default())).await.is_err() {
                    break "websocket ping failed".to_string();
                }
            }
            () = &mut idle => {
                break "idle timeout".to_string();
            }
        }
    }
}

async fn handle_text(
    text: &str,
    sender: &mut (impl SinkExt<Message> + Unpin),
    session: &Session,
    state: &AppState,
) {
    let event = match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => event,
        Err(err) => {
            tracing::debug!(
                connection_id = %session.connection.id,
                "ignoring unrecognised client frame: {err}"
            );
            return;
        }
    };

    match event {
        ClientEvent::ProjectMessage(inbound) => {
            let user_id = &session.connection.identity.id;
            if let Err(retry_after_ms) = state.limits.check_message(user_id) {
                tracing::debug!(%user_id, retry_after_ms, "rate limited");
                let _ = send_event(sender, &GatewayEvent::RateLimited { retry_after_ms }).await;
                return;
            }
            if let Err(err) =
                validate_message_body(&inbound.message, state.config.gateway.max_message_length)
            {
                tracing::debug!(%user_id, "dropping message: {err}");
                return;
            }
            let outcome = state.router.route(&session.connection, inbound);
            tracing::debug!(
                connection_id = %session.connection.id,
                relayed_to = outcome.relayed_to,
                assistant = outcome.generation.is_some(),
                "message routed"
            );
        }
    }
}

async fn send_event(
    sender: &mut (impl SinkExt<Message> + Unpin),
    event: &GatewayEvent,
) -> Result<(), ()> {
    let payload = serde_json::to_string(event).map_err(|err| {
        tracing::error!(event = event.name(), "failed to serialize gateway event: {err}");
    })?;
    tracing::trace!(event = event.name(), "sending gateway event");
    sender
        .send(Message::Text(payload.into()))
        .await
        .map_err(|_| ())
}

async fn send_close(
    sender: &mut (impl SinkExt<Message> + Unpin),
    code: u16,
    reason: &str,
) -> Result<(), ()> {
    sender
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.to_string().into(),
        })))
        .await
        .map_err(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use huddle_core::error::AuthFailure;

    #[test]
    fn refusals_map_to_close_codes() {
        assert_eq!(close_for(&AdmissionError::InvalidRoom), (4004, "invalid project"));
        for failure in [
            AuthFailure::MissingToken,
            AuthFailure::Expired,
            AuthFailure::Revoked,
            AuthFailure::BadSignature,
        ] {
            assert_eq!(
                close_for(&AdmissionError::Unauthenticated(failure)),
                (4001, "authentication error")
            );
        }
        assert_eq!(
            close_for(&AdmissionError::StoreUnavailable("down".into())).0,
            4001
        );
        assert_eq!(close_for(&AdmissionError::ProjectLookup("db".into())).0, 1011);
    }
}
