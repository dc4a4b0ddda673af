use serde::{Deserialize, Serialize};

use crate::message::{InboundMessage, OutboundMessage, SenderInfo};

// Event names
pub const EVENT_PROJECT_MESSAGE: &str = "project-message";
pub const EVENT_READY: &str = "ready";
pub const EVENT_RATE_LIMITED: &str = "rate-limited";

// Close codes
pub const CLOSE_AUTHENTICATION_FAILED: u16 = 4001;
pub const CLOSE_INVALID_PROJECT: u16 = 4004;
pub const CLOSE_INTERNAL_ERROR: u16 = 1011;
pub const CLOSE_TRY_AGAIN_LATER: u16 = 1013;

/// Events a client may send. Anything else fails to decode and is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "t", content = "d")]
pub enum ClientEvent {
    #[serde(rename = "project-message")]
    ProjectMessage(InboundMessage),
}

/// Events the gateway sends to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "t", content = "d")]
pub enum GatewayEvent {
    #[serde(rename = "ready")]
    Ready(ReadyPayload),
    #[serde(rename = "project-message")]
    ProjectMessage(OutboundMessage),
    #[serde(rename = "rate-limited")]
    RateLimited { retry_after_ms: u64 },
}

impl GatewayEvent {
    /// Wire name carried in the `t` field.
    pub fn name(&self) -> &'static str {
        match self {
            GatewayEvent::Ready(_) => EVENT_READY,
            GatewayEvent::ProjectMessage(_) => EVENT_PROJECT_MESSAGE,
            GatewayEvent::RateLimited { .. } => EVENT_RATE_LIMITED,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadyPayload {
    pub connection_id: String,
    pub project_id: String,
    pub user: SenderInfo,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn client_event_decodes_project_message() {
        let raw = json!({"t": "project-message", "d": {"message": "hello"}});
        let event: ClientEvent = serde_json::from_value(raw).unwrap();
        assert_eq!(
            event,
            ClientEvent::ProjectMessage(InboundMessage {
                message: "hello".into()
            })
        );
    }

    #[test]
    fn unknown_client_event_is_rejected() {
        let raw = json!({"t": "typing", "d": {}});
        assert!(serde_json::from_value::<ClientEvent>(raw).is_err());
    }

    #[test]
    fn outbound_message_wire_shape() {
        let event = GatewayEvent::ProjectMessage(OutboundMessage::new(
            "hi",
            SenderInfo::new("u1", "u1@example.com"),
        ));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({
                "t": EVENT_PROJECT_MESSAGE,
                "d": {"message": "hi", "sender": {"id": "u1", "label": "u1@example.com"}}
            })
        );
    }

    #[test]
    fn name_matches_serialized_tag() {
        let events = [
            GatewayEvent::Ready(ReadyPayload {
                connection_id: "c1".into(),
                project_id: "R1".into(),
                user: SenderInfo::new("u1", "u1"),
            }),
            GatewayEvent::ProjectMessage(OutboundMessage::new("hi", SenderInfo::new("ai", "AI"))),
            GatewayEvent::RateLimited { retry_after_ms: 10 },
        ];
        for event in events {
            let value = serde_json::to_value(&event).unwrap();
            assert_eq!(value["t"], event.name());
        }
    }

    #[test]
    fn rate_limited_wire_shape() {
        let value = serde_json::to_value(GatewayEvent::RateLimited { retry_after_ms: 250 }).unwrap();
        assert_eq!(value, json!({"t": EVENT_RATE_LIMITED, "d": {"retry_after_ms": 250}}));
    }
}
