use serde::{Deserialize, Serialize};

/// Who a message is attributed to on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderInfo {
    pub id: String,
    pub label: String,
}

impl SenderInfo {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

/// Payload of an inbound `project-message` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub message: String,
}

/// Payload of an outbound `project-message` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub message: String,
    pub sender: SenderInfo,
}

impl OutboundMessage {
    pub fn new(message: impl Into<String>, sender: SenderInfo) -> Self {
        Self {
            message: message.into(),
            sender,
        }
    }
}
