//! Per-message routing: relay to the room, and for assistant invocations run
//! the generator off the connection's critical path.

use std::sync::Arc;
use std::time::Duration;

use huddle_models::gateway::GatewayEvent;
use huddle_models::message::{InboundMessage, OutboundMessage, SenderInfo};
use tokio::task::JoinHandle;

use crate::generation::{GenerationError, TextGenerator};
use crate::rooms::{Connection, RoomId, RoomRegistry};

pub const DEFAULT_MARKER: &str = "@ai";
pub const DEFAULT_FALLBACK_TEXT: &str = "AI service failed, please try again.";

#[derive(Debug, Clone)]
pub struct AssistantConfig {
    /// Substring that turns a chat message into an assistant invocation.
    pub marker: String,
    pub identity: SenderInfo,
    pub fallback_text: String,
    pub timeout: Duration,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            marker: DEFAULT_MARKER.to_string(),
            identity: SenderInfo::new("ai", "AI"),
            fallback_text: DEFAULT_FALLBACK_TEXT.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Chat,
    Invocation { prompt: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationOutcome {
    Replied,
    Fallback,
}

#[derive(Debug)]
pub struct RouteOutcome {
    pub relayed_to: usize,
    /// Present when the message invoked the assistant.
    pub generation: Option<JoinHandle<GenerationOutcome>>,
}

pub struct MessageRouter {
    rooms: Arc<RoomRegistry>,
    generator: Arc<dyn TextGenerator>,
    assistant: AssistantConfig,
}

impl MessageRouter {
    pub fn new(
        rooms: Arc<RoomRegistry>,
        generator: Arc<dyn TextGenerator>,
        assistant: AssistantConfig,
    ) -> Self {
        Self {
            rooms,
            generator,
            assistant,
        }
    }

    pub fn classify(&self, body: &str) -> Classification {
        if self.assistant.marker.is_empty() || !body.contains(&self.assistant.marker) {
            return Classification::Chat;
        }
        let prompt = body.replacen(&self.assistant.marker, "", 1).trim().to_string();
        Classification::Invocation { prompt }
    }

    /// Relays `inbound` to the rest of the origin's room, then, if it invokes
    /// the assistant, spawns the generation. Must be called inside a tokio runtime.
    pub fn route(&self, origin: &Connection, inbound: InboundMessage) -> RouteOutcome {
        let classification = self.classify(&inbound.message);

        let relay = GatewayEvent::ProjectMessage(OutboundMessage::new(
            inbound.message,
            origin.identity.clone(),
        ));
        let relayed_to = self.rooms.broadcast_except(&origin.room, origin.id, &relay);

        let generation = match classification {
            Classification::Chat => None,
            Classification::Invocation { prompt } => {
                tracing::debug!(
                    user_id = %origin.identity.id,
                    project_id = %origin.room,
                    "assistant invoked"
                );
                Some(self.spawn_generation(origin.room.clone(), prompt))
            }
        };

        RouteOutcome {
            relayed_to,
            generation,
        }
    }

    // The task owns the room id rather than the connection, so the reply still
    // lands if the requester disconnects first.
    fn spawn_generation(&self, room: RoomId, prompt: String) -> JoinHandle<GenerationOutcome> {
        let rooms = self.rooms.clone();
        let generator = self.generator.clone();
        let assistant = self.assistant.clone();

        tokio::spawn(async move {
            let result = if prompt.is_empty() {
                Err(GenerationError::EmptyPrompt)
            } else {
                match tokio::time::timeout(assistant.timeout, generator.generate(&prompt)).await {
                    Ok(result) => result,
                    Err(_) => Err(GenerationError::Timeout),
                }
            };

            let (text, outcome) = match result {
                Ok(reply) => (reply, GenerationOutcome::Replied),
                Err(e) => {
                    tracing::warn!(project_id = %room, "generation failed: {e}");
                    (assistant.fallback_text.clone(), GenerationOutcome::Fallback)
                }
            };

            let event =
                GatewayEvent::ProjectMessage(OutboundMessage::new(text, assistant.identity.clone()));
            let delivered = rooms.broadcast_all(&room, &event);
            tracing::debug!(project_id = %room, delivered, ?outcome, "assistant reply broadcast");
            outcome
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rooms::Frame;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    struct Scripted {
        reply: Result<&'static str, ()>,
        prompts: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn ok(reply: &'static str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply),
                prompts: Mutex::default(),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: Err(()),
                prompts: Mutex::default(),
            })
        }
    }

    #[async_trait]
    impl TextGenerator for Scripted {
        async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.reply
                .map(str::to_string)
                .map_err(|_| GenerationError::Remote("boom".into()))
        }
    }

    struct Hanging {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TextGenerator for Hanging {
        async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::future::pending::<Result<String, GenerationError>>().await
        }
    }

    fn join(rooms: &RoomRegistry, user: &str) -> (Connection, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(16);
        let conn = Connection::new(SenderInfo::new(user, format!("{user}@example.com")), "R1".into());
        rooms.join(conn.clone(), tx).unwrap();
        (conn, rx)
    }

    fn recv(rx: &mut mpsc::Receiver<Frame>) -> OutboundMessage {
        match serde_json::from_str::<GatewayEvent>(&rx.try_recv().expect("frame")).unwrap() {
            GatewayEvent::ProjectMessage(msg) => msg,
            other => panic!("unexpected event {other:?}"),
        }
    }

    fn router(generator: Arc<dyn TextGenerator>, rooms: Arc<RoomRegistry>) -> MessageRouter {
        MessageRouter::new(rooms, generator, AssistantConfig::default())
    }

    #[test]
    fn classify_finds_marker_anywhere() {
        let router = router(Scripted::ok("x"), Arc::new(RoomRegistry::new()));
        assert_eq!(router.classify("hello"), Classification::Chat);
        assert_eq!(
            router.classify("@ai summarize this"),
            Classification::Invocation {
                prompt: "summarize this".into()
            }
        );
        assert_eq!(
            router.classify("please @ai explain"),
            Classification::Invocation {
                prompt: "please  explain".into()
            }
        );
    }

    #[test]
    fn classify_strips_only_first_marker() {
        let router = router(Scripted::ok("x"), Arc::new(RoomRegistry::new()));
        assert_eq!(
            router.classify("@ai what does @ai mean"),
            Classification::Invocation {
                prompt: "what does @ai mean".into()
            }
        );
    }

    #[tokio::test]
    async fn plain_chat_is_relayed_without_generation() {
        let rooms = Arc::new(RoomRegistry::new());
        let generator = Scripted::ok("never");
        let router = router(generator.clone(), rooms.clone());
        let (a, mut rx_a) = join(&rooms, "u1");
        let (_b, mut rx_b) = join(&rooms, "u2");

        let outcome = router.route(&a, InboundMessage { message: "hello".into() });
        assert_eq!(outcome.relayed_to, 1);
        assert!(outcome.generation.is_none());

        let got = recv(&mut rx_b);
        assert_eq!(got.message, "hello");
        assert_eq!(got.sender, SenderInfo::new("u1", "u1@example.com"));
        assert!(rx_a.try_recv().is_err());
        assert!(generator.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn successful_generation_reaches_everyone() {
        let rooms = Arc::new(RoomRegistry::new());
        let generator = Scripted::ok("Here you go");
        let router = router(generator.clone(), rooms.clone());
        let (a, mut rx_a) = join(&rooms, "u1");
        let (_b, mut rx_b) = join(&rooms, "u2");

        let outcome = router.route(&a, InboundMessage { message: "@ai summarize this".into() });
        let result = outcome.generation.unwrap().await.unwrap();
        assert_eq!(result, GenerationOutcome::Replied);

        assert_eq!(recv(&mut rx_b).message, "@ai summarize this");
        let reply_b = recv(&mut rx_b);
        assert_eq!(reply_b.message, "Here you go");
        assert_eq!(reply_b.sender, SenderInfo::new("ai", "AI"));
        let reply_a = recv(&mut rx_a);
        assert_eq!(reply_a.message, "Here you go");
        assert!(rx_a.try_recv().is_err());
        assert_eq!(*generator.prompts.lock().unwrap(), vec!["summarize this".to_string()]);
    }

    #[tokio::test]
    async fn failed_generation_sends_exactly_one_fallback() {
        let rooms = Arc::new(RoomRegistry::new());
        let router = router(Scripted::failing(), rooms.clone());
        let (a, mut rx_a) = join(&rooms, "u1");
        let (_b, mut rx_b) = join(&rooms, "u2");

        let outcome = router.route(&a, InboundMessage { message: "@ai summarize this".into() });
        assert_eq!(outcome.relayed_to, 1);
        assert_eq!(outcome.generation.unwrap().await.unwrap(), GenerationOutcome::Fallback);

        assert_eq!(recv(&mut rx_b).message, "@ai summarize this");
        for rx in [&mut rx_a, &mut rx_b] {
            let fallback = recv(rx);
            assert_eq!(fallback.message, DEFAULT_FALLBACK_TEXT);
            assert_eq!(fallback.sender.id, "ai");
            assert!(rx.try_recv().is_err());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_treated_as_failure() {
        let rooms = Arc::new(RoomRegistry::new());
        let generator = Arc::new(Hanging {
            calls: AtomicUsize::new(0),
        });
        let router = MessageRouter::new(
            rooms.clone(),
            generator.clone(),
            AssistantConfig {
                timeout: Duration::from_secs(5),
                ..AssistantConfig::default()
            },
        );
        let (a, mut rx_a) = join(&rooms, "u1");

        let outcome = router.route(&a, InboundMessage { message: "@ai hi".into() });
        assert_eq!(outcome.generation.unwrap().await.unwrap(), GenerationOutcome::Fallback);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
        assert_eq!(recv(&mut rx_a).message, DEFAULT_FALLBACK_TEXT);
    }

    #[tokio::test]
    async fn marker_only_message_falls_back_without_calling_generator() {
        let rooms = Arc::new(RoomRegistry::new());
        let generator = Scripted::ok("unused");
        let router = router(generator.clone(), rooms.clone());
        let (a, mut rx_a) = join(&rooms, "u1");

        let outcome = router.route(&a, InboundMessage { message: "@ai".into() });
        assert_eq!(outcome.generation.unwrap().await.unwrap(), GenerationOutcome::Fallback);
        assert_eq!(recv(&mut rx_a).message, DEFAULT_FALLBACK_TEXT);
        assert!(generator.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn reply_survives_requester_leaving() {
        let rooms = Arc::new(RoomRegistry::new());
        let router = router(Scripted::ok("still here"), rooms.clone());
        let (a, _rx_a) = join(&rooms, "u1");
        let (_b, mut rx_b) = join(&rooms, "u2");

        let outcome = router.route(&a, InboundMessage { message: "@ai ping".into() });
        rooms.leave(a.id);
        outcome.generation.unwrap().await.unwrap();

        assert_eq!(recv(&mut rx_b).message, "@ai ping");
        assert_eq!(recv(&mut rx_b).message, "still here");
    }
}
