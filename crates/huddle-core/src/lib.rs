pub mod admission;
pub mod auth;
pub mod error;
pub mod generation;
pub mod limits;
pub mod projects;
pub mod revocation;
pub mod rooms;
pub mod router;

use std::sync::Arc;
use std::time::Duration;

use admission::Admission;
use generation::TextGenerator;
use limits::GatewayLimits;
use projects::ProjectDirectory;
use revocation::{RevocationStore, Revocations};
use rooms::RoomRegistry;
use router::{AssistantConfig, MessageRouter};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub jwt_secret: String,
    pub gateway: GatewayConfig,
    pub assistant: AssistantConfig,
}

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    /// Simultaneous WebSocket connections across all users.
    pub max_connections: usize,
    pub max_messages_per_minute: u32,
    pub max_message_length: usize,
    /// Frames buffered per member before broadcasts to it start dropping.
    pub outbound_queue_capacity: usize,
    pub idle_timeout: Duration,
    pub ping_interval: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_connections: 2_000,
            max_messages_per_minute: 240,
            max_message_length: 4_000,
            outbound_queue_capacity: 256,
            idle_timeout: Duration::from_secs(120),
            ping_interval: Duration::from_secs(20),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub admission: Arc<Admission>,
    pub revocations: Revocations,
    pub rooms: Arc<RoomRegistry>,
    pub router: Arc<MessageRouter>,
    pub limits: Arc<GatewayLimits>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        projects: Arc<dyn ProjectDirectory>,
        revocation_store: Arc<dyn RevocationStore>,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        let revocations = Revocations::new(revocation_store);
        let admission = Arc::new(Admission::new(
            projects,
            revocations.clone(),
            config.jwt_secret.clone(),
        ));
        let rooms = Arc::new(RoomRegistry::new());
        let router = Arc::new(MessageRouter::new(
            rooms.clone(),
            generator,
            config.assistant.clone(),
        ));
        let limits = Arc::new(GatewayLimits::new(
            config.gateway.max_connections,
            config.gateway.max_messages_per_minute,
        ));
        Self {
            config,
            admission,
            revocations,
            rooms,
            router,
            limits,
        }
    }
}
