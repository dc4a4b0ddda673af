mod handler;
mod session;

use axum::{
    extract::{ws::WebSocketUpgrade, Query, State},
    http::{header, HeaderMap},
    response::IntoResponse,
    routing::get,
    Router,
};
use huddle_core::admission::Credentials;
use huddle_core::AppState;
use serde::Deserialize;

pub fn gateway_router() -> Router<AppState> {
    Router::new().route("/gateway", get(ws_upgrade))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HandshakeQuery {
    project_id: Option<String>,
    token: Option<String>,
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    Query(query): Query<HandshakeQuery>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let credentials = handshake_credentials(query, &headers);
    ws.on_upgrade(move |socket| handler::handle_connection(socket, state, credentials))
}

/// The token comes from the `token` query field when present, otherwise from
/// an `Authorization: Bearer` header.
fn handshake_credentials(query: HandshakeQuery, headers: &HeaderMap) -> Credentials {
    let token = query.token.filter(|t| !t.is_empty()).or_else(|| {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(|t| t.trim().to_string())
    });
    Credentials {
        token,
        project_id: query.project_id,
    }
}
