use axum::{body::Bytes, extract::State};

use crate::gateway::GatewayOutcome;

use super::AppState;

pub async fn proxy(State(state): State<AppState>, body: Bytes) -> GatewayOutcome {
    state.gateway.forward(body).await
}
