//! Service API handlers.
//!
//! Called by marketplace backends (the AI jobs) and authenticated with a
//! signed body verified via the `Bazaar-Signature` header.
//!
//! # Endpoints
//!
//! - `POST /events` – queue a domain event for broadcast

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use bazaar_sdk::objects::{DomainEvent, ErrorBody, PublishReceipt};

use crate::api::extractors::SignedBody;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/events", post(publish_event))
}

/// `POST /events`: answers `202` once the event is queued, before delivery.
async fn publish_event(
    State(state): State<AppState>,
    SignedBody(event): SignedBody<DomainEvent>,
) -> Result<impl IntoResponse, ServiceApiError> {
    let route = state.config.broadcasting.read().await.recommendation_route;
    let queued = state
        .dispatcher
        .publish(event, route)
        .map_err(|_| ServiceApiError::Unavailable)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(PublishReceipt {
            event_id: queued.event_id,
            channels: queued.channels.iter().map(ToString::to_string).collect(),
        }),
    ))
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceApiError {
    #[error("broadcast queue unavailable")]
    Unavailable,
}

impl IntoResponse for ServiceApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ServiceApiError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        };
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
