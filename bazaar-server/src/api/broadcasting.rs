//! Channel authorization endpoint.
//!
//! # Endpoints
//!
//! - `POST /broadcasting/auth` – grant a connected socket access to a channel

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use bazaar_sdk::objects::{BroadcastAuthResponse, ChannelName, ErrorBody, PresenceMember};
use bazaar_sdk::signature::sign_channel_grant;

use super::extractors::{AuthPayload, BearerPrincipal};
use super::ws::is_socket_id;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/broadcasting/auth", post(authorize_channel))
}

/// `POST /broadcasting/auth`
///
/// Evaluates the gate for the bearer's principal and, when allowed, signs a
/// grant bound to `socket_id` so it cannot be replayed on another
/// connection. Names that do not parse are refused like any other denial.
async fn authorize_channel(
    State(state): State<AppState>,
    BearerPrincipal(principal): BearerPrincipal,
    AuthPayload(request): AuthPayload,
) -> Result<Json<BroadcastAuthResponse>, AuthApiError> {
    if !is_socket_id(&request.socket_id) {
        return Err(AuthApiError::InvalidSocketId);
    }

    let name: ChannelName = match request.channel_name.parse() {
        Ok(name) => name,
        Err(e) => {
            tracing::debug!(channel = %request.channel_name, error = %e, "Refusing unknown channel");
            return Err(AuthApiError::Forbidden);
        }
    };

    let allowed = state
        .gate
        .authorize(&principal, &name.channel)
        .await
        .map_err(|e| {
            tracing::error!(channel = %name, user_id = principal.id, error = %e, "Channel authorization failed");
            AuthApiError::Internal
        })?;
    if !allowed {
        tracing::info!(channel = %name, user_id = principal.id, "Channel authorization refused");
        return Err(AuthApiError::Forbidden);
    }

    let channel_data = if name.is_presence() {
        let member = PresenceMember {
            user_id: principal.id,
        };
        Some(serde_json::to_string(&member).map_err(|_| AuthApiError::Internal)?)
    } else {
        None
    };

    let broadcasting = state.config.broadcasting.read().await;
    let auth = sign_channel_grant(
        &broadcasting.app_key,
        broadcasting.app_secret.as_bytes(),
        &request.socket_id,
        &request.channel_name,
        channel_data.as_deref(),
    );
    drop(broadcasting);

    tracing::debug!(channel = %name, user_id = principal.id, "Channel authorized");
    Ok(Json(BroadcastAuthResponse { auth, channel_data }))
}

#[derive(Debug, thiserror::Error)]
pub enum AuthApiError {
    #[error("invalid socket_id")]
    InvalidSocketId,
    #[error("forbidden")]
    Forbidden,
    #[error("internal error")]
    Internal,
}

impl IntoResponse for AuthApiError {
    fn into_response(self) -> Response {
        let status = match self {
            AuthApiError::InvalidSocketId => StatusCode::BAD_REQUEST,
            AuthApiError::Forbidden => StatusCode::FORBIDDEN,
            AuthApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
