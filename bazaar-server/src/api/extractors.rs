//! Custom Axum extractors for request authentication.
//!
//! Provides:
//! - `SignedBody<T>`: verifies the `Bazaar-Signature` header against a
//!   signed JSON body (used by the service publish endpoint).
//! - `BearerPrincipal`: verifies the bearer token from the `Authorization`
//!   header or the `token` query parameter (used by channel authorization
//!   and the WebSocket handshake).
//! - `AuthPayload`: the channel authorization body, as JSON or form data.
//!
//! All cryptographic operations are delegated to [`bazaar_sdk::signature`]
//! and [`bazaar_sdk::token`].

use axum::{
    Form, Json,
    extract::{FromRequest, FromRequestParts, Request},
    http::{StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
};
use bazaar_sdk::objects::{BroadcastAuthRequest, ErrorBody, Principal};
use bazaar_sdk::signature::{SIGNATURE_HEADER, Signature, SignatureError, SignedObject};
use bazaar_sdk::token::{self, TokenError};

use crate::state::AppState;

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_owned(),
        }),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// SignedBody: service authentication via signed JSON body
// ---------------------------------------------------------------------------

/// An Axum extractor that verifies the `Bazaar-Signature` header and
/// deserializes + authenticates the JSON request body.
///
/// # Header format
///
/// ```text
/// Bazaar-Signature: {unix_timestamp}.{base64_signature}
/// ```
///
/// The signature is computed as `HMAC-SHA256("{timestamp}.{json_body}", service_secret)`.
pub struct SignedBody<T: Signature>(pub T);

#[derive(Debug, thiserror::Error)]
pub enum SignedBodyError {
    #[error("missing Bazaar-Signature header")]
    MissingHeader,
    #[error("invalid Bazaar-Signature header format")]
    InvalidHeader,
    #[error("invalid signature encoding")]
    InvalidEncoding,
    #[error("failed to read request body")]
    BodyReadError,
    #[error("invalid JSON body: {0}")]
    JsonError(serde_json::Error),
    #[error("signature verification failed")]
    VerificationFailed,
}

impl From<SignatureError> for SignedBodyError {
    fn from(err: SignatureError) -> Self {
        match err {
            SignatureError::InvalidFormat => Self::InvalidHeader,
            SignatureError::InvalidEncoding => Self::InvalidEncoding,
            SignatureError::Json(e) => Self::JsonError(e),
            SignatureError::SignatureMismatch | SignatureError::Expired => Self::VerificationFailed,
        }
    }
}

impl IntoResponse for SignedBodyError {
    fn into_response(self) -> Response {
        let status = match self {
            SignedBodyError::MissingHeader | SignedBodyError::VerificationFailed => {
                StatusCode::UNAUTHORIZED
            }
            SignedBodyError::InvalidHeader
            | SignedBodyError::InvalidEncoding
            | SignedBodyError::BodyReadError
            | SignedBodyError::JsonError(_) => StatusCode::BAD_REQUEST,
        };
        error_response(status, &self.to_string())
    }
}

impl<T: Signature + Send> FromRequest<AppState> for SignedBody<T> {
    type Rejection = SignedBodyError;

    async fn from_request(req: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        let header_value = req
            .headers()
            .get(SIGNATURE_HEADER)
            .ok_or(SignedBodyError::MissingHeader)?
            .to_str()
            .map_err(|_| SignedBodyError::InvalidHeader)?
            .to_owned();

        let body_bytes = axum::body::to_bytes(req.into_body(), 1024 * 1024)
            .await
            .map_err(|_| SignedBodyError::BodyReadError)?;

        let json =
            String::from_utf8(body_bytes.to_vec()).map_err(|_| SignedBodyError::BodyReadError)?;

        let signed = SignedObject::<T>::from_header_and_body(&header_value, json)?;

        let service = state.config.service.read().await;
        let verified_body = signed.verify(service.secret.as_bytes())?;
        drop(service);

        Ok(SignedBody(verified_body))
    }
}

// ---------------------------------------------------------------------------
// BearerPrincipal: end-user authentication via bearer token
// ---------------------------------------------------------------------------

/// The principal behind a verified bearer token.
///
/// Browsers cannot set headers on a WebSocket handshake, so the token is
/// also accepted as `?token=`. The header wins when both are present.
pub struct BearerPrincipal(pub Principal);

#[derive(Debug, thiserror::Error)]
pub enum BearerError {
    #[error("missing bearer token")]
    Missing,
    #[error(transparent)]
    Invalid(#[from] TokenError),
}

impl IntoResponse for BearerError {
    fn into_response(self) -> Response {
        error_response(StatusCode::UNAUTHORIZED, &self.to_string())
    }
}

fn bearer_from_header(parts: &Parts) -> Option<String> {
    let value = parts.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then(|| token.trim().to_owned())
}

fn bearer_from_query(parts: &Parts) -> Option<String> {
    let query = parts.uri.query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "token")
        .map(|(_, value)| value.into_owned())
}

impl FromRequestParts<AppState> for BearerPrincipal {
    type Rejection = BearerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_from_header(parts)
            .or_else(|| bearer_from_query(parts))
            .filter(|token| !token.is_empty())
            .ok_or(BearerError::Missing)?;

        let tokens = state.config.tokens.read().await;
        let principal = token::verify_token(&token, tokens.secret.as_bytes())?;
        drop(tokens);

        Ok(BearerPrincipal(principal))
    }
}

// ---------------------------------------------------------------------------
// AuthPayload: JSON or form-encoded channel authorization body
// ---------------------------------------------------------------------------

/// `{channel_name, socket_id}`, accepted as JSON or
/// `application/x-www-form-urlencoded`.
pub struct AuthPayload(pub BroadcastAuthRequest);

impl FromRequest<AppState> for AuthPayload {
    type Rejection = Response;

    async fn from_request(req: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        let is_form = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));

        let body = if is_form {
            let Form(body) = Form::<BroadcastAuthRequest>::from_request(req, state)
                .await
                .map_err(IntoResponse::into_response)?;
            body
        } else {
            let Json(body) = Json::<BroadcastAuthRequest>::from_request(req, state)
                .await
                .map_err(IntoResponse::into_response)?;
            body
        };
        Ok(AuthPayload(body))
    }
}
