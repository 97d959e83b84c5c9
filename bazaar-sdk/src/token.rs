//! Bearer tokens identifying a [`Principal`].
//!
//! ```text
//! {base64url(claims_json)}.{base64url(HMAC-SHA256(base64url(claims_json), token_secret))}
//! ```
//!
//! Tokens are minted by the marketplace's session layer and presented to
//! both `POST /broadcasting/auth` and the WebSocket handshake.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::objects::principal::{Principal, Role};

/// Claims carried inside a bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Principal id.
    pub sub: u64,
    #[serde(default)]
    pub roles: BTreeSet<Role>,
    /// Expiry as a unix timestamp (seconds).
    pub exp: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("malformed bearer token")]
    Malformed,
    #[error("bearer token signature mismatch")]
    BadSignature,
    #[error("bearer token expired")]
    Expired,
}

/// Issue a token for `principal` valid for `ttl`.
pub fn issue_token(principal: &Principal, ttl: std::time::Duration, secret: &[u8]) -> String {
    let now = time::OffsetDateTime::now_utc().unix_timestamp();
    let ttl = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
    let claims = TokenClaims {
        sub: principal.id,
        roles: principal.roles.clone(),
        exp: now.saturating_add(ttl),
    };
    encode_claims(&claims, secret)
}

/// Encode and sign arbitrary claims.
pub fn encode_claims(claims: &TokenClaims, secret: &[u8]) -> String {
    // Serializing a struct of integers and unit enums cannot fail.
    let json = serde_json::to_vec(claims).unwrap_or_default();
    let payload = fast32::base64::RFC4648_URL_NOPAD.encode(&json);
    let tag = ring::hmac::sign(
        &ring::hmac::Key::new(ring::hmac::HMAC_SHA256, secret),
        payload.as_bytes(),
    );
    format!(
        "{payload}.{}",
        fast32::base64::RFC4648_URL_NOPAD.encode(tag.as_ref())
    )
}

/// Verify `token` and return the principal it identifies.
pub fn verify_token(token: &str, secret: &[u8]) -> Result<Principal, TokenError> {
    let (payload, signature) = token.split_once('.').ok_or(TokenError::Malformed)?;
    let signature = fast32::base64::RFC4648_URL_NOPAD
        .decode_str(signature)
        .map_err(|_| TokenError::Malformed)?;
    ring::hmac::verify(
        &ring::hmac::Key::new(ring::hmac::HMAC_SHA256, secret),
        payload.as_bytes(),
        &signature,
    )
    .map_err(|_| TokenError::BadSignature)?;

    let json = fast32::base64::RFC4648_URL_NOPAD
        .decode_str(payload)
        .map_err(|_| TokenError::Malformed)?;
    let claims: TokenClaims = serde_json::from_slice(&json).map_err(|_| TokenError::Malformed)?;

    let now = time::OffsetDateTime::now_utc().unix_timestamp();
    if claims.exp <= now {
        return Err(TokenError::Expired);
    }
    Ok(Principal {
        id: claims.sub,
        roles: claims.roles,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const SECRET: &[u8] = b"token-secret-token-secret";

    #[test]
    fn test_issue_and_verify() {
        let principal = Principal::new(7, [Role::Seller]);
        let token = issue_token(&principal, Duration::from_secs(60), SECRET);
        assert_eq!(verify_token(&token, SECRET).unwrap(), principal);
    }

    #[test]
    fn test_tampered_claims_are_rejected() {
        let token = issue_token(&Principal::new(7, [Role::Seller]), Duration::from_secs(60), SECRET);
        let (_, signature) = token.split_once('.').unwrap();
        let forged = encode_claims(
            &TokenClaims {
                sub: 7,
                roles: [Role::Admin].into(),
                exp: i64::MAX,
            },
            b"attacker-secret",
        );
        let (forged_payload, _) = forged.split_once('.').unwrap();
        let spliced = format!("{forged_payload}.{signature}");
        assert!(matches!(
            verify_token(&spliced, SECRET),
            Err(TokenError::BadSignature)
        ));
    }

    #[test]
    fn test_expired_token() {
        let claims = TokenClaims {
            sub: 1,
            roles: BTreeSet::new(),
            exp: time::OffsetDateTime::now_utc().unix_timestamp() - 1,
        };
        let token = encode_claims(&claims, SECRET);
        assert!(matches!(verify_token(&token, SECRET), Err(TokenError::Expired)));
    }

    #[test]
    fn test_garbage() {
        assert!(matches!(verify_token("nodot", SECRET), Err(TokenError::Malformed)));
        assert!(matches!(verify_token("a.%%%", SECRET), Err(TokenError::Malformed)));
    }
}
