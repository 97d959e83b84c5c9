//! Channel authorization gate.
//!
//! Decides whether a principal may subscribe to a channel. Each channel
//! variant has exactly one rule; the table is the `match` in
//! [`ChannelGate::authorize`]. The gate keeps no state between calls, so a
//! revoked role or a transferred conversation takes effect on the next
//! authorization request.

use std::sync::Arc;

use async_trait::async_trait;
use bazaar_sdk::objects::{Channel, Principal, Role};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum GateError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Lookup of AI chat conversation ownership.
#[async_trait]
pub trait ConversationOwnership: Send + Sync {
    /// `true` if `conversation_id` exists and belongs to `user_id`.
    async fn belongs_to(&self, conversation_id: &str, user_id: u64) -> Result<bool, GateError>;
}

const FRAUD_DESK: &[Role] = &[Role::Admin, Role::Moderator];
const EXPERIMENT_DESK: &[Role] = &[Role::Admin, Role::DataAnalyst];

#[derive(Clone)]
pub struct ChannelGate {
    conversations: Arc<dyn ConversationOwnership>,
}

impl ChannelGate {
    pub fn new(conversations: Arc<dyn ConversationOwnership>) -> Self {
        Self { conversations }
    }

    /// Evaluate the rule for `channel`.
    ///
    /// `Err` only comes from the conversation lookup and must not be
    /// treated as a grant.
    pub async fn authorize(
        &self,
        principal: &Principal,
        channel: &Channel,
    ) -> Result<bool, GateError> {
        let allowed = match channel {
            Channel::User(id)
            | Channel::FrameworkUser(id)
            | Channel::AiUser(id)
            | Channel::AiNotifications(id) => principal.id == *id,
            Channel::AiChat(conversation) => {
                self.conversations
                    .belongs_to(conversation, principal.id)
                    .await?
            }
            Channel::FraudSeller(seller) | Channel::SentimentSeller(seller) => {
                principal.id == *seller && principal.has_role(Role::Seller)
            }
            Channel::FraudAdmin => principal.has_any_role(FRAUD_DESK),
            Channel::AbTestAdmin => principal.has_any_role(EXPERIMENT_DESK),
        };
        debug!(%channel, user_id = principal.id, allowed, "channel authorization");
        Ok(allowed)
    }
}
