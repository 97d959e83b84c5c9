//! Conversation ownership backends for the chat channel rule.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::gate::{ConversationOwnership, GateError};

/// Ownership lookup against the marketplace's `ai_conversations` table.
#[derive(Debug, Clone)]
pub struct PgConversationOwnership {
    pool: PgPool,
}

impl PgConversationOwnership {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConversationOwnership for PgConversationOwnership {
    async fn belongs_to(&self, conversation_id: &str, user_id: u64) -> Result<bool, GateError> {
        // user ids are BIGINT; anything above i64::MAX cannot own a row
        let Ok(user_id) = i64::try_from(user_id) else {
            return Ok(false);
        };
        let owned = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM ai_conversations
                WHERE id::text = $1 AND user_id = $2
            )
            "#,
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(owned)
    }
}

/// Denies every chat channel. Used when no database is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoConversations;

#[async_trait]
impl ConversationOwnership for NoConversations {
    async fn belongs_to(&self, _conversation_id: &str, _user_id: u64) -> Result<bool, GateError> {
        Ok(false)
    }
}
