//! ABOUTME: Renders orchestrator results into chat messages with a plain-text fallback
//! ABOUTME: Callback-button replies edit the original message; everything else sends a new one

use automaton_core::error::Result;
use automaton_core::traits::{InlineAction, Transport};
use tracing::warn;

/// A reply the orchestrator wants rendered: rich-formatted text plus the
/// inline actions (buttons) to attach, if any.
#[derive(Debug, Clone)]
pub struct Reply {
    pub rich_text: String,
    pub plain_text: String,
    pub actions: Vec<InlineAction>,
}

impl Reply {
    #[must_use]
    pub fn plain(text: impl Into<String>) -> Self {
        let text = text.into();
        Self { rich_text: text.clone(), plain_text: text, actions: vec![] }
    }
}

/// Sends a new message, or — when `reply_to_message_id` is set (a
/// callback-button reply) — edits the original in place instead of
/// appending a new one. A rich-render failure (reported by the transport
/// returning an error on `send`/`edit`) retries once with `plain_text`.
pub async fn deliver(
    transport: &dyn Transport,
    user_id: i64,
    reply: &Reply,
    reply_to_message_id: Option<&str>,
) -> Result<String> {
    if let Some(message_id) = reply_to_message_id {
        if let Err(e) = transport.edit(user_id, message_id, &reply.rich_text).await {
            warn!(user_id, error = %e, "rich edit failed, falling back to plain text");
            transport.edit(user_id, message_id, &reply.plain_text).await?;
        }
        return Ok(message_id.to_string());
    }

    match transport.send(user_id, &reply.rich_text, &reply.actions).await {
        Ok(message_id) => Ok(message_id),
        Err(e) => {
            warn!(user_id, error = %e, "rich send failed, falling back to plain text");
            transport.send(user_id, &reply.plain_text, &reply.actions).await
        }
    }
}
