use colloquy_types::Message;

use crate::strategy::ContextStrategy;

/// Keep the last `max_messages` turns.
///
/// Only the newest `max_messages_with_attachments` of those keep their
/// non-text blocks; older turns in the window are reduced to plain text.
/// A turn that ends up empty is kept as `""` so user/assistant pairing
/// survives.
pub fn prepare(
    messages: &[Message],
    max_messages: usize,
    max_messages_with_attachments: usize,
) -> Vec<Message> {
    let start = messages.len().saturating_sub(max_messages);
    let window = &messages[start..];
    let keep_from = window.len().saturating_sub(max_messages_with_attachments);

    window
        .iter()
        .enumerate()
        .map(|(i, message)| {
            if i >= keep_from || !message.content().has_attachments() {
                message.clone()
            } else {
                let stripped = message.content().strip_attachments();
                message.clone().with_content(stripped)
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy)]
pub struct WindowedContextStrategy {
    pub max_messages: usize,
    pub max_messages_with_attachments: usize,
}

impl WindowedContextStrategy {
    pub fn new(max_messages: usize, max_messages_with_attachments: usize) -> Self {
        Self {
            max_messages,
            max_messages_with_attachments,
        }
    }
}

impl Default for WindowedContextStrategy {
    fn default() -> Self {
        Self::new(20, 5)
    }
}

impl ContextStrategy for WindowedContextStrategy {
    fn prepare(&self, history: &[Message]) -> Vec<Message> {
        let prepared = prepare(history, self.max_messages, self.max_messages_with_attachments);
        tracing::debug!(
            history = history.len(),
            window = prepared.len(),
            "Prepared context window"
        );
        prepared
    }
}
