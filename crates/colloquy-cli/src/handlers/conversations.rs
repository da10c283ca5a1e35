use colloquy::{Conversation, ExportFormat};
use std::io::Write;

use crate::state::AppState;

/// One line per conversation, most recently updated first
pub fn format_conversation(conversation: &Conversation) -> String {
    let star = if conversation.starred { "*" } else { " " };
    format!(
        "{} {}  {}  {:>3} msgs  ${:.4}  {}",
        star,
        conversation.id,
        conversation.updated_at.format("%Y-%m-%d %H:%M"),
        conversation.messages.len(),
        conversation.total_cost(),
        conversation.title,
    )
}

pub fn list(state: &AppState, out: &mut impl Write) -> anyhow::Result<()> {
    let mut conversations = state.session.conversations();
    conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

    if conversations.is_empty() {
        writeln!(out, "No conversations yet")?;
        return Ok(());
    }
    for conversation in &conversations {
        writeln!(out, "{}", format_conversation(conversation))?;
    }
    Ok(())
}

pub async fn export(
    state: &AppState,
    conversation_id: &str,
    format: ExportFormat,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    match state.session.export(conversation_id, format).await? {
        Some(path) => writeln!(out, "{}", path.display())?,
        None => writeln!(out, "Conversation {} is empty, nothing exported", conversation_id)?,
    }
    Ok(())
}

pub async fn delete(state: &AppState, conversation_id: &str) -> anyhow::Result<()> {
    state.session.delete_conversation(conversation_id).await?;
    tracing::info!(conversation_id, "Conversation deleted");
    Ok(())
}
