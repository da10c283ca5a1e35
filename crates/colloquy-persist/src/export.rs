use colloquy_types::{Conversation, Role};
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::str::FromStr;

use crate::error::{PersistError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Markdown,
    Txt,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Markdown => "md",
            Self::Txt => "txt",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = PersistError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "markdown" | "md" => Ok(Self::Markdown),
            "txt" | "text" => Ok(Self::Txt),
            other => Err(PersistError::Internal(format!("Unknown export format: {}", other))),
        }
    }
}

/// Render a conversation in the given format
pub fn render(conversation: &Conversation, format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Json => Ok(serde_json::to_string_pretty(conversation)?),
        ExportFormat::Markdown => Ok(render_markdown(conversation)),
        ExportFormat::Txt => Ok(render_text(conversation)),
    }
}

fn render_markdown(conversation: &Conversation) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {}\n", conversation.title);
    let _ = writeln!(
        out,
        "_Created {}_\n",
        conversation.created_at.format("%Y-%m-%d %H:%M UTC")
    );

    for message in &conversation.messages {
        match (message.role(), message.model()) {
            (Role::Assistant, Some(model)) => {
                let _ = writeln!(out, "## Assistant ({})\n", model);
            }
            (Role::Assistant, None) => out.push_str("## Assistant\n\n"),
            (Role::User, _) => out.push_str("## User\n\n"),
        }

        if let Some(thinking) = message.thinking().filter(|t| !t.is_empty()) {
            let _ = writeln!(
                out,
                "<details>\n<summary>Thinking</summary>\n\n{}\n\n</details>\n",
                thinking
            );
        }

        let _ = writeln!(out, "{}\n", message.text());

        if !message.attachments().is_empty() {
            let names: Vec<&str> = message.attachments().iter().map(|a| a.name.as_str()).collect();
            let _ = writeln!(out, "_Attachments: {}_\n", names.join(", "));
        }
    }

    out
}

fn render_text(conversation: &Conversation) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", conversation.title);
    let _ = writeln!(out, "{}\n", "=".repeat(conversation.title.chars().count().max(3)));

    for message in &conversation.messages {
        let label = match message.role() {
            Role::User => "User",
            Role::Assistant => "Assistant",
        };
        let _ = writeln!(out, "{}:\n{}\n", label, message.text());
    }

    out
}
