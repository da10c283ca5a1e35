use async_trait::async_trait;
use colloquy_types::Conversation;
use std::path::{Path, PathBuf};

use crate::error::{validate_id, Result};
use crate::export::{render, ExportFormat};
use crate::store::ConversationStore;

/// One pretty-printed JSON file per conversation.
///
/// Layout under `root`:
/// - `conversations/<id>.json`
/// - `projects/<project>/conversations/<id>.json`
/// - `exports/<title>-<id>.<ext>`
pub struct JsonConversationStore {
    root: PathBuf,
}

impl JsonConversationStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn conversations_dir(&self, project_id: Option<&str>) -> PathBuf {
        match project_id {
            Some(project) => self.root.join("projects").join(project).join("conversations"),
            None => self.root.join("conversations"),
        }
    }

    fn conversation_path(&self, id: &str, project_id: Option<&str>) -> Result<PathBuf> {
        validate_id(id)?;
        if let Some(project) = project_id {
            validate_id(project)?;
        }
        Ok(self.conversations_dir(project_id).join(format!("{}.json", id)))
    }

    /// Every directory that may hold conversation files
    async fn conversation_dirs(&self) -> Result<Vec<PathBuf>> {
        let mut dirs = vec![self.conversations_dir(None)];

        let projects = self.root.join("projects");
        if let Some(mut entries) = read_dir_if_exists(&projects).await? {
            while let Some(entry) = entries.next_entry().await? {
                if entry.file_type().await?.is_dir() {
                    dirs.push(entry.path().join("conversations"));
                }
            }
        }

        Ok(dirs)
    }
}

async fn read_dir_if_exists(dir: &Path) -> Result<Option<tokio::fs::ReadDir>> {
    match tokio::fs::read_dir(dir).await {
        Ok(entries) => Ok(Some(entries)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Write to a sibling temp file, then rename over the target
async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    let temp_path = path.with_extension(format!("json.{}.tmp", suffix));
    tokio::fs::write(&temp_path, contents).await?;
    if let Err(e) = tokio::fs::rename(&temp_path, path).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(e.into());
    }
    Ok(())
}

fn export_file_name(conversation: &Conversation, format: ExportFormat) -> String {
    let slug: String = conversation
        .title
        .chars()
        .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    let short_id: String = conversation.id.chars().take(8).collect();
    let slug = if slug.is_empty() { "conversation".to_string() } else { slug };

    format!("{}-{}.{}", slug, short_id, format.extension())
}

#[async_trait]
impl ConversationStore for JsonConversationStore {
    async fn load_all(&self) -> Result<Vec<Conversation>> {
        let mut conversations = Vec::new();

        for dir in self.conversation_dirs().await? {
            let Some(mut entries) = read_dir_if_exists(&dir).await? else {
                continue;
            };

            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if path.extension().and_then(|s| s.to_str()) != Some("json") {
                    continue;
                }

                let content = tokio::fs::read_to_string(&path).await?;
                match serde_json::from_str::<Conversation>(&content) {
                    Ok(conversation) => conversations.push(conversation),
                    Err(e) => {
                        tracing::warn!(path = %path.display(), "Skipping unreadable conversation file: {}", e);
                    }
                }
            }
        }

        // Most recently updated first
        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

        tracing::info!(count = conversations.len(), "Loaded conversations");
        Ok(conversations)
    }

    async fn save(&self, conversation: &Conversation) -> Result<()> {
        let path = self.conversation_path(&conversation.id, conversation.project_id.as_deref())?;
        let json = serde_json::to_vec_pretty(conversation)?;

        write_atomic(&path, &json).await?;

        tracing::debug!(conversation_id = %conversation.id, "Saved conversation");
        Ok(())
    }

    async fn delete(&self, conversation_id: &str, project_id: Option<&str>) -> Result<()> {
        let path = self.conversation_path(conversation_id, project_id)?;

        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn export(&self, conversation: &Conversation, format: ExportFormat) -> Result<Option<PathBuf>> {
        if conversation.is_empty() {
            return Ok(None);
        }

        let dir = self.root.join("exports");
        tokio::fs::create_dir_all(&dir).await?;

        let path = dir.join(export_file_name(conversation, format));
        let rendered = render(conversation, format)?;
        tokio::fs::write(&path, rendered).await?;

        tracing::info!(path = %path.display(), "Exported conversation");
        Ok(Some(path))
    }
}
