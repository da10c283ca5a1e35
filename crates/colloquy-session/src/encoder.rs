use base64::Engine;
use colloquy_types::{ContentBlock, MediaSource};
use std::path::{Path, PathBuf};

use crate::error::{Result, SessionError};

/// A file about to be attached to a user turn.
///
/// `stored_path` is set when the bytes already live in the asset store
/// (a resend restoring an earlier upload), so they are not stored twice.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
    pub stored_path: Option<PathBuf>,
}

impl PendingFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes,
            stored_path: None,
        }
    }

    pub fn with_stored_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.stored_path = Some(path.into());
        self
    }

    /// Read a file from disk, guessing its MIME type from the extension
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        Ok(Self::new(name, guess_mime_type(path), bytes))
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}

pub fn guess_mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "pdf" => "application/pdf",
        "txt" | "md" => "text/plain",
        "csv" => "text/csv",
        "json" => "application/json",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        _ => "application/octet-stream",
    }
}

/// Turns an attached file into a wire content block
pub trait AttachmentEncoder: Send + Sync {
    fn encode(&self, file: &PendingFile) -> Result<ContentBlock>;
}

/// Inline base64 blocks, chosen by MIME family
#[derive(Debug, Clone, Copy, Default)]
pub struct Base64Encoder;

impl AttachmentEncoder for Base64Encoder {
    fn encode(&self, file: &PendingFile) -> Result<ContentBlock> {
        if file.bytes.is_empty() {
            return Err(SessionError::Encoding {
                name: file.name.clone(),
                reason: "file is empty".to_string(),
            });
        }

        let data = base64::engine::general_purpose::STANDARD.encode(&file.bytes);
        let source = MediaSource::new(file.mime_type.clone(), data);

        let family = file.mime_type.split('/').next().unwrap_or_default();
        Ok(match family {
            "image" => ContentBlock::Image { source },
            "audio" => ContentBlock::Audio { source },
            "video" => ContentBlock::Video { source },
            _ => ContentBlock::Document {
                source,
                name: Some(file.name.clone()),
            },
        })
    }
}
