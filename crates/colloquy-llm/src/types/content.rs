use serde::{Deserialize, Serialize};

/// Content carried by a message
///
/// Either plain text or an ordered list of typed blocks. Block order is kept
/// end to end because some providers reason over it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    /// Simple text content
    Text(String),

    /// Multimodal content (text + images, documents, audio, video)
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },

    Image {
        source: MediaSource,
    },

    Document {
        source: MediaSource,
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },

    Audio {
        source: MediaSource,
    },

    Video {
        source: MediaSource,
    },
}

/// Inline media payload (base64 encoded)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaSource {
    pub media_type: String,
    pub data: String,
}

impl MediaSource {
    pub fn new(media_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            media_type: media_type.into(),
            data: data.into(),
        }
    }

    /// `data:` URL form used by OpenAI-compatible endpoints
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.data)
    }
}

impl ContentBlock {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text { text: s.into() }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text { .. })
    }
}

impl Content {
    /// Create text content
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    /// Get as plain text (only for simple text content)
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Blocks(_) => None,
        }
    }

    /// True when at least one non-text block is present
    pub fn has_attachments(&self) -> bool {
        match self {
            Self::Text(_) => false,
            Self::Blocks(blocks) => blocks.iter().any(|b| !b.is_text()),
        }
    }

    /// Reduce to the concatenated text, dropping every non-text block.
    /// An all-attachment message becomes an empty string, never disappears.
    pub fn strip_attachments(&self) -> Self {
        Self::Text(extract_text(self))
    }

    /// Append streamed text.
    ///
    /// For block content the text lands in the last text block, or in a new
    /// one when the content ends with a non-text block.
    pub fn push_text(&mut self, delta: &str) {
        match self {
            Self::Text(s) => s.push_str(delta),
            Self::Blocks(blocks) => match blocks.last_mut() {
                Some(ContentBlock::Text { text }) => text.push_str(delta),
                _ => blocks.push(ContentBlock::text(delta)),
            },
        }
    }
}

impl Default for Content {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl From<String> for Content {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for Content {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<Vec<ContentBlock>> for Content {
    fn from(blocks: Vec<ContentBlock>) -> Self {
        Self::Blocks(blocks)
    }
}

/// Concatenate the text of `content`, newline-joining text blocks
pub fn extract_text(content: &Content) -> String {
    match content {
        Content::Text(s) => s.clone(),
        Content::Blocks(blocks) => blocks
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

/// Wire form is always a block list
pub fn normalize_for_wire(content: Content) -> Vec<ContentBlock> {
    match content {
        Content::Text(s) => vec![ContentBlock::Text { text: s }],
        Content::Blocks(blocks) => blocks,
    }
}
