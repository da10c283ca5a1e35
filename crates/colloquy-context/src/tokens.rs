use std::sync::OnceLock;

use colloquy_llm::{extract_text, Message};
use tiktoken_rs::{cl100k_base, CoreBPE};

fn tokenizer() -> Option<&'static CoreBPE> {
    static BPE: OnceLock<Option<CoreBPE>> = OnceLock::new();
    BPE.get_or_init(|| match cl100k_base() {
        Ok(bpe) => Some(bpe),
        Err(e) => {
            tracing::warn!("Tokenizer unavailable, falling back to character estimate: {}", e);
            None
        }
    })
    .as_ref()
}

/// Token count of `text` under `cl100k_base`, or roughly chars / 4 when the
/// tokenizer cannot be built
pub fn estimate_tokens(text: &str) -> u32 {
    if text.is_empty() {
        return 0;
    }
    let count = match tokenizer() {
        Some(bpe) => bpe.encode_with_special_tokens(text).len(),
        None => text.chars().count().div_ceil(4),
    };
    u32::try_from(count).unwrap_or(u32::MAX)
}

/// Prompt-side estimate for a list of wire messages
pub fn estimate_messages_tokens(messages: &[Message]) -> u32 {
    messages
        .iter()
        .map(|m| estimate_tokens(&extract_text(m.content())))
        .fold(0u32, u32::saturating_add)
}
