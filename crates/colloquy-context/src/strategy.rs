use colloquy_llm::Message as WireMessage;
use colloquy_types::Message;

/// Wire messages ready to submit, system preamble first when present
#[derive(Debug, Clone, Default)]
pub struct ContextWindow {
    pub system_prompt: Option<String>,
    pub messages: Vec<WireMessage>,
}

impl ContextWindow {
    pub fn into_messages(self) -> Vec<WireMessage> {
        let mut out = Vec::with_capacity(self.messages.len() + 1);
        if let Some(prompt) = self.system_prompt {
            out.push(WireMessage::system(prompt));
        }
        out.extend(self.messages);
        out
    }

    pub fn len(&self) -> usize {
        self.messages.len() + usize::from(self.system_prompt.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Strategy for trimming conversation history before it is sent
pub trait ContextStrategy: Send + Sync {
    fn prepare(&self, history: &[Message]) -> Vec<Message>;
}
