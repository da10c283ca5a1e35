use colloquy_llm::Message as WireMessage;
use colloquy_types::{Message, Role};

use crate::strategy::{ContextStrategy, ContextWindow};

/// Wire form of a session message
pub fn to_wire(message: &Message) -> WireMessage {
    match message.role() {
        Role::User => WireMessage::human(message.content().clone()),
        Role::Assistant => WireMessage::ai(message.content().clone()),
    }
}

/// Assemble the request messages for a history.
///
/// Streaming placeholders are left out. The system preamble is only
/// attached on the first turn (a history of exactly one user message).
pub fn build_window(
    history: &[Message],
    system_prompt: Option<&str>,
    strategy: &dyn ContextStrategy,
) -> ContextWindow {
    let settled: Vec<Message> = history.iter().filter(|m| !m.is_streaming()).cloned().collect();

    let first_turn = matches!(settled.as_slice(), [only] if only.is_user());
    let system_prompt = system_prompt
        .filter(|p| first_turn && !p.trim().is_empty())
        .map(str::to_string);

    let messages = strategy.prepare(&settled).iter().map(to_wire).collect();

    ContextWindow {
        system_prompt,
        messages,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WindowedContextStrategy;
    use colloquy_llm::Content;

    #[test]
    fn test_first_turn_gets_system_prompt() {
        let history = vec![Message::user("Explain recursion")];

        let window = build_window(&history, Some("Be concise"), &WindowedContextStrategy::default());
        let messages = window.into_messages();

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0], WireMessage::system("Be concise"));
        assert_eq!(messages[1], WireMessage::human("Explain recursion"));
    }

    #[test]
    fn test_later_turns_have_no_system_prompt() {
        let history = vec![
            Message::user("hi"),
            Message::assistant("hello", "m1"),
            Message::user("again"),
        ];

        let window = build_window(&history, Some("Be concise"), &WindowedContextStrategy::default());

        assert!(window.system_prompt.is_none());
        assert_eq!(window.len(), 3);
        assert_eq!(window.messages[1].role(), "assistant");
    }

    #[test]
    fn test_streaming_placeholder_excluded() {
        let history = vec![Message::user("hi"), Message::assistant_placeholder("m1")];

        let window = build_window(&history, Some("sys"), &WindowedContextStrategy::default());
        let messages = window.into_messages();

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content(), &Content::text("hi"));
    }

    #[test]
    fn test_blank_system_prompt_ignored() {
        let history = vec![Message::user("hi")];
        let window = build_window(&history, Some("   "), &WindowedContextStrategy::default());

        assert!(window.system_prompt.is_none());
    }
}
