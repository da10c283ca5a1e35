use colloquy_llm::{
    ChatOptions, ChatRequest, Message, ReasoningEffort, ReasoningParams, TokenUsage,
};

#[test]
fn test_chat_request_creation() {
    let messages = vec![Message::human("Hello")];
    let request = ChatRequest::new("gpt-4o", messages);

    assert_eq!(request.model, "gpt-4o");
    assert_eq!(request.messages.len(), 1);
}

#[test]
fn test_chat_request_with_options() {
    let options = ChatOptions::new()
        .temperature(0.7)
        .max_tokens(100)
        .reasoning(ReasoningParams::Effort(ReasoningEffort::High));

    let request = ChatRequest::new("o3", vec![Message::human("Hello")]).with_options(options);

    assert_eq!(request.options.temperature, Some(0.7));
    assert_eq!(request.options.max_tokens, Some(100));
    assert_eq!(
        request.options.reasoning,
        Some(ReasoningParams::Effort(ReasoningEffort::High))
    );
}

#[test]
fn test_chat_options_default() {
    let options = ChatOptions::default();

    assert_eq!(options.temperature, None);
    assert_eq!(options.max_tokens, None);
    assert!(options.reasoning.is_none());
}

#[test]
fn test_token_usage() {
    let usage = TokenUsage::new(12, 30);
    assert_eq!(usage.total(), 42);
    assert_eq!(TokenUsage::default().total(), 0);
}
