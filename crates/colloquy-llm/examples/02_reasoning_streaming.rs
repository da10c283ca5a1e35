use anyhow::Result;
use colloquy_llm::{
    ChatClient, ChatOptions, ChatRequest, Message, ModelCatalog, OpenAIClient, StreamEvent,
    DEFAULT_REASONING_BUDGET_FLOOR,
};
use futures::StreamExt;

#[tokio::main]
async fn main() -> Result<()> {
    let api_key = std::env::var("OPENAI_API_KEY")?;
    let model = std::env::var("MODEL").unwrap_or_else(|_| "o3-mini".to_string());
    let client = OpenAIClient::new(api_key)?;

    let max_tokens = 8192;
    let mut options = ChatOptions::new().max_tokens(max_tokens);
    if let Some(params) = ModelCatalog::new()
        .capability(&model)
        .shape(true, max_tokens, DEFAULT_REASONING_BUDGET_FLOOR)
    {
        options = options.reasoning(params);
    }

    let request = ChatRequest::new(
        model,
        vec![Message::human("Explain how photosynthesis works at the molecular level.")],
    )
    .with_options(options);

    let mut stream = client.chat_stream(request).await?;
    let mut reasoning_displayed = false;

    while let Some(event) = stream.next().await {
        match event? {
            StreamEvent::Reasoning { content } => {
                if !reasoning_displayed {
                    println!("[REASONING]");
                    reasoning_displayed = true;
                }
                print!("{}", content);
                std::io::Write::flush(&mut std::io::stdout())?;
            }
            StreamEvent::Content { content } => {
                if reasoning_displayed {
                    println!("\n\n[RESPONSE]");
                    reasoning_displayed = false;
                }
                print!("{}", content);
                std::io::Write::flush(&mut std::io::stdout())?;
            }
            StreamEvent::Done { .. } => println!("\n\nDone."),
            StreamEvent::Usage { .. } => {}
        }
    }

    Ok(())
}
