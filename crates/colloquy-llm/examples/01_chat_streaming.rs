use anyhow::Result;
use colloquy_llm::{ChatClient, ChatRequest, Message, OpenAIClient, StreamEvent};
use futures::StreamExt;

#[tokio::main]
async fn main() -> Result<()> {
    let api_key = std::env::var("OPENAI_API_KEY")?;
    let client = OpenAIClient::new(api_key)?;

    let request = ChatRequest::new(
        "gpt-4o-mini",
        vec![
            Message::system("You are a concise assistant."),
            Message::human("Write a haiku about borrow checking."),
        ],
    );

    let mut stream = client.chat_stream(request).await?;

    while let Some(event) = stream.next().await {
        match event? {
            StreamEvent::Content { content } => {
                print!("{}", content);
                std::io::Write::flush(&mut std::io::stdout())?;
            }
            StreamEvent::Usage { usage } => {
                println!("\n\n[{} prompt / {} completion tokens]", usage.prompt_tokens, usage.completion_tokens);
            }
            StreamEvent::Done { .. } => println!("Done."),
            StreamEvent::Reasoning { .. } => {}
        }
    }

    Ok(())
}
