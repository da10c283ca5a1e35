// Streaming commands: send and regenerate, printing deltas as they arrive

use colloquy::{
    GenerationOptions, GenerationOutcome, PendingFile, SessionError, SessionEvent, SessionStore,
};
use std::future::Future;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::state::AppState;

#[derive(Debug, Clone, Default)]
pub struct SendArgs {
    pub conversation: Option<String>,
    pub model: Option<String>,
    pub reasoning: bool,
    pub files: Vec<PathBuf>,
    pub text: String,
}

/// Write one event for `conversation_id`; returns `true` once its generation ended
pub fn render_event(
    event: &SessionEvent,
    conversation_id: &str,
    out: &mut impl Write,
) -> std::io::Result<bool> {
    if event.conversation_id() != conversation_id {
        return Ok(false);
    }

    match event {
        SessionEvent::GenerationStarted { model, .. } => {
            writeln!(out, "[{}]", model)?;
        }
        SessionEvent::Reasoning { delta, .. } => {
            write!(out, "\x1b[2m{}\x1b[0m", delta)?;
        }
        SessionEvent::Content { delta, .. } => {
            write!(out, "{}", delta)?;
        }
        SessionEvent::GenerationFinished { usage, .. } => {
            writeln!(out)?;
            writeln!(
                out,
                "[{} prompt / {} completion tokens]",
                usage.prompt_tokens, usage.completion_tokens
            )?;
            return Ok(true);
        }
        SessionEvent::GenerationStopped { .. } => {
            writeln!(out)?;
            writeln!(out, "[stopped]")?;
            return Ok(true);
        }
        SessionEvent::GenerationFailed { error, .. } => {
            writeln!(out)?;
            writeln!(out, "[error: {}]", error)?;
            return Ok(true);
        }
    }
    out.flush()?;
    Ok(false)
}

async fn print_events(mut events: broadcast::Receiver<SessionEvent>, conversation_id: String) {
    let mut stdout = std::io::stdout();
    loop {
        match events.recv().await {
            Ok(event) => match render_event(&event, &conversation_id, &mut stdout) {
                Ok(true) => break,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!("Failed to write output: {}", e);
                    break;
                }
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Output fell behind the stream");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Drive a generation to its end, printing as it streams; Ctrl-C stops it
async fn run_generation<F>(
    session: &Arc<SessionStore>,
    conversation_id: &str,
    generation: F,
) -> Result<GenerationOutcome, SessionError>
where
    F: Future<Output = Result<GenerationOutcome, SessionError>>,
{
    let printer = tokio::spawn(print_events(session.subscribe(), conversation_id.to_string()));

    tokio::pin!(generation);
    let result = loop {
        tokio::select! {
            result = &mut generation => break result,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!(conversation_id, "Interrupted, stopping generation");
                session.stop(conversation_id);
            }
        }
    };

    // only these outcomes publish a terminal event
    match &result {
        Ok(_) | Err(SessionError::Transport(_)) => {
            if let Err(e) = printer.await {
                tracing::debug!("Printer task ended abnormally: {}", e);
            }
        }
        Err(_) => printer.abort(),
    }
    result
}

pub async fn send(state: &AppState, args: SendArgs) -> anyhow::Result<()> {
    let session = &state.session;

    let conversation_id = match args.conversation {
        Some(id) => id,
        None => session.create_conversation(None),
    };

    let mut files = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let file = PendingFile::from_path(path)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
        files.push(file);
    }

    let model = args.model.unwrap_or_else(|| session.current_model());
    let generation = session.send(
        &conversation_id,
        &args.text,
        &model,
        args.reasoning,
        GenerationOptions::new(),
        files,
    );
    let result = run_generation(session, &conversation_id, generation).await;

    eprintln!("conversation: {}", conversation_id);
    result?;
    Ok(())
}

pub async fn regenerate(
    state: &AppState,
    conversation_id: &str,
    message_id: &str,
    model: Option<String>,
) -> anyhow::Result<()> {
    let session = &state.session;

    let mut options = GenerationOptions::new();
    if let Some(model) = model {
        options = options.model(model);
    }

    let generation = session.regenerate(conversation_id, message_id, options);
    run_generation(session, conversation_id, generation).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use colloquy::TokenUsage;

    fn render_all(events: &[SessionEvent]) -> (String, bool) {
        let mut out = Vec::new();
        let mut finished = false;
        for event in events {
            finished = render_event(event, "c1", &mut out).unwrap();
        }
        (String::from_utf8(out).unwrap(), finished)
    }

    #[test]
    fn test_render_content_and_finish() {
        let (text, finished) = render_all(&[
            SessionEvent::Content {
                conversation_id: "c1".into(),
                message_id: "m1".into(),
                delta: "Hel".into(),
            },
            SessionEvent::Content {
                conversation_id: "c1".into(),
                message_id: "m1".into(),
                delta: "lo".into(),
            },
            SessionEvent::GenerationFinished {
                conversation_id: "c1".into(),
                message_id: "m1".into(),
                usage: TokenUsage::new(3, 2),
            },
        ]);

        assert!(finished);
        assert!(text.starts_with("Hello\n"));
        assert!(text.contains("3 prompt / 2 completion"));
    }

    #[test]
    fn test_other_conversations_ignored() {
        let (text, finished) = render_all(&[SessionEvent::GenerationStopped {
            conversation_id: "c2".into(),
            message_id: None,
        }]);

        assert!(!finished);
        assert!(text.is_empty());
    }

    #[test]
    fn test_failure_is_terminal() {
        let (text, finished) = render_all(&[SessionEvent::GenerationFailed {
            conversation_id: "c1".into(),
            error: "timeout".into(),
        }]);

        assert!(finished);
        assert!(text.contains("[error: timeout]"));
    }
}
