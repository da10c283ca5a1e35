use anyhow::Result;
use futures::{Stream, StreamExt};
use std::fmt::Display;

use super::buffering::LineBuffer;
use crate::traits::EventStream;
use crate::StreamEvent;

/// Strategy pattern for parsing different SSE payload shapes
pub trait SseLineParser: Send {
    /// Parse a data line into stream events
    fn parse_data_line(&self, data: &str) -> Result<Vec<StreamEvent>>;

    /// Check if this line signals end of stream
    fn is_done_marker(&self, data: &str) -> bool {
        data == "[DONE]"
    }
}

enum LineOutcome {
    Events(Vec<StreamEvent>),
    Done,
    Failed(anyhow::Error),
}

fn handle_line<P: SseLineParser>(parser: &P, line: &str) -> LineOutcome {
    // comments (": keep-alive"), `event:` and `id:` lines carry nothing we need
    let data = match line.strip_prefix("data:") {
        Some(data) => data.trim_start(),
        None => return LineOutcome::Events(Vec::new()),
    };

    if parser.is_done_marker(data) {
        return LineOutcome::Done;
    }

    match parser.parse_data_line(data) {
        Ok(events) => LineOutcome::Events(events),
        Err(e) => LineOutcome::Failed(e),
    }
}

/// Generic SSE stream parser over any byte stream
///
/// Yields parsed events in wire order and a single `Done` on the done
/// marker. The first error ends the stream.
pub fn parse_sse_stream<S, B, E, P>(bytes: S, parser: P) -> EventStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
    P: SseLineParser + 'static,
{
    Box::pin(async_stream::stream! {
        let mut byte_chunks = Box::pin(bytes);
        let mut buffer = LineBuffer::with_capacity(4096);
        let mut finished = false;

        'outer: while let Some(chunk_result) = byte_chunks.next().await {
            let chunk = match chunk_result {
                Ok(chunk) => chunk,
                Err(e) => {
                    yield Err(anyhow::anyhow!("Stream error: {}", e));
                    finished = true;
                    break;
                }
            };

            buffer.extend(chunk.as_ref());

            // Process all complete lines in buffer
            while let Some(line_result) = buffer.next_line() {
                let line = match line_result {
                    Ok(line) => line,
                    Err(e) => {
                        yield Err(e);
                        finished = true;
                        break 'outer;
                    }
                };

                match handle_line(&parser, &line) {
                    LineOutcome::Events(events) => {
                        for event in events {
                            yield Ok(event);
                        }
                    }
                    LineOutcome::Done => {
                        yield Ok(StreamEvent::Done { finish_reason: None });
                        finished = true;
                        break 'outer;
                    }
                    LineOutcome::Failed(e) => {
                        yield Err(e);
                        finished = true;
                        break 'outer;
                    }
                }
            }
        }

        // Trailing line without newline
        let trailing = if finished { None } else { buffer.take_remaining() };
        if let Some(Ok(line)) = trailing {
            match handle_line(&parser, &line) {
                LineOutcome::Events(events) => {
                    for event in events {
                        yield Ok(event);
                    }
                }
                LineOutcome::Done => yield Ok(StreamEvent::Done { finish_reason: None }),
                LineOutcome::Failed(e) => yield Err(e),
            }
        }
    })
}

/// Parse the body of an HTTP response as SSE
pub fn parse_sse_response<P: SseLineParser + 'static>(
    response: reqwest::Response,
    parser: P,
) -> EventStream {
    parse_sse_stream(response.bytes_stream(), parser)
}
