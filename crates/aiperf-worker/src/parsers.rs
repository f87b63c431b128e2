//! Per-endpoint streamed-chunk parsing (spec §6 "Wire protocol (outbound)"):
//! a chunk contributes to `delta_tokens` when it carries
//! `.choices[0].delta.content` (chat) or `.choices[0].text` (completions);
//! ITL is the gap between consecutive such chunks.

use serde_json::Value;

use aiperf_core::config::EndpointType;

pub trait ResponseParser: Send + Sync {
    /// The text this chunk contributes, empty if it carries none.
    fn chunk_text(&self, chunk: &Value) -> String;
    fn finish_reason(&self, chunk: &Value) -> Option<String>;
    /// Token/usage counts from a non-streaming response body.
    fn usage(&self, body: &Value) -> (Option<u32>, Option<u32>);
}

pub fn parser_for(endpoint_type: EndpointType) -> Box<dyn ResponseParser> {
    match endpoint_type {
        EndpointType::Chat => Box::new(ChatParser),
        EndpointType::Completions => Box::new(CompletionsParser),
        EndpointType::Embeddings => Box::new(NonStreamingParser),
        EndpointType::Rankings => Box::new(NonStreamingParser),
    }
}

struct ChatParser;

impl ResponseParser for ChatParser {
    fn chunk_text(&self, chunk: &Value) -> String {
        chunk
            .pointer("/choices/0/delta/content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }

    fn finish_reason(&self, chunk: &Value) -> Option<String> {
        chunk.pointer("/choices/0/finish_reason").and_then(Value::as_str).map(str::to_string)
    }

    fn usage(&self, body: &Value) -> (Option<u32>, Option<u32>) {
        usage_tokens(body)
    }
}

struct CompletionsParser;

impl ResponseParser for CompletionsParser {
    fn chunk_text(&self, chunk: &Value) -> String {
        chunk.pointer("/choices/0/text").and_then(Value::as_str).unwrap_or_default().to_string()
    }

    fn finish_reason(&self, chunk: &Value) -> Option<String> {
        chunk.pointer("/choices/0/finish_reason").and_then(Value::as_str).map(str::to_string)
    }

    fn usage(&self, body: &Value) -> (Option<u32>, Option<u32>) {
        usage_tokens(body)
    }
}

/// Embeddings/rankings responses never stream; a chunk never contributes
/// text and token accounting comes solely from the final JSON body's
/// `usage` object, same shape as chat/completions.
struct NonStreamingParser;

impl ResponseParser for NonStreamingParser {
    fn chunk_text(&self, _chunk: &Value) -> String {
        String::new()
    }

    fn finish_reason(&self, _chunk: &Value) -> Option<String> {
        None
    }

    fn usage(&self, body: &Value) -> (Option<u32>, Option<u32>) {
        usage_tokens(body)
    }
}

fn usage_tokens(body: &Value) -> (Option<u32>, Option<u32>) {
    let input = body.pointer("/usage/prompt_tokens").and_then(Value::as_u64).map(|v| v as u32);
    let output = body.pointer("/usage/completion_tokens").and_then(Value::as_u64).map(|v| v as u32);
    (input, output)
}

/// One event decoded from an SSE byte stream.
#[derive(Debug, PartialEq)]
pub enum SseEvent {
    Data(Value),
    Done,
}

/// Parses one `data: ...` line (without its trailing newline) into an
/// `SseEvent`, or `None` for blank lines/comments/malformed JSON that
/// aren't part of the `data:` framing.
pub fn parse_sse_line(line: &str) -> Option<SseEvent> {
    let payload = line.strip_prefix("data:")?.trim();
    if payload == "[DONE]" {
        return Some(SseEvent::Done);
    }
    serde_json::from_str(payload).ok().map(SseEvent::Data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_parser_reads_delta_content() {
        let chunk = serde_json::json!({"choices": [{"delta": {"content": "hi"}}]});
        assert_eq!(ChatParser.chunk_text(&chunk), "hi");
    }

    #[test]
    fn completions_parser_reads_text_field() {
        let chunk = serde_json::json!({"choices": [{"text": "hi"}]});
        assert_eq!(CompletionsParser.chunk_text(&chunk), "hi");
    }

    #[test]
    fn sse_line_done_marker_is_recognized() {
        assert_eq!(parse_sse_line("data: [DONE]"), Some(SseEvent::Done));
    }

    #[test]
    fn sse_line_parses_json_payload() {
        let event = parse_sse_line(r#"data: {"choices": [{"delta": {"content": "x"}}]}"#).unwrap();
        assert_eq!(event, SseEvent::Data(serde_json::json!({"choices": [{"delta": {"content": "x"}}]})));
    }

    #[test]
    fn non_data_lines_are_ignored() {
        assert_eq!(parse_sse_line(""), None);
        assert_eq!(parse_sse_line(": keep-alive"), None);
    }

    #[test]
    fn usage_tokens_reads_prompt_and_completion_counts() {
        let body = serde_json::json!({"usage": {"prompt_tokens": 10, "completion_tokens": 20}});
        assert_eq!(usage_tokens(&body), (Some(10), Some(20)));
    }
}
