//! The per-turn HTTP request pipeline (spec §4.6 steps 3-4, §6 "Wire
//! protocol (outbound)"): builds the endpoint body, sends it, captures
//! `start_ns`/`first_chunk_ns`/per-chunk `receive_ns`/`end_ns`, and honors
//! mid-stream cancellation. Grounded on the teacher's reqwest client usage
//! (`ferroid-tonic/src/server.rs`'s request timing) generalized from gRPC
//! unary calls to a streaming HTTP POST.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures::StreamExt;
use tokio::time::Instant;

use aiperf_core::config::EndpointConfig;
use aiperf_core::model::{Credit, ParsedResponseRecord, RequestSummary, ResponseChunk, Turn};

use crate::builders::{self, RequestBodyBuilder};
use crate::parsers::{self, ResponseParser, SseEvent};

pub struct RequestPipeline {
    client: reqwest::Client,
    endpoint: EndpointConfig,
    builder: Box<dyn RequestBodyBuilder>,
    parser: Box<dyn ResponseParser>,
}

impl RequestPipeline {
    pub fn new(endpoint: EndpointConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs_f64(endpoint.timeout_secs))
            .build()
            .unwrap_or_default();
        let builder = builders::builder_for(endpoint.endpoint_type);
        let parser = parsers::parser_for(endpoint.endpoint_type);
        Self {
            client,
            endpoint,
            builder,
            parser,
        }
    }

    /// Sends one turn's request and returns its parsed record. Never
    /// returns `Err`: transport/HTTP/parse failures are captured into
    /// `ParsedResponseRecord::error` per spec §4.6's failure semantics.
    pub async fn send_turn(&self, model: &str, conversation_id: &str, turn_index: usize, turn: &Turn, credit: &Credit) -> ParsedResponseRecord {
        let body = self.builder.build(model, turn, self.endpoint.streaming);
        let sent_payload_summary = summarize_payload(&body);
        let start_ns = now_ns();

        let mut request = self.client.post(self.endpoint.url.as_str()).json(&body);
        if let Some(api_key) = &self.endpoint.api_key {
            request = request.bearer_auth(api_key);
        }

        let outcome = if self.endpoint.streaming {
            self.send_streaming(request, credit).await
        } else {
            self.send_unary(request).await
        };

        let end_ns = now_ns();
        let request_summary = RequestSummary {
            conversation_id: conversation_id.to_string(),
            turn_index,
            model: model.to_string(),
            start_ns,
            end_ns,
            sent_payload_summary,
        };

        match outcome {
            Ok((responses, input_token_count, output_token_count)) => ParsedResponseRecord {
                request: request_summary,
                responses,
                input_token_count,
                output_token_count,
                error: None,
                is_warmup: credit.is_warmup,
            },
            Err(error) => ParsedResponseRecord {
                request: request_summary,
                responses: Vec::new(),
                input_token_count: None,
                output_token_count: None,
                error: Some(error),
                is_warmup: credit.is_warmup,
            },
        }
    }

    async fn send_unary(&self, request: reqwest::RequestBuilder) -> Result<(Vec<ResponseChunk>, Option<u32>, Option<u32>), String> {
        let response = request.send().await.map_err(|err| err.to_string())?;
        let status = response.status();
        let body: serde_json::Value = response.json().await.map_err(|err| err.to_string())?;
        if !status.is_success() {
            return Err(format!("http {status}: {body}"));
        }
        let (input, output) = self.parser.usage(&body);
        let chunk = ResponseChunk {
            receive_ns: now_ns(),
            chunk_text: self.parser.chunk_text(&body),
            delta_tokens: output,
            finish_reason: None,
        };
        Ok((vec![chunk], input, output))
    }

    async fn send_streaming(&self, request: reqwest::RequestBuilder, credit: &Credit) -> Result<(Vec<ResponseChunk>, Option<u32>, Option<u32>), String> {
        let response = request.send().await.map_err(|err| err.to_string())?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("http {status}: {body}"));
        }

        let mut responses = Vec::new();
        let mut buffer = String::new();
        let mut output_tokens = 0u32;
        let mut first_chunk_instant: Option<Instant> = None;
        let mut stream = response.bytes_stream();

        while let Some(next) = stream.next().await {
            let bytes = next.map_err(|err| err.to_string())?;
            buffer.push_str(&String::from_utf8_lossy(&bytes));

            while let Some(newline_at) = buffer.find('\n') {
                let line = buffer[..newline_at].trim_end_matches('\r').to_string();
                buffer.drain(..=newline_at);
                let Some(event) = parsers::parse_sse_line(&line) else { continue };
                match event {
                    SseEvent::Done => return Ok((responses, None, Some(output_tokens))),
                    SseEvent::Data(chunk_json) => {
                        let text = self.parser.chunk_text(&chunk_json);
                        if !text.is_empty() {
                            output_tokens += 1;
                        }
                        let receive_instant = Instant::now();
                        if first_chunk_instant.is_none() {
                            first_chunk_instant = Some(receive_instant);
                        }
                        let contributes = !text.is_empty();
                        responses.push(ResponseChunk {
                            receive_ns: now_ns(),
                            chunk_text: text,
                            delta_tokens: contributes.then_some(1),
                            finish_reason: self.parser.finish_reason(&chunk_json),
                        });

                        if credit.should_cancel {
                            if let (Some(first), Some(cancel_after_ns)) = (first_chunk_instant, credit.cancel_after_ns) {
                                if first.elapsed() >= Duration::from_nanos(cancel_after_ns) {
                                    return Err("cancelled after first byte".to_string());
                                }
                            }
                        }
                    }
                }
            }
        }

        Ok((responses, None, Some(output_tokens)))
    }
}

fn summarize_payload(body: &serde_json::Value) -> String {
    let rendered = body.to_string();
    if rendered.len() <= 256 {
        return rendered;
    }
    // serde_json emits non-ASCII UTF-8 unescaped, so byte offset 256 may
    // land mid-codepoint (multilingual/multimodal prompts are valid input
    // per §3); back off to the nearest char boundary before slicing.
    let mut boundary = 256;
    while !rendered.is_char_boundary(boundary) {
        boundary -= 1;
    }
    format!("{}...", &rendered[..boundary])
}

fn now_ns() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summarize_payload_truncates_long_bodies() {
        let body = serde_json::json!({"text": "x".repeat(500)});
        assert!(summarize_payload(&body).ends_with("..."));
    }

    #[test]
    fn summarize_payload_passes_short_bodies_through() {
        let body = serde_json::json!({"a": 1});
        assert_eq!(summarize_payload(&body), r#"{"a":1}"#);
    }

    #[test]
    fn summarize_payload_does_not_split_a_multibyte_codepoint() {
        // "文" is 3 bytes in UTF-8; repeated enough times the naive byte-256
        // cut lands mid-codepoint. Must not panic, and must stay valid UTF-8.
        let body = serde_json::json!({"text": "文".repeat(200)});
        let summary = summarize_payload(&body);
        assert!(summary.ends_with("..."));
    }
}
