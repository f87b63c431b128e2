//! Endpoint-specific request body builders (spec §6 "Wire protocol
//! (outbound)"), grounded on `endpoint/chat.py`/`completions.py`/
//! `embeddings.py`/`rankings.py`'s OpenAI-compatible payload shapes. Each
//! builder turns a [`Turn`]'s texts/images/audios plus pass-through
//! `optional_data` into the JSON body the worker POSTs.

use serde_json::{Map, Value, json};

use aiperf_core::config::EndpointType;
use aiperf_core::model::Turn;

pub trait RequestBodyBuilder: Send + Sync {
    fn build(&self, model: &str, turn: &Turn, streaming: bool) -> Value;
}

pub fn builder_for(endpoint_type: EndpointType) -> Box<dyn RequestBodyBuilder> {
    match endpoint_type {
        EndpointType::Chat => Box::new(ChatBuilder),
        EndpointType::Completions => Box::new(CompletionsBuilder),
        EndpointType::Embeddings => Box::new(EmbeddingsBuilder),
        EndpointType::Rankings => Box::new(RankingsBuilder),
    }
}

pub struct ChatBuilder;

impl RequestBodyBuilder for ChatBuilder {
    fn build(&self, model: &str, turn: &Turn, streaming: bool) -> Value {
        let content = if turn.images.is_empty() && turn.audios.is_empty() {
            Value::String(turn.texts.join(" "))
        } else {
            let mut parts: Vec<Value> = turn
                .texts
                .iter()
                .map(|text| json!({"type": "text", "text": text}))
                .collect();
            parts.extend(
                turn.images
                    .iter()
                    .map(|url| json!({"type": "image_url", "image_url": {"url": url}})),
            );
            parts.extend(
                turn.audios
                    .iter()
                    .map(|url| json!({"type": "input_audio", "input_audio": {"data": url}})),
            );
            Value::Array(parts)
        };

        let mut body = json!({
            "model": model,
            "messages": [{"role": "user", "content": content}],
            "stream": streaming,
        });
        merge_common_fields(&mut body, turn);
        body
    }
}

pub struct CompletionsBuilder;

impl RequestBodyBuilder for CompletionsBuilder {
    fn build(&self, model: &str, turn: &Turn, streaming: bool) -> Value {
        let mut body = json!({
            "model": model,
            "prompt": turn.texts.join(" "),
            "stream": streaming,
        });
        merge_common_fields(&mut body, turn);
        body
    }
}

pub struct EmbeddingsBuilder;

impl RequestBodyBuilder for EmbeddingsBuilder {
    fn build(&self, model: &str, turn: &Turn, _streaming: bool) -> Value {
        let input = if turn.texts.len() == 1 {
            Value::String(turn.texts[0].clone())
        } else {
            Value::Array(turn.texts.iter().cloned().map(Value::String).collect())
        };
        let mut body = json!({"model": model, "input": input});
        merge_optional_data(&mut body, turn);
        body
    }
}

/// Rankings requests carry query/passage pairs in `optional_data` (custom
/// dataset rows shaped like `{"texts": [{"name": "query", ...}]}`) rather
/// than the plain `texts` array the other endpoint types use.
pub struct RankingsBuilder;

impl RequestBodyBuilder for RankingsBuilder {
    fn build(&self, model: &str, turn: &Turn, _streaming: bool) -> Value {
        let mut body = json!({"model": model});
        merge_optional_data(&mut body, turn);
        if !turn.texts.is_empty() {
            if let Value::Object(map) = &mut body {
                map.entry("query").or_insert_with(|| Value::String(turn.texts[0].clone()));
            }
        }
        body
    }
}

fn merge_common_fields(body: &mut Value, turn: &Turn) {
    if let Some(max_tokens) = turn.max_tokens {
        if let Value::Object(map) = body {
            map.insert("max_tokens".to_string(), json!(max_tokens));
        }
    }
    merge_optional_data(body, turn);
}

fn merge_optional_data(body: &mut Value, turn: &Turn) {
    if turn.optional_data.is_empty() {
        return;
    }
    if let Value::Object(map) = body {
        for (key, value) in &turn.optional_data {
            map.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(texts: Vec<&str>) -> Turn {
        Turn {
            texts: texts.into_iter().map(String::from).collect(),
            ..Turn::default()
        }
    }

    #[test]
    fn chat_builder_joins_text_only_turns_into_a_string() {
        let body = ChatBuilder.build("my-model", &turn(vec!["hello", "world"]), true);
        assert_eq!(body["messages"][0]["content"], json!("hello world"));
        assert_eq!(body["stream"], json!(true));
    }

    #[test]
    fn chat_builder_uses_content_parts_when_images_present() {
        let mut t = turn(vec!["describe this"]);
        t.images.push("data:image/png;base64,AAA".to_string());
        let body = ChatBuilder.build("my-model", &t, false);
        let parts = body["messages"][0]["content"].as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1]["type"], json!("image_url"));
    }

    #[test]
    fn embeddings_builder_uses_a_single_string_for_one_text() {
        let body = EmbeddingsBuilder.build("embed-model", &turn(vec!["only one"]), false);
        assert_eq!(body["input"], json!("only one"));
    }

    #[test]
    fn max_tokens_carries_through_to_chat_body() {
        let mut t = turn(vec!["hi"]);
        t.max_tokens = Some(128);
        let body = ChatBuilder.build("m", &t, true);
        assert_eq!(body["max_tokens"], json!(128));
    }
}
