use std::{pin::Pin, time::Duration};

use async_stream::try_stream;
use color_eyre::{Result, eyre};
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::Deserialize;

pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

#[derive(Debug, Clone, Copy, Default)]
pub struct ChatUsage {
	pub prompt_tokens: u32,
	pub completion_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct ChatCompletion {
	pub text: String,
	pub usage: ChatUsage,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
	choices: Vec<ChatChoice>,
	#[serde(default)]
	usage: Option<UsagePayload>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
	message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
	#[serde(default)]
	content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsagePayload {
	#[serde(default)]
	prompt_tokens: u32,
	#[serde(default)]
	completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
	choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
	delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
	#[serde(default)]
	content: Option<String>,
}

pub async fn complete(
	cfg: &griot_config::LlmProviderConfig,
	system: &str,
	user: &str,
) -> Result<ChatCompletion> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = serde_json::json!({
		"model": cfg.model,
		"temperature": cfg.temperature,
		"max_tokens": cfg.max_tokens,
		"messages": [
			{ "role": "system", "content": system },
			{ "role": "user", "content": user },
		],
	});
	let res = client
		.post(url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let response: ChatResponse = res.error_for_status()?.json().await?;

	parse_completion(response)
}

/// Streams completion deltas as they arrive on the SSE response. The stream
/// ends on the provider's terminal frame; transport errors surface as stream
/// items.
pub async fn stream(
	cfg: &griot_config::LlmProviderConfig,
	system: &str,
	user: &str,
) -> Result<TextStream> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = serde_json::json!({
		"model": cfg.model,
		"temperature": cfg.temperature,
		"max_tokens": cfg.max_tokens,
		"stream": true,
		"messages": [
			{ "role": "system", "content": system },
			{ "role": "user", "content": user },
		],
	});
	let res = client
		.post(url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let mut bytes = res.error_for_status()?.bytes_stream();

	Ok(Box::pin(try_stream! {
		let mut buffer = String::new();

		while let Some(chunk) = bytes.next().await {
			let chunk = chunk?;

			buffer.push_str(std::str::from_utf8(&chunk)?);

			while let Some(pos) = buffer.find('\n') {
				let line = buffer[..pos].trim().to_string();

				buffer.drain(..=pos);

				let Some(data) = line.strip_prefix("data:") else {
					continue;
				};
				let data = data.trim();

				if data == "[DONE]" {
					return;
				}
				if let Some(delta) = parse_stream_delta(data) {
					yield delta;
				}
			}
		}
	}))
}

fn parse_completion(response: ChatResponse) -> Result<ChatCompletion> {
	let text = response
		.choices
		.into_iter()
		.next()
		.and_then(|choice| choice.message.content)
		.ok_or_else(|| eyre::eyre!("Chat response is missing message content."))?;
	let usage = response
		.usage
		.map(|usage| ChatUsage {
			prompt_tokens: usage.prompt_tokens,
			completion_tokens: usage.completion_tokens,
		})
		.unwrap_or_default();

	Ok(ChatCompletion { text, usage })
}

fn parse_stream_delta(data: &str) -> Option<String> {
	let chunk: StreamChunk = serde_json::from_str(data).ok()?;

	chunk.choices.into_iter().next().and_then(|choice| choice.delta.content)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_completion_text_and_usage() {
		let response: ChatResponse = serde_json::from_value(serde_json::json!({
			"choices": [ { "message": { "content": "Dial *86." } } ],
			"usage": { "prompt_tokens": 42, "completion_tokens": 7 },
		}))
		.expect("deserialize failed");
		let completion = parse_completion(response).expect("parse failed");

		assert_eq!(completion.text, "Dial *86.");
		assert_eq!(completion.usage.prompt_tokens, 42);
		assert_eq!(completion.usage.completion_tokens, 7);
	}

	#[test]
	fn missing_content_is_an_error() {
		let response: ChatResponse =
			serde_json::from_value(serde_json::json!({ "choices": [] }))
				.expect("deserialize failed");

		assert!(parse_completion(response).is_err());
	}

	#[test]
	fn parses_stream_delta_frames() {
		let delta = parse_stream_delta(
			r#"{"choices":[{"delta":{"content":"Dial"}}]}"#,
		);

		assert_eq!(delta.as_deref(), Some("Dial"));
		assert_eq!(parse_stream_delta(r#"{"choices":[{"delta":{}}]}"#), None);
		assert_eq!(parse_stream_delta("not json"), None);
	}
}
