//! OpenAI-compatible streaming chat completion client.

use std::fmt::Display;

use async_trait::async_trait;
use futures::{
    Stream, StreamExt, future,
    stream::{self, BoxStream},
};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::config::OpenAiConfig;
use crate::error::{BotError, Result};
use crate::types::MessageRole;

/// Data payload the backend sends as its final event.
const DONE_MARKER: &str = "[DONE]";
const DATA_FIELD: &str = "data:";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub temperature: f64,
    pub stream: bool,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// One decoded event of a streamed completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamChunk {
    /// Incremental text, absent on role-only or finish chunks
    Delta(Option<String>),
    /// Normal end of the stream
    Done,
}

#[derive(Debug, Deserialize)]
struct ChunkPayload {
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

impl StreamChunk {
    /// Decodes the payload of one `data:` line.
    pub fn decode(data: &str) -> Result<Self> {
        let data = data.trim();
        if data == DONE_MARKER {
            return Ok(StreamChunk::Done);
        }
        if data.is_empty() {
            return Ok(StreamChunk::Delta(None));
        }

        let payload: ChunkPayload = serde_json::from_str(data)
            .map_err(|e| BotError::BackendStream(format!("undecodable chunk '{data}': {e}")))?;

        let text = payload
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta)
            .and_then(|delta| delta.content);

        Ok(StreamChunk::Delta(text))
    }
}

pub type ChunkStream = BoxStream<'static, Result<StreamChunk>>;

/// Splits a streamed response body into the payloads of its `data:` lines.
///
/// Each line is handled on its own, whether or not events are separated by
/// blank lines. Other fields and comments are skipped.
#[derive(Debug, Default)]
struct DataLines {
    buffer: Vec<u8>,
}

impl DataLines {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);

        let mut payloads = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            payloads.extend(data_payload(&line));
        }
        payloads
    }

    /// Payload of a last line the body didn't terminate.
    fn finish(&mut self) -> Option<String> {
        let line = std::mem::take(&mut self.buffer);
        data_payload(&line)
    }
}

fn data_payload(line: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(line);
    let data = line.trim_end_matches(['\n', '\r']).strip_prefix(DATA_FIELD)?;
    Some(data.strip_prefix(' ').unwrap_or(data).to_string())
}

/// Decodes a streamed completion body into chunks, one per `data:` line.
pub fn decode_body<S, B, E>(body: S) -> ChunkStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    body.map(Some)
        .chain(stream::once(future::ready(None)))
        .scan(DataLines::default(), |lines, item| {
            let decoded: Vec<Result<StreamChunk>> = match item {
                Some(Ok(bytes)) => lines
                    .push(bytes.as_ref())
                    .iter()
                    .map(|data| StreamChunk::decode(data))
                    .collect(),
                Some(Err(e)) => vec![Err(BotError::BackendStream(e.to_string()))],
                None => lines
                    .finish()
                    .iter()
                    .map(|data| StreamChunk::decode(data))
                    .collect(),
            };
            future::ready(Some(stream::iter(decoded)))
        })
        .flatten()
        .boxed()
}

/// Anything that can answer a completion request with a stream of chunks.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn stream(&self, request: &CompletionRequest) -> Result<ChunkStream>;
}

pub struct OpenAiClient {
    client: reqwest::Client,
    api_url: String,
}

impl OpenAiClient {
    #[must_use]
    pub fn new(config: &OpenAiConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: config.api_url.clone(),
        }
    }
}

#[async_trait]
impl CompletionBackend for OpenAiClient {
    async fn stream(&self, request: &CompletionRequest) -> Result<ChunkStream> {
        debug!(
            "Sending streaming request to {} with {} messages",
            self.api_url,
            request.messages.len()
        );

        let response = self
            .client
            .post(&self.api_url)
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let message = response
                .text()
                .await
                .unwrap_or_else(|e| format!("Failed to read error response: {e}"));
            warn!("Completion backend answered {status}: {message}");
            return Err(BotError::Backend { status, message });
        }

        Ok(decode_body(response.bytes_stream()))
    }
}
