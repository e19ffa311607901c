//! Streams one completion while keeping the typing indicator alive.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use log::debug;
use tokio::time::Instant;

use crate::completion::{CompletionBackend, CompletionRequest, StreamChunk};
use crate::error::{BotError, Result};

/// Longest time between two heartbeats while the backend is generating.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// Side effect signalling that a reply is still being written.
#[async_trait]
pub trait Heartbeat: Send {
    async fn beat(&mut self) -> Result<()>;
}

/// State of a reply being assembled.
struct StreamingSession<'a, H: Heartbeat + ?Sized> {
    output: String,
    started: Instant,
    last_beat: Instant,
    heartbeat: &'a mut H,
}

impl<'a, H: Heartbeat + ?Sized> StreamingSession<'a, H> {
    async fn start(heartbeat: &'a mut H) -> Result<Self> {
        heartbeat.beat().await?;
        let now = Instant::now();
        Ok(Self {
            output: String::new(),
            started: now,
            last_beat: now,
            heartbeat,
        })
    }

    async fn keep_alive(&mut self) -> Result<()> {
        if self.last_beat.elapsed() >= HEARTBEAT_INTERVAL {
            self.heartbeat.beat().await?;
            self.last_beat = Instant::now();
        }
        Ok(())
    }
}

/// Runs one streamed exchange with `backend` and returns the assembled reply.
///
/// The heartbeat fires once before the request is sent, then after any chunk
/// that arrives at least [`HEARTBEAT_INTERVAL`] after the previous beat.
pub async fn stream_reply<B, H>(
    backend: &B,
    request: &CompletionRequest,
    assistant_name: &str,
    heartbeat: &mut H,
) -> Result<String>
where
    B: CompletionBackend + ?Sized,
    H: Heartbeat + ?Sized,
{
    let mut session = StreamingSession::start(heartbeat).await?;
    let mut chunks = backend.stream(request).await?;

    while let Some(chunk) = chunks.next().await {
        match chunk? {
            StreamChunk::Delta(Some(text)) => session.output.push_str(&text),
            StreamChunk::Delta(None) => {}
            StreamChunk::Done => break,
        }
        session.keep_alive().await?;
    }

    debug!(
        "Completion of {} characters assembled in {:?}",
        session.output.len(),
        session.started.elapsed()
    );

    let reply = strip_self_name(&session.output, assistant_name);
    if reply.trim().is_empty() {
        return Err(BotError::BackendStream(
            "stream ended without any reply text".to_string(),
        ));
    }
    Ok(reply.to_string())
}

/// Removes one leading `"<name>: "` the model sometimes writes in front of its reply.
#[must_use]
pub fn strip_self_name<'a>(reply: &'a str, assistant_name: &str) -> &'a str {
    reply
        .strip_prefix(assistant_name)
        .and_then(|rest| rest.strip_prefix(": "))
        .unwrap_or(reply)
}
