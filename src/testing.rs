//! In-memory doubles for the backend, the transport and the heartbeat, plus a
//! one-shot HTTP server for exercising real clients.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, stream};
use reqwest::StatusCode;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::Instant;

use crate::chat::OutboundMessage;
use crate::chatbot::Heartbeat;
use crate::completion::{ChunkStream, CompletionBackend, CompletionRequest, StreamChunk};
use crate::error::{BotError, Result};
use crate::transport::ChatTransport;

/// What the fake backend answers to one request.
pub(crate) enum Script {
    Chunks(Vec<Result<StreamChunk>>),
    Status(StatusCode),
}

pub(crate) struct FakeBackend {
    scripts: Mutex<VecDeque<Script>>,
    pace: Duration,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl FakeBackend {
    pub(crate) fn scripted(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            pace: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn replying(chunks: Vec<StreamChunk>) -> Self {
        Self::with_results(chunks.into_iter().map(Ok).collect())
    }

    pub(crate) fn with_results(results: Vec<Result<StreamChunk>>) -> Self {
        Self::scripted(vec![Script::Chunks(results)])
    }

    /// Every chunk arrives `pace` after the previous one.
    pub(crate) fn paced(chunks: Vec<StreamChunk>, pace: Duration) -> Self {
        Self {
            pace,
            ..Self::replying(chunks)
        }
    }

    pub(crate) fn failing() -> Self {
        Self::scripted(vec![Script::Status(StatusCode::INTERNAL_SERVER_ERROR)])
    }

    pub(crate) fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionBackend for FakeBackend {
    async fn stream(&self, request: &CompletionRequest) -> Result<ChunkStream> {
        self.requests.lock().unwrap().push(request.clone());

        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Script::Chunks(vec![Ok(StreamChunk::Done)]));

        match script {
            Script::Status(status) => Err(BotError::Backend {
                status,
                message: "scripted failure".to_string(),
            }),
            Script::Chunks(results) => {
                let pace = self.pace;
                Ok(stream::iter(results)
                    .then(move |chunk| async move {
                        if !pace.is_zero() {
                            tokio::time::sleep(pace).await;
                        }
                        chunk
                    })
                    .boxed())
            }
        }
    }
}

#[derive(Default)]
pub(crate) struct RecordingTransport {
    sent: Mutex<Vec<OutboundMessage>>,
    fail: bool,
}

impl RecordingTransport {
    pub(crate) fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub(crate) fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn send(&self, message: OutboundMessage) -> Result<()> {
        if self.fail {
            return Err(BotError::Transport("connection lost".to_string()));
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct RecordingHeartbeat {
    pub(crate) beats: Vec<Instant>,
}

#[async_trait]
impl Heartbeat for RecordingHeartbeat {
    async fn beat(&mut self) -> Result<()> {
        self.beats.push(Instant::now());
        Ok(())
    }
}

/// Answers the first HTTP request on a local port with the raw `response`,
/// then closes the connection. Returns a completion URL on that port.
pub(crate) async fn serve_once(response: String) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        read_request(&mut socket).await;
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.unwrap();
    });

    format!("http://{addr}/v1/chat/completions")
}

async fn read_request(socket: &mut TcpStream) {
    let mut request = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = socket.read(&mut buf).await.unwrap();
        if n == 0 {
            return;
        }
        request.extend_from_slice(&buf[..n]);

        let Some(head_end) = request.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&request[..head_end]).to_lowercase();
        let body_len = head
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|value| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        if request.len() >= head_end + 4 + body_len {
            return;
        }
    }
}
