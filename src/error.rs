use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BotError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read configuration file '{path}': {source}")]
    ConfigFile {
        path: String,
        source: std::io::Error,
    },

    #[error("Malformed configuration file '{path}': {source}")]
    ConfigParse {
        path: String,
        source: serde_json::Error,
    },

    #[error("Xeres API error ({status}) during {operation}: {message}")]
    ControlApi {
        operation: &'static str,
        status: StatusCode,
        message: String,
    },

    #[error("Completion backend error ({status}): {message}")]
    Backend { status: StatusCode, message: String },

    #[error("Completion stream error: {0}")]
    BackendStream(String),

    #[error("Chat transport error: {0}")]
    Transport(String),

    #[error("WebSocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),

    #[error("Malformed STOMP frame: {0}")]
    Frame(String),

    #[error("Malformed chat event: {0}")]
    Event(String),

    #[error("HTTP request error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl From<tokio_tungstenite::tungstenite::Error> for BotError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        BotError::WebSocket(Box::new(err))
    }
}

impl BotError {
    /// Whether this error only aborts the exchange it happened in.
    ///
    /// Backend failures and malformed inbound payloads leave the bridge ready
    /// for the next event. Everything else (transport, setup) ends the run.
    #[must_use]
    pub fn is_exchange_failure(&self) -> bool {
        matches!(
            self,
            BotError::Backend { .. }
                | BotError::BackendStream(_)
                | BotError::Reqwest(_)
                | BotError::Json(_)
                | BotError::Event(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, BotError>;
