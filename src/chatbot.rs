//! AI chatbot module - decides when the bot is addressed and streams its replies.

mod cache;
mod dispatcher;
mod mention;
mod prompt;
mod streaming;

pub use cache::{ContextCache, ConversationHistory};
pub use dispatcher::Dispatcher;
pub use mention::{is_self_echo, parse_mention};
pub use prompt::{build_request, render_prompt};
pub use streaming::{HEARTBEAT_INTERVAL, Heartbeat, stream_reply, strip_self_name};
