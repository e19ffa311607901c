//! Chat event payloads exchanged with the node.

mod event;
mod outbound;

pub use event::{ChatEvent, GxsId, MessageType, PrivateMessage, RoomMessage};
pub use outbound::{ChatPayload, Outbound, OutboundMessage, ReplyTarget, TypingHeartbeat};
