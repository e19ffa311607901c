use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::error::{BotError, Result};
use crate::transport::Frame;

/// Value of the `messageType` frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, AsRefStr, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    ChatRoomMessage,
    ChatPrivateMessage,
    ChatRoomTypingNotification,
    ChatTypingNotification,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GxsId {
    pub bytes: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMessage {
    pub room_id: i64,
    pub sender_nickname: String,
    pub gxs_id: GxsId,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateMessage {
    pub content: String,
}

/// An inbound chat event, classified by its message type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    Room {
        destination_id: String,
        message: RoomMessage,
    },
    Private {
        destination_id: String,
        message: PrivateMessage,
    },
    /// Any other message type, dropped by the bot
    Ignored(String),
}

impl ChatEvent {
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        let Some(message_type) = frame.get_header("messageType") else {
            return Ok(ChatEvent::Ignored(String::new()));
        };

        let kind = match message_type.parse::<MessageType>() {
            Ok(kind @ (MessageType::ChatRoomMessage | MessageType::ChatPrivateMessage)) => kind,
            _ => return Ok(ChatEvent::Ignored(message_type.to_string())),
        };

        let destination_id = frame
            .get_header("destinationId")
            .ok_or_else(|| BotError::Event(format!("{message_type} without destinationId")))?
            .to_string();

        let event = match kind {
            MessageType::ChatRoomMessage => ChatEvent::Room {
                destination_id,
                message: serde_json::from_str(&frame.body)?,
            },
            _ => ChatEvent::Private {
                destination_id,
                message: serde_json::from_str(&frame.body)?,
            },
        };
        Ok(event)
    }
}
