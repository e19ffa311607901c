//! Formatting and delivery of replies and typing notifications.

use async_trait::async_trait;
use log::debug;
use serde::Serialize;

use crate::chatbot::Heartbeat;
use crate::error::Result;
use crate::transport::{ChatTransport, Command, Frame};
use crate::types::BotIdentity;

use super::event::{GxsId, MessageType, PrivateMessage, RoomMessage};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ChatPayload {
    Room(RoomMessage),
    Private(PrivateMessage),
}

/// A chat payload ready to be handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub message_type: MessageType,
    pub destination_id: String,
    pub payload: ChatPayload,
}

impl OutboundMessage {
    /// STOMP SEND frame delivering this message to `destination`.
    pub fn into_frame(self, destination: &str) -> Result<Frame> {
        let body = serde_json::to_string(&self.payload)?;
        Ok(Frame::new(Command::Send)
            .header("destination", destination)
            .header("content-type", "application/json")
            .header("messageType", self.message_type.as_ref())
            .header("destinationId", self.destination_id)
            .body(body))
    }
}

/// Where a reply goes: back to a room participant or to a private peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyTarget {
    Room {
        destination_id: String,
        room_id: i64,
        /// Nickname of the participant the reply is addressed to
        recipient: String,
    },
    Private {
        destination_id: String,
    },
}

/// Emits the bot's chat traffic onto a transport.
pub struct Outbound<'a, T: ChatTransport + ?Sized> {
    transport: &'a T,
    identity: &'a BotIdentity,
}

impl<'a, T: ChatTransport + ?Sized> Outbound<'a, T> {
    pub fn new(transport: &'a T, identity: &'a BotIdentity) -> Self {
        Self {
            transport,
            identity,
        }
    }

    /// Sends `text` as a reply; room replies are prefixed with the recipient's nickname.
    pub async fn reply(&self, target: &ReplyTarget, text: &str) -> Result<()> {
        let message = match target {
            ReplyTarget::Room { recipient, .. } => {
                self.message(target, false, format!("{recipient}: {text}"))
            }
            ReplyTarget::Private { .. } => self.message(target, false, text.to_string()),
        };
        self.transport.send(message).await
    }

    pub async fn typing(&self, target: &ReplyTarget) -> Result<()> {
        debug!("Sending typing notification");
        self.transport
            .send(self.message(target, true, String::new()))
            .await
    }

    fn message(&self, target: &ReplyTarget, typing: bool, content: String) -> OutboundMessage {
        match target {
            ReplyTarget::Room {
                destination_id,
                room_id,
                ..
            } => OutboundMessage {
                message_type: if typing {
                    MessageType::ChatRoomTypingNotification
                } else {
                    MessageType::ChatRoomMessage
                },
                destination_id: destination_id.clone(),
                payload: ChatPayload::Room(RoomMessage {
                    room_id: *room_id,
                    sender_nickname: self.identity.name.clone(),
                    gxs_id: GxsId {
                        bytes: self.identity.gxs_id.clone(),
                    },
                    content,
                }),
            },
            ReplyTarget::Private { destination_id } => OutboundMessage {
                message_type: if typing {
                    MessageType::ChatTypingNotification
                } else {
                    MessageType::ChatPrivateMessage
                },
                destination_id: destination_id.clone(),
                payload: ChatPayload::Private(PrivateMessage { content }),
            },
        }
    }
}

/// Heartbeat that re-sends the typing notification of one conversation.
pub struct TypingHeartbeat<'a, T: ChatTransport + ?Sized> {
    outbound: &'a Outbound<'a, T>,
    target: &'a ReplyTarget,
}

impl<'a, T: ChatTransport + ?Sized> TypingHeartbeat<'a, T> {
    pub fn new(outbound: &'a Outbound<'a, T>, target: &'a ReplyTarget) -> Self {
        Self { outbound, target }
    }
}

#[async_trait]
impl<T: ChatTransport + ?Sized> Heartbeat for TypingHeartbeat<'_, T> {
    async fn beat(&mut self) -> Result<()> {
        self.outbound.typing(self.target).await
    }
}
