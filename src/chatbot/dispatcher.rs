//! Entry point for inbound chat events.

use log::{debug, error, info, warn};

use crate::chat::{ChatEvent, Outbound, ReplyTarget, RoomMessage, TypingHeartbeat};
use crate::completion::CompletionBackend;
use crate::config::Config;
use crate::error::Result;
use crate::transport::{ChatTransport, Frame};
use crate::types::{BotIdentity, ConversationKey, MessageRole};

use super::cache::ContextCache;
use super::mention::{is_self_echo, parse_mention};
use super::prompt::{build_request, render_prompt};
use super::streaming::stream_reply;

/// One message the bot has decided to answer.
struct Addressed<'a> {
    key: ConversationKey,
    user_name: &'a str,
    content: &'a str,
    target: ReplyTarget,
}

/// Routes chat events to the reply pipeline.
///
/// Events are processed one at a time; the context cache is the only state kept
/// between them.
pub struct Dispatcher<'a, B, T> {
    config: &'a Config,
    identity: BotIdentity,
    cache: ContextCache,
    backend: B,
    transport: T,
}

impl<'a, B, T> Dispatcher<'a, B, T>
where
    B: CompletionBackend,
    T: ChatTransport,
{
    pub fn new(config: &'a Config, identity: BotIdentity, backend: B, transport: T) -> Self {
        Self {
            config,
            identity,
            cache: ContextCache::from_config(&config.context),
            backend,
            transport,
        }
    }

    pub fn cache(&self) -> &ContextCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut ContextCache {
        &mut self.cache
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Handles one MESSAGE frame. Only transport failures are returned.
    pub async fn handle_frame(&mut self, frame: &Frame) -> Result<()> {
        match ChatEvent::from_frame(frame) {
            Ok(event) => self.dispatch(event).await,
            Err(e) => {
                warn!("Dropping malformed chat event: {e}");
                Ok(())
            }
        }
    }

    pub async fn dispatch(&mut self, event: ChatEvent) -> Result<()> {
        match event {
            ChatEvent::Room {
                destination_id,
                message,
            } => self.handle_room_message(destination_id, &message).await,
            ChatEvent::Private {
                destination_id,
                message,
            } => {
                let addressed = Addressed {
                    key: ConversationKey::new(destination_id.as_str()),
                    user_name: &destination_id,
                    content: &message.content,
                    target: ReplyTarget::Private {
                        destination_id: destination_id.clone(),
                    },
                };
                self.converse(addressed).await
            }
            ChatEvent::Ignored(kind) => {
                debug!("Ignoring chat event of type '{kind}'");
                Ok(())
            }
        }
    }

    async fn handle_room_message(
        &mut self,
        destination_id: String,
        message: &RoomMessage,
    ) -> Result<()> {
        // Everything we say in a room is echoed back to us.
        if is_self_echo(&message.gxs_id.bytes, &self.identity) {
            return Ok(());
        }

        let Some(content) = parse_mention(&message.content, &self.identity.name) else {
            return Ok(());
        };

        let addressed = Addressed {
            key: ConversationKey::new(message.gxs_id.bytes.as_str()),
            user_name: &message.sender_nickname,
            content,
            target: ReplyTarget::Room {
                destination_id,
                room_id: message.room_id,
                recipient: message.sender_nickname.clone(),
            },
        };
        self.converse(addressed).await
    }

    async fn converse(&mut self, addressed: Addressed<'_>) -> Result<()> {
        let outbound = Outbound::new(&self.transport, &self.identity);
        let assistant = self.identity.name.as_str();

        info!("<{}> {}: {}", addressed.user_name, assistant, addressed.content);

        let history = self
            .cache
            .append(&addressed.key, MessageRole::User, addressed.content);
        let system_prompt =
            render_prompt(&self.config.openai.prompt, assistant, addressed.user_name);
        let request = build_request(&self.config.openai, system_prompt, history);

        let mut heartbeat = TypingHeartbeat::new(&outbound, &addressed.target);
        let reply = match stream_reply(&self.backend, &request, assistant, &mut heartbeat).await {
            Ok(reply) => reply,
            Err(e) if e.is_exchange_failure() => {
                error!(
                    "Error processing message from {}: {}",
                    addressed.user_name, e
                );
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        info!("<{}> {}: {}", assistant, addressed.user_name, reply);

        self.cache
            .append(&addressed.key, MessageRole::Assistant, reply.as_str());
        outbound.reply(&addressed.target, &reply).await
    }
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;

    use super::*;
    use crate::chat::{ChatPayload, GxsId, MessageType, PrivateMessage};
    use crate::completion::StreamChunk;
    use crate::config::tests::sample;
    use crate::error::BotError;
    use crate::testing::{FakeBackend, RecordingTransport, Script};
    use crate::transport::Command;

    const BOT_GXS: &str = "b0t";

    fn identity() -> BotIdentity {
        BotIdentity {
            name: "Bot".to_string(),
            gxs_id: BOT_GXS.to_string(),
        }
    }

    fn room_event(sender_gxs: &str, content: &str) -> ChatEvent {
        ChatEvent::Room {
            destination_id: "dest".to_string(),
            message: RoomMessage {
                room_id: 77,
                sender_nickname: "Alice".to_string(),
                gxs_id: GxsId {
                    bytes: sender_gxs.to_string(),
                },
                content: content.to_string(),
            },
        }
    }

    fn private_event(content: &str) -> ChatEvent {
        ChatEvent::Private {
            destination_id: "peer-location".to_string(),
            message: PrivateMessage {
                content: content.to_string(),
            },
        }
    }

    fn reply(text: &str) -> Script {
        Script::Chunks(vec![
            Ok(StreamChunk::Delta(Some(text.to_string()))),
            Ok(StreamChunk::Done),
        ])
    }

    fn kinds(transport: &RecordingTransport) -> Vec<MessageType> {
        transport
            .sent()
            .iter()
            .map(|message| message.message_type)
            .collect()
    }

    #[tokio::test]
    async fn addressed_room_message_gets_a_reply() {
        let config = sample();
        let backend = FakeBackend::scripted(vec![reply("It is noon.")]);
        let mut dispatcher =
            Dispatcher::new(&config, identity(), backend, RecordingTransport::default());
        let alice = ConversationKey::new("alice-gxs");

        assert!(dispatcher.cache_mut().get_or_create(&alice).is_empty());

        dispatcher
            .dispatch(room_event("alice-gxs", "@Bot: what time is it?"))
            .await
            .unwrap();

        let requests = dispatcher.backend().requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].messages.len(), 2);
        assert_eq!(requests[0].messages[0].role, MessageRole::System);
        assert_eq!(
            requests[0].messages[0].content,
            "You are Bot, chatting with Alice."
        );
        assert_eq!(requests[0].messages[1].role, MessageRole::User);
        assert_eq!(requests[0].messages[1].content, "what time is it?");

        let sent = dispatcher.transport().sent();
        assert_eq!(
            kinds(dispatcher.transport()),
            vec![
                MessageType::ChatRoomTypingNotification,
                MessageType::ChatRoomMessage
            ]
        );
        let ChatPayload::Room(room_reply) = &sent[1].payload else {
            panic!("expected a room payload");
        };
        assert_eq!(room_reply.room_id, 77);
        assert_eq!(room_reply.content, "Alice: It is noon.");
        assert_eq!(sent[1].destination_id, "dest");

        assert_eq!(dispatcher.cache_mut().get_or_create(&alice).len(), 2);
    }

    #[tokio::test]
    async fn own_room_messages_are_dropped() {
        let config = sample();
        let mut dispatcher = Dispatcher::new(
            &config,
            identity(),
            FakeBackend::scripted(vec![reply("never")]),
            RecordingTransport::default(),
        );

        dispatcher
            .dispatch(room_event(BOT_GXS, "@Bot: talking to myself"))
            .await
            .unwrap();

        assert!(dispatcher.transport().sent().is_empty());
        assert!(dispatcher.backend().requests().is_empty());
        assert!(dispatcher.cache().is_empty());
    }

    #[tokio::test]
    async fn unaddressed_room_messages_are_dropped() {
        let config = sample();
        let mut dispatcher = Dispatcher::new(
            &config,
            identity(),
            FakeBackend::scripted(vec![reply("never")]),
            RecordingTransport::default(),
        );

        dispatcher
            .dispatch(room_event("alice-gxs", "hello Bot"))
            .await
            .unwrap();

        assert!(dispatcher.transport().sent().is_empty());
        assert!(dispatcher.backend().requests().is_empty());
    }

    #[tokio::test]
    async fn private_messages_are_always_answered() {
        let config = sample();
        let mut dispatcher = Dispatcher::new(
            &config,
            identity(),
            FakeBackend::scripted(vec![reply("Bot: Hi!"), reply("Fine.")]),
            RecordingTransport::default(),
        );

        dispatcher.dispatch(private_event("hello")).await.unwrap();
        dispatcher.dispatch(private_event("how are you?")).await.unwrap();

        let requests = dispatcher.backend().requests();
        assert_eq!(requests[1].messages.len(), 4);
        assert_eq!(requests[1].messages[2].content, "Hi!");
        assert_eq!(
            requests[1].messages[0].content,
            "You are Bot, chatting with peer-location."
        );

        let sent = dispatcher.transport().sent();
        assert_eq!(
            kinds(dispatcher.transport()),
            vec![
                MessageType::ChatTypingNotification,
                MessageType::ChatPrivateMessage,
                MessageType::ChatTypingNotification,
                MessageType::ChatPrivateMessage,
            ]
        );
        assert_eq!(
            sent[1].payload,
            ChatPayload::Private(PrivateMessage {
                content: "Hi!".to_string()
            })
        );
        assert_eq!(sent[3].destination_id, "peer-location");
    }

    #[tokio::test]
    async fn backend_failure_sends_no_reply() {
        let config = sample();
        let mut dispatcher = Dispatcher::new(
            &config,
            identity(),
            FakeBackend::scripted(vec![Script::Status(StatusCode::BAD_GATEWAY), reply("ok")]),
            RecordingTransport::default(),
        );
        let key = ConversationKey::new("peer-location");

        dispatcher.dispatch(private_event("first")).await.unwrap();

        assert_eq!(
            kinds(dispatcher.transport()),
            vec![MessageType::ChatTypingNotification]
        );
        assert_eq!(dispatcher.cache_mut().get_or_create(&key).len(), 1);

        dispatcher.dispatch(private_event("second")).await.unwrap();

        let requests = dispatcher.backend().requests();
        assert_eq!(requests[1].messages.len(), 2);
        assert_eq!(requests[1].messages[1].content, "second");
        assert_eq!(dispatcher.cache_mut().get_or_create(&key).len(), 2);
    }

    #[tokio::test]
    async fn empty_completion_sends_no_reply() {
        let config = sample();
        let mut dispatcher = Dispatcher::new(
            &config,
            identity(),
            FakeBackend::scripted(vec![Script::Chunks(vec![Ok(StreamChunk::Done)])]),
            RecordingTransport::default(),
        );

        dispatcher
            .dispatch(room_event("alice-gxs", "@Bot hello"))
            .await
            .unwrap();

        assert_eq!(
            kinds(dispatcher.transport()),
            vec![MessageType::ChatRoomTypingNotification]
        );
        let alice = ConversationKey::new("alice-gxs");
        assert_eq!(dispatcher.cache_mut().get_or_create(&alice).len(), 1);
    }

    #[tokio::test]
    async fn transport_failure_is_fatal() {
        let config = sample();
        let mut dispatcher = Dispatcher::new(
            &config,
            identity(),
            FakeBackend::scripted(vec![reply("ok")]),
            RecordingTransport::failing(),
        );

        let result = dispatcher.dispatch(private_event("hello")).await;

        assert!(matches!(result, Err(BotError::Transport(_))));
    }

    #[tokio::test]
    async fn unknown_and_malformed_frames_are_skipped() {
        let config = sample();
        let mut dispatcher = Dispatcher::new(
            &config,
            identity(),
            FakeBackend::scripted(Vec::new()),
            RecordingTransport::default(),
        );

        let typing = Frame::new(Command::Message)
            .header("messageType", "CHAT_TYPING_NOTIFICATION")
            .header("destinationId", "peer")
            .body(r#"{"content":""}"#);
        let broken = Frame::new(Command::Message)
            .header("messageType", "CHAT_PRIVATE_MESSAGE")
            .header("destinationId", "peer")
            .body("not json");

        dispatcher.handle_frame(&typing).await.unwrap();
        dispatcher.handle_frame(&broken).await.unwrap();

        assert!(dispatcher.transport().sent().is_empty());
        assert!(dispatcher.backend().requests().is_empty());
    }
}
