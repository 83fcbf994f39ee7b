//! Response generation.
//!
//! A [`PartProducer`] turns a chat into a stream of parts. The driver feeds
//! those parts into a stream session, persists the assistant reply when the
//! producer finishes, and always closes the session. Producer failures are
//! reported as an `error` part and never retried.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use parley_core::{Chat, ChatError, ErrorKind, Message, Role, StreamPart, Surface};

use crate::service::ChatService;
use crate::stream::StreamPublisher;

/// Failure of the model provider.
#[derive(Debug, Clone, Error)]
pub enum ProducerError {
    #[error("Model provider rate limited the request")]
    RateLimited,

    #[error("Model provider unreachable: {0}")]
    Offline(String),
}

impl ProducerError {
    pub fn to_chat_error(&self) -> ChatError {
        match self {
            ProducerError::RateLimited => ChatError::new(ErrorKind::RateLimited, Surface::Chat),
            ProducerError::Offline(cause) => ChatError::offline(Surface::Chat, cause.clone()),
        }
    }
}

pub type PartStream = BoxStream<'static, Result<StreamPart, ProducerError>>;

/// Produces the assistant's response parts for a chat turn.
#[async_trait]
pub trait PartProducer: Send + Sync {
    async fn produce(
        &self,
        chat: &Chat,
        history: &[Message],
        model: &str,
    ) -> Result<PartStream, ProducerError>;
}

/// Built-in producer that answers by echoing the last user message word by word.
pub struct EchoProducer {
    chunk_delay: Duration,
}

impl EchoProducer {
    pub fn new(chunk_delay: Duration) -> Self {
        Self { chunk_delay }
    }
}

#[async_trait]
impl PartProducer for EchoProducer {
    async fn produce(
        &self,
        _chat: &Chat,
        history: &[Message],
        model: &str,
    ) -> Result<PartStream, ProducerError> {
        let prompt = history
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.text())
            .unwrap_or_default();

        let id = format!("{}-0", model);
        let mut parts = vec![StreamPart::TextStart { id: id.clone() }];
        let reply = format!("You said: {}", prompt);
        for word in reply.split_inclusive(' ') {
            parts.push(StreamPart::TextDelta {
                id: id.clone(),
                delta: word.to_string(),
            });
        }
        parts.push(StreamPart::TextEnd { id });

        let delay = self.chunk_delay;
        Ok(stream::iter(parts)
            .then(move |part| async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok(part)
            })
            .boxed())
    }
}

/// Run one generation in the background, publishing into `publisher`.
pub fn spawn_generation(
    chats: Arc<ChatService>,
    producer: Arc<dyn PartProducer>,
    publisher: StreamPublisher,
    chat: Chat,
    model: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        drive(&chats, producer.as_ref(), &publisher, &chat, &model).await;
        publisher.close();
    })
}

async fn drive(
    chats: &ChatService,
    producer: &dyn PartProducer,
    publisher: &StreamPublisher,
    chat: &Chat,
    model: &str,
) {
    let history = match chats.messages(&chat.id, Some(&chat.owner_id)).await {
        Ok(history) => history,
        Err(e) => {
            publish_error(publisher, &e);
            return;
        }
    };

    let mut parts = match producer.produce(chat, &history, model).await {
        Ok(parts) => parts,
        Err(e) => {
            warn!(chat_id = %chat.id, error = %e, "Producer failed to start");
            publish_error(publisher, &e.to_chat_error());
            return;
        }
    };

    let mut text = String::new();
    while let Some(item) = parts.next().await {
        match item {
            Ok(part) => {
                if let StreamPart::TextDelta { delta, .. } = &part {
                    text.push_str(delta);
                }
                publisher.publish(part);
            }
            Err(e) => {
                warn!(chat_id = %chat.id, error = %e, "Producer failed mid-stream");
                publish_error(publisher, &e.to_chat_error());
                return;
            }
        }
    }

    match chats.finish_turn(&chat.id, &text).await {
        Ok(message) => match StreamPart::append_message(&message) {
            Ok(part) => {
                publisher.publish(part);
            }
            Err(e) => warn!(chat_id = %chat.id, error = %e, "Failed to encode assistant message"),
        },
        Err(e) => {
            publish_error(publisher, &e);
            return;
        }
    }

    publisher.publish(StreamPart::Finish {
        finish_reason: Some("stop".to_string()),
    });
    info!(chat_id = %chat.id, chars = text.len(), "Generation finished");
}

fn publish_error(publisher: &StreamPublisher, err: &ChatError) {
    publisher.publish(StreamPart::Error {
        error_text: err.code(),
    });
}
