//! Delivery over the Discord REST API.

use std::num::NonZeroU64;
use std::sync::Arc;

use async_trait::async_trait;
use marketbridge_protocol::{
    DeliveryError, DeliveryGateway, Message, SentMessage, ThreadHandle, ThreadVisibility,
};
use serenity::all::{
    AutoArchiveDuration, ChannelId, ChannelType, CreateEmbed, CreateEmbedFooter, CreateMessage,
    CreateThread, Timestamp, UserId,
};
use serenity::http::Http;
use tracing::debug;

// Discord embed limits.
const MAX_TITLE: usize = 256;
const MAX_FIELD_NAME: usize = 256;
const MAX_FIELD_VALUE: usize = 1024;
const MAX_FIELDS: usize = 25;
const MAX_DESCRIPTION: usize = 4096;
const MAX_THREAD_NAME: usize = 100;

/// Sends messages and manages threads through a bot token.
#[derive(Clone)]
pub struct DiscordGateway {
    http: Arc<Http>,
}

impl DiscordGateway {
    pub fn new(token: &str) -> Self {
        Self {
            http: Arc::new(Http::new(token)),
        }
    }
}

#[async_trait]
impl DeliveryGateway for DiscordGateway {
    fn name(&self) -> &'static str {
        "discord"
    }

    async fn send_message(
        &self,
        destination_id: &str,
        message: &Message,
    ) -> Result<SentMessage, DeliveryError> {
        let channel = ChannelId::new(parse_id(destination_id)?);
        let sent = channel
            .send_message(&self.http, CreateMessage::new().embed(embed(message)))
            .await
            .map_err(|e| map_error(destination_id, e))?;
        debug!(channel = destination_id, message_id = %sent.id, "Sent Discord message");
        Ok(SentMessage {
            destination_id: destination_id.to_string(),
            message_id: sent.id.to_string(),
        })
    }

    async fn create_thread(
        &self,
        channel_id: &str,
        name: &str,
        visibility: ThreadVisibility,
    ) -> Result<ThreadHandle, DeliveryError> {
        let channel = ChannelId::new(parse_id(channel_id)?);
        let kind = match visibility {
            ThreadVisibility::Private => ChannelType::PrivateThread,
            ThreadVisibility::Public => ChannelType::PublicThread,
        };
        let name = clamp(name, MAX_THREAD_NAME);
        let builder = CreateThread::new(name.clone())
            .kind(kind)
            .auto_archive_duration(AutoArchiveDuration::OneWeek);
        let thread = channel
            .create_thread(&self.http, builder)
            .await
            .map_err(|e| map_error(channel_id, e))?;
        debug!(channel = channel_id, thread = %thread.id, "Created Discord thread");
        Ok(ThreadHandle {
            id: thread.id.to_string(),
            parent_id: channel_id.to_string(),
            name,
        })
    }

    async fn add_member(&self, thread: &ThreadHandle, user_id: &str) -> Result<(), DeliveryError> {
        let channel = ChannelId::new(parse_id(&thread.id)?);
        let user = UserId::new(parse_id(user_id)?);
        channel
            .add_thread_member(&self.http, user)
            .await
            .map_err(|e| map_error(user_id, e))
    }
}

/// Discord snowflakes are non-zero integers.
fn parse_id(id: &str) -> Result<u64, DeliveryError> {
    id.trim()
        .parse::<NonZeroU64>()
        .map(NonZeroU64::get)
        .map_err(|_| DeliveryError::InvalidDestination(id.to_string()))
}

fn map_error(id: &str, err: serenity::Error) -> DeliveryError {
    if let serenity::Error::Http(http) = &err
        && let Some(status) = http.status_code()
    {
        return match status.as_u16() {
            404 => DeliveryError::InvalidDestination(id.to_string()),
            429 => DeliveryError::RateLimited,
            403 => DeliveryError::Platform(format!("missing permissions for {id}")),
            _ => DeliveryError::Platform(err.to_string()),
        };
    }
    DeliveryError::Platform(err.to_string())
}

fn embed(message: &Message) -> CreateEmbed {
    let mut embed = CreateEmbed::new()
        .title(clamp(&message.title, MAX_TITLE))
        .color(message.color);
    if let Some(body) = message.body() {
        embed = embed.description(clamp(&body, MAX_DESCRIPTION));
    }
    for field in message.fields.iter().take(MAX_FIELDS) {
        embed = embed.field(
            clamp(&field.name, MAX_FIELD_NAME),
            clamp(&field.value, MAX_FIELD_VALUE),
            field.inline,
        );
    }
    if let Some(link) = &message.link {
        embed = embed.url(link);
    }
    if let Some(image) = &message.image_url {
        embed = embed.image(image);
    }
    if let Some(footer) = &message.footer {
        embed = embed.footer(CreateEmbedFooter::new(footer));
    }
    let timestamp = message
        .timestamp
        .and_then(|ts| Timestamp::from_unix_timestamp(ts.timestamp()).ok())
        .unwrap_or_else(Timestamp::now);
    embed.timestamp(timestamp)
}

/// Cut to at most `max` characters, marking the cut with an ellipsis.
fn clamp(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(3)).collect();
    out.push_str("...");
    out
}
