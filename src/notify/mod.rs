pub mod dto;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::error::AppError;

pub use dto::{LectureEvent, PushMessage, PushTarget, lecture_channel};

/// Fire-and-forget broadcast to observers of a channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, channel: &str, event: &LectureEvent) -> Result<(), AppError>;
}

/// Device / topic push delivery.
#[async_trait]
pub trait PushGateway: Send + Sync {
    async fn send(&self, target: &PushTarget, message: &PushMessage) -> Result<(), AppError>;
}

pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn publish(&self, channel: &str, event: &LectureEvent) -> Result<(), AppError> {
        debug!("noop notifier: {} on {}", event.name(), channel);
        Ok(())
    }
}

pub struct NoopPushGateway;

#[async_trait]
impl PushGateway for NoopPushGateway {
    async fn send(&self, target: &PushTarget, message: &PushMessage) -> Result<(), AppError> {
        debug!("noop push to {:?}: {}", target, message.title);
        Ok(())
    }
}

/// Posts every event as JSON to a relay endpoint that fans it out to sockets.
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: String) -> Result<Self, AppError> {
        let client = Client::builder()
            .build()
            .map_err(|e| AppError::Notification(format!("Failed to build http client: {}", e)))?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn publish(&self, channel: &str, event: &LectureEvent) -> Result<(), AppError> {
        let body = dto::PublishRequest { channel, event };

        let response = self.client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Notification(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::Notification(format!("relay error {}: {}", status, text)));
        }

        debug!("published {} on {}", event.name(), channel);
        Ok(())
    }
}

pub struct HttpPushGateway {
    client: Client,
    url: String,
    api_token: String,
}

impl HttpPushGateway {
    pub fn new(url: String, api_token: String) -> Result<Self, AppError> {
        let client = Client::builder()
            .build()
            .map_err(|e| AppError::Notification(format!("Failed to build http client: {}", e)))?;
        Ok(Self { client, url, api_token })
    }
}

#[async_trait]
impl PushGateway for HttpPushGateway {
    async fn send(&self, target: &PushTarget, message: &PushMessage) -> Result<(), AppError> {
        let body = dto::PushRequest {
            target,
            notification: message,
            android: dto::AndroidConfig::default(),
        };

        let response = self.client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_token))
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Notification(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::Notification(format!("push API error {}: {}", status, text)));
        }

        Ok(())
    }
}
