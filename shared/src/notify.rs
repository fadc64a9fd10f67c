use async_trait::async_trait;
use aws_sdk_sns::types::MessageAttributeValue;
use aws_sdk_sns::Client as SnsClient;
use log::{debug, info, warn};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::OnceCell;

use crate::config::Config;
use crate::models::CancellationNotice;

#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("Failed to serialize notification: {0}")]
    Serialization(String),

    #[error("Failed to publish notification: {0}")]
    PublishFailed(String),
}

/// Outbound channel for attendee notifications. Delivery is at-least-once.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish_cancellation(&self, notice: &CancellationNotice)
        -> Result<(), NotificationError>;
}

static SNS_CLIENT: OnceCell<SnsClient> = OnceCell::const_new();

/// Publishes to the shared SNS topic, tagging each message with `eventType`
/// so subscribers can filter.
pub struct SnsNotifier {
    topic_arn: Option<String>,
    skip_publish: bool,
}

impl SnsNotifier {
    pub fn from_config(config: &Config) -> Self {
        Self {
            topic_arn: config.sns_topic_arn.clone(),
            skip_publish: config.skip_sns,
        }
    }

    async fn client() -> SnsClient {
        SNS_CLIENT
            .get_or_init(|| async {
                let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
                    .load()
                    .await;
                SnsClient::new(&config)
            })
            .await
            .clone()
    }
}

#[async_trait]
impl Notifier for SnsNotifier {
    async fn publish_cancellation(
        &self,
        notice: &CancellationNotice,
    ) -> Result<(), NotificationError> {
        if self.skip_publish {
            debug!(
                "Test mode: Skipping SNS publishing for {} to {}",
                notice.notice_type, notice.volunteer_email
            );
            return Ok(());
        }

        let topic_arn = match &self.topic_arn {
            Some(arn) => arn,
            None => {
                warn!(
                    "SNS_TOPIC_ARN not set, dropping {} notification for event {}",
                    notice.notice_type, notice.event_id
                );
                return Ok(());
            }
        };

        let message = serde_json::to_string(notice)
            .map_err(|e| NotificationError::Serialization(e.to_string()))?;

        let event_type_attr = MessageAttributeValue::builder()
            .data_type("String")
            .string_value(&notice.notice_type)
            .build()
            .map_err(|e| {
                NotificationError::Serialization(format!("Failed to build message attribute: {}", e))
            })?;

        // SNS rejects subjects over 100 characters
        let subject: String = format!("Event Cancelled: {}", notice.event_title)
            .chars()
            .take(100)
            .collect();

        let mut message_attributes = HashMap::new();
        message_attributes.insert("eventType".to_string(), event_type_attr);

        Self::client()
            .await
            .publish()
            .topic_arn(topic_arn)
            .message(message)
            .subject(subject)
            .set_message_attributes(Some(message_attributes))
            .send()
            .await
            .map_err(|e| NotificationError::PublishFailed(e.to_string()))?;

        info!(
            "Published {} for event {} to {}",
            notice.notice_type, notice.event_id, notice.volunteer_email
        );
        Ok(())
    }
}
