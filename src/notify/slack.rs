//! Slack incoming-webhook notifier.

use super::{EventType, NotificationEvent, Notifier, NotifyError};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SlackConfig {
    #[serde(default)]
    webhook_url: String,
}

pub struct SlackNotifier {
    webhook_url: String,
    client: reqwest::Client,
}

impl SlackNotifier {
    /// Build from a channel's JSON config (`{"webhookUrl": "..."}`).
    pub fn from_config(config: &str) -> Result<Self, NotifyError> {
        let cfg: SlackConfig =
            serde_json::from_str(config).map_err(|e| NotifyError::Config(e.to_string()))?;
        if cfg.webhook_url.is_empty() {
            return Err(NotifyError::Config("webhookUrl missing or invalid".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            webhook_url: cfg.webhook_url,
            client,
        })
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn send(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
        let resp = self
            .client
            .post(&self.webhook_url)
            .json(&slack_payload(event))
            .send()
            .await?;

        if resp.status().as_u16() >= 400 {
            return Err(NotifyError::Status(resp.status().as_u16()));
        }
        Ok(())
    }
}

fn slack_payload(event: &NotificationEvent) -> Value {
    let (title, color, emoji) = match event.event_type {
        EventType::Down => ("Monitor Down", "#dc3545", ":rotating_light:"),
        EventType::Degraded => ("Monitor Degraded", "#ffc107", ":warning:"),
        EventType::SslExpiring => ("SSL Certificate Expiring", "#ff8c00", ":lock:"),
        EventType::Flapping => ("Monitor Flapping", "#6f42c1", ":repeat:"),
        EventType::Stabilized => ("Monitor Stabilized", "#36a64f", ":white_check_mark:"),
        EventType::Up => ("Monitor Recovered", "#36a64f", ":white_check_mark:"),
    };

    json!({
        "text": format!("*{}*: {}", title, event.monitor_name),
        "attachments": [{
            "color": color,
            "fields": [
                { "title": "Monitor", "value": event.monitor_name, "short": true },
                { "title": "URL", "value": event.monitor_url, "short": true },
                { "title": "Message", "value": format!("{} {}", emoji, event.message), "short": false },
                { "title": "Time", "value": event.time.to_rfc2822(), "short": true },
            ],
        }],
    })
}
