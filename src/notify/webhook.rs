use super::{Notifier, SendError, WebhookPayload};
use crate::config::{mask_sensitive_url, Config};
use crate::decision::NotificationDecision;
use chrono::Utc;
use reqwest::Client;
use std::time::Duration;

/// Single-target webhook with per-request timeout and exponential backoff.
#[derive(Clone)]
pub struct WebhookNotifier {
    url: String,
    link: String,
    client: Client,
    timeout: Duration,
    max_retries: u8,
    backoff_base: Duration,
}

impl WebhookNotifier {
    /// `link` is the monitored page, echoed in every availability alert.
    pub fn new(url: String, link: String) -> Self {
        Self {
            url,
            link,
            client: Client::new(),
            timeout: Duration::from_secs(30),
            max_retries: 3,
            backoff_base: Duration::from_millis(500),
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(cfg.webhook.url.clone(), cfg.website.url.clone())
            .with_timeout(cfg.webhook.timeout_seconds)
            .with_retries(cfg.webhook.max_retries)
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    /// Total attempts per send; 0 is treated as 1.
    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.max(1);
        self
    }

    pub fn with_backoff(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// Upper bound on how long one `send` can take.
    pub fn max_send_duration(&self) -> Duration {
        let attempts = u32::from(self.max_retries);
        let backoff: Duration = (1..attempts)
            .map(|a| self.backoff_base * (1u32 << (a - 1).min(16)))
            .sum();
        self.timeout * attempts + backoff
    }

    /// Fire the fixed test payload.
    pub async fn send_test(&self) -> Result<(), SendError> {
        self.post(&WebhookPayload::test(Utc::now())).await
    }

    async fn post(&self, payload: &WebhookPayload) -> Result<(), SendError> {
        let masked = mask_sensitive_url(&self.url);
        tracing::debug!(target: "notify", url = %masked, ?payload, "posting webhook");

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&self.url)
                .timeout(self.timeout)
                .json(payload)
                .send()
                .await;

            let err = match res {
                Ok(rsp) if rsp.status().is_success() => {
                    tracing::debug!(
                        target: "notify",
                        status = %rsp.status(),
                        attempt,
                        "webhook accepted"
                    );
                    return Ok(());
                }
                Ok(rsp) => SendError::Status(rsp.status()),
                Err(e) => SendError::Request(e.without_url()),
            };

            if attempt >= self.max_retries {
                return Err(err);
            }
            tracing::warn!(
                target: "notify",
                url = %masked,
                attempt,
                error = %err,
                "webhook attempt failed, retrying"
            );
            let shift = u32::from(attempt - 1).min(16);
            tokio::time::sleep(self.backoff_base * (1u32 << shift)).await;
        }
    }
}

#[async_trait::async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, decision: &NotificationDecision) -> Result<(), SendError> {
        let payload = WebhookPayload::for_decision(decision, &self.link, Utc::now())
            .ok_or(SendError::NothingToSend)?;
        self.post(&payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retries_floor_at_one_attempt() {
        let n = WebhookNotifier::new("https://example.com/h".into(), "https://example.com".into())
            .with_retries(0)
            .with_timeout(2)
            .with_backoff(Duration::from_millis(100));
        assert_eq!(n.max_send_duration(), Duration::from_secs(2));
    }

    #[test]
    fn send_budget_includes_backoff() {
        let n = WebhookNotifier::new("https://example.com/h".into(), "https://example.com".into())
            .with_retries(3)
            .with_timeout(1)
            .with_backoff(Duration::from_millis(500));
        // 3 x 1s + 500ms + 1s
        assert_eq!(n.max_send_duration(), Duration::from_millis(4500));
    }

    #[tokio::test]
    async fn no_action_is_never_posted() {
        let n = WebhookNotifier::new("http://127.0.0.1:9/h".into(), "https://example.com".into());
        let err = n.send(&NotificationDecision::NoAction).await.unwrap_err();
        assert!(matches!(err, SendError::NothingToSend));
    }
}
