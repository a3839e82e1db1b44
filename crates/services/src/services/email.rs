//! Outgoing email delivery.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use super::config::EmailSettings;

#[derive(Debug, Clone, Error)]
pub enum EmailError {
    #[error("network error: {0}")]
    Transport(String),
    #[error("timeout")]
    Timeout,
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("rate limited")]
    RateLimited,
    #[error("invalid email api key")]
    InvalidApiKey,
    #[error("rejected recipient: {0}")]
    Rejected(String),
}

impl EmailError {
    /// Returns true if the error is transient and should be retried.
    pub fn should_retry(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout | Self::RateLimited => true,
            Self::Http { status, .. } => (500..=599).contains(status),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), EmailError>;
}

#[derive(Debug, Serialize)]
struct ProviderRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    text: &'a str,
}

/// Delivers through an HTTP email provider that accepts a JSON body and bearer key.
#[derive(Debug, Clone)]
pub struct HttpEmailSender {
    http: Client,
    api_url: String,
    api_key: String,
    from: String,
}

impl HttpEmailSender {
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(api_url: String, api_key: String, from: String) -> Result<Self, EmailError> {
        let http = Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .user_agent(concat!("canopy/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| EmailError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            api_url,
            api_key,
            from,
        })
    }

    async fn post(&self, email: &OutgoingEmail) -> Result<(), EmailError> {
        let request = ProviderRequest {
            from: &self.from,
            to: [email.to.as_str()],
            subject: &email.subject,
            text: &email.body,
        };
        let res = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        match res.status() {
            s if s.is_success() => Ok(()),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(EmailError::InvalidApiKey),
            StatusCode::TOO_MANY_REQUESTS => Err(EmailError::RateLimited),
            StatusCode::UNPROCESSABLE_ENTITY => Err(EmailError::Rejected(email.to.clone())),
            s => {
                let status = s.as_u16();
                let body = res.text().await.unwrap_or_default();
                Err(EmailError::Http { status, body })
            }
        }
    }
}

#[async_trait]
impl EmailSender for HttpEmailSender {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), EmailError> {
        (|| async { self.post(email).await })
            .retry(
                ExponentialBuilder::default()
                    .with_min_delay(Duration::from_millis(500))
                    .with_max_delay(Duration::from_secs(10))
                    .with_max_times(3)
                    .with_jitter(),
            )
            .when(|e: &EmailError| e.should_retry())
            .notify(|e, dur| {
                warn!(
                    "Email delivery failed, retrying after {:.2}s: {}",
                    dur.as_secs_f64(),
                    e
                )
            })
            .await
    }
}

/// Logs messages instead of delivering them.
#[derive(Debug, Clone, Default)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), EmailError> {
        info!(to = %email.to, subject = %email.subject, "Email delivery disabled, logging message");
        Ok(())
    }
}

/// The HTTP sender when an API key is configured, otherwise the log sender.
pub fn sender_from_settings(settings: &EmailSettings) -> Result<Arc<dyn EmailSender>, EmailError> {
    match &settings.api_key {
        Some(key) => Ok(Arc::new(HttpEmailSender::new(
            settings.api_url.clone(),
            key.clone(),
            settings.from.clone(),
        )?)),
        None => {
            warn!("EMAIL_API_KEY not set, outgoing email will only be logged");
            Ok(Arc::new(LogEmailSender))
        }
    }
}

fn map_reqwest_error(e: reqwest::Error) -> EmailError {
    if e.is_timeout() {
        EmailError::Timeout
    } else {
        EmailError::Transport(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(EmailError::Timeout.should_retry());
        assert!(EmailError::RateLimited.should_retry());
        assert!(EmailError::Transport("reset".into()).should_retry());
        assert!(
            EmailError::Http {
                status: 503,
                body: String::new()
            }
            .should_retry()
        );
        assert!(
            !EmailError::Http {
                status: 400,
                body: String::new()
            }
            .should_retry()
        );
        assert!(!EmailError::InvalidApiKey.should_retry());
        assert!(!EmailError::Rejected("a@b.org".into()).should_retry());
    }

    #[tokio::test]
    async fn test_log_sender_always_succeeds() {
        let email = OutgoingEmail {
            to: "ana@example.org".to_string(),
            subject: "Hello".to_string(),
            body: "Hi Ana".to_string(),
        };
        assert!(LogEmailSender.send(&email).await.is_ok());
    }
}
