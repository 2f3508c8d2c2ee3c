//! Agreement notices sent to investors once a loan is fully funded

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Email gateway request failed: {0}")]
    Transport(String),

    #[error("Email gateway rejected notice with status {0}")]
    Rejected(u16),
}

impl From<reqwest::Error> for NotifyError {
    fn from(err: reqwest::Error) -> Self {
        NotifyError::Transport(err.to_string())
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_agreement_notice(
        &self,
        recipient: &str,
        document_url: &str,
    ) -> Result<(), NotifyError>;
}

/// Writes notices to the log instead of delivering them
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_agreement_notice(
        &self,
        recipient: &str,
        document_url: &str,
    ) -> Result<(), NotifyError> {
        tracing::info!(
            recipient = %recipient,
            agreement_url = %document_url,
            "Agreement notice (log delivery)"
        );
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct AgreementNotice<'a> {
    to: &'a str,
    subject: &'a str,
    agreement_url: &'a str,
}

/// Posts notices as JSON to an email gateway
#[derive(Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    endpoint: String,
}

impl WebhookNotifier {
    /// `timeout` bounds each gateway request, connect included
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .connect_timeout(timeout)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send_agreement_notice(
        &self,
        recipient: &str,
        document_url: &str,
    ) -> Result<(), NotifyError> {
        let notice = AgreementNotice {
            to: recipient,
            subject: "Your loan agreement letter is ready",
            agreement_url: document_url,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&notice)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(NotifyError::Rejected(response.status().as_u16()));
        }

        Ok(())
    }
}
