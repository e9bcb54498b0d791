//! Report delivery.
//!
//! A run produces exactly one notification for one operator address. There
//! is no retry here: a missed report is recovered by the next daily run.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tracing::info;

use crate::error::{DriftError, NotifyError, Result};

/// An HTML email ready to send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

/// Delivers a rendered report to the operator.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> std::result::Result<(), NotifyError>;
}

// ---------------------------------------------------------------------------
// HttpMailer
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct RelayMessage<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
    charset: &'static str,
}

/// Posts notifications as JSON to an HTTP mail relay.
#[derive(Debug, Clone)]
pub struct HttpMailer {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl HttpMailer {
    pub fn new(endpoint: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DriftError::HttpClient(e.to_string()))?;
        Ok(HttpMailer {
            client,
            endpoint: endpoint.to_string(),
            token,
        })
    }
}

#[async_trait]
impl Notifier for HttpMailer {
    async fn send(&self, notification: &Notification) -> std::result::Result<(), NotifyError> {
        let message = RelayMessage {
            from: &notification.from,
            to: [&notification.to],
            subject: &notification.subject,
            html: &notification.html_body,
            charset: "UTF-8",
        };

        let mut request = self.client.post(&self.endpoint).json(&message);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        info!(to = %notification.to, subject = %notification.subject, "report sent");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// OutboxNotifier
// ---------------------------------------------------------------------------

/// Envelope written next to each outbox report.
#[derive(Serialize)]
struct OutboxEnvelope<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    body: &'a str,
}

/// Writes each report into a directory as `<stamp>-drift-report.html`, the
/// body exactly as it would be mailed, plus `<stamp>-drift-report.json`
/// holding sender, recipient and subject.
#[derive(Debug, Clone)]
pub struct OutboxNotifier {
    dir: PathBuf,
}

impl OutboxNotifier {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        OutboxNotifier {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl Notifier for OutboxNotifier {
    async fn send(&self, notification: &Notification) -> std::result::Result<(), NotifyError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let stem = format!("{}-drift-report", Utc::now().format("%Y%m%dT%H%M%S%.3fZ"));
        let body_name = format!("{stem}.html");
        let envelope = OutboxEnvelope {
            from: &notification.from,
            to: &notification.to,
            subject: &notification.subject,
            body: &body_name,
        };
        let envelope = serde_json::to_vec_pretty(&envelope)
            .map_err(|e| NotifyError::Outbox(e.into()))?;

        let path = self.dir.join(&body_name);
        tokio::fs::write(&path, &notification.html_body).await?;
        tokio::fs::write(self.dir.join(format!("{stem}.json")), envelope).await?;
        info!(
            path = %path.display(),
            to = %notification.to,
            subject = %notification.subject,
            "report written to outbox"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryNotifier
// ---------------------------------------------------------------------------

/// Records notifications in memory; optionally refuses them (testing only).
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    sent: Mutex<Vec<Notification>>,
    refuse: bool,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier whose every send fails.
    pub fn refusing() -> Self {
        MemoryNotifier {
            sent: Mutex::new(Vec::new()),
            refuse: true,
        }
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn send(&self, notification: &Notification) -> std::result::Result<(), NotifyError> {
        if self.refuse {
            return Err(NotifyError::Refused("memory notifier set to refuse".to_string()));
        }
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}
