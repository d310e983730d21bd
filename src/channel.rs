//! Outbound delivery channels (SMS / email), specified at the gateway
//! boundary. Real vendors sit behind HTTP webhooks or SMTP; the engine only
//! sees `send(to, body)`.

use anyhow::Context;
use async_trait::async_trait;
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};
use reqwest::Client;

use crate::lead::Channel;

#[derive(Debug, Clone, Default)]
pub struct DeliveryReceipt {
    pub provider_id: Option<String>,
}

#[derive(Debug)]
pub enum SendError {
    /// The recipient revoked consent at the gateway (unsubscribe bounce).
    /// The scheduler treats this as consent=false for the channel going
    /// forward.
    ConsentRevoked,
    Transport(anyhow::Error),
}

impl std::fmt::Display for SendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SendError::ConsentRevoked => write!(f, "recipient revoked consent"),
            SendError::Transport(e) => write!(f, "transport failure: {e:#}"),
        }
    }
}

impl std::error::Error for SendError {}

#[async_trait]
pub trait ChannelSender: Send + Sync {
    async fn send(&self, to: &str, body: &str) -> Result<DeliveryReceipt, SendError>;
    fn channel(&self) -> Channel;
}

/// SMS gateway behind a JSON webhook. Disabled (logs and reports success)
/// when no endpoint is configured, so local runs never hit a vendor.
pub struct SmsWebhookGateway {
    endpoint: Option<String>,
    client: Client,
}

impl SmsWebhookGateway {
    pub fn from_env() -> Self {
        Self {
            endpoint: std::env::var("SMS_GATEWAY_URL").ok(),
            client: Client::new(),
        }
    }

    pub fn new(endpoint: String) -> Self {
        Self {
            endpoint: Some(endpoint),
            client: Client::new(),
        }
    }
}

#[async_trait]
impl ChannelSender for SmsWebhookGateway {
    async fn send(&self, to: &str, body: &str) -> Result<DeliveryReceipt, SendError> {
        let Some(url) = &self.endpoint else {
            tracing::debug!("SMS gateway disabled (no SMS_GATEWAY_URL)");
            return Ok(DeliveryReceipt::default());
        };

        let payload = serde_json::json!({ "to": to, "body": body });
        let resp = self
            .client
            .post(url)
            .json(&payload)
            .send()
            .await
            .context("sms gateway post")
            .map_err(SendError::Transport)?;

        // HTTP 410 is the vendor's unsubscribe bounce.
        if resp.status().as_u16() == 410 {
            return Err(SendError::ConsentRevoked);
        }
        let resp = resp
            .error_for_status()
            .context("sms gateway non-2xx")
            .map_err(SendError::Transport)?;

        let provider_id = resp
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|v| v.get("id").and_then(|id| id.as_str().map(String::from)));
        Ok(DeliveryReceipt { provider_id })
    }

    fn channel(&self) -> Channel {
        Channel::Sms
    }
}

/// SMTP email gateway. Disabled when SMTP_HOST is not configured.
pub struct SmtpEmailGateway {
    inner: Option<SmtpInner>,
}

struct SmtpInner {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    subject: String,
}

impl SmtpEmailGateway {
    pub fn from_env() -> Self {
        let inner = (|| {
            let host = std::env::var("SMTP_HOST").ok()?;
            let user = std::env::var("SMTP_USER").ok()?;
            let pass = std::env::var("SMTP_PASS").ok()?;
            let from_addr = std::env::var("CHANNEL_EMAIL_FROM").ok()?;

            let creds = Credentials::new(user, pass);
            let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&host)
                .ok()?
                .credentials(creds)
                .build();
            let from = from_addr.parse().ok()?;
            let subject = std::env::var("CHANNEL_EMAIL_SUBJECT")
                .unwrap_or_else(|_| "A note from your advisor team".to_string());
            Some(SmtpInner {
                mailer,
                from,
                subject,
            })
        })();
        if inner.is_none() {
            tracing::debug!("email gateway disabled (SMTP env incomplete)");
        }
        Self { inner }
    }
}

#[async_trait]
impl ChannelSender for SmtpEmailGateway {
    async fn send(&self, to: &str, body: &str) -> Result<DeliveryReceipt, SendError> {
        let Some(inner) = &self.inner else {
            tracing::debug!("email gateway disabled; dropping send");
            return Ok(DeliveryReceipt::default());
        };

        let to_mbox: Mailbox = to
            .parse()
            .map_err(|e| SendError::Transport(anyhow::anyhow!("invalid recipient {to}: {e}")))?;
        let msg = Message::builder()
            .from(inner.from.clone())
            .to(to_mbox)
            .subject(&inner.subject)
            .header(header::ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .context("build email")
            .map_err(SendError::Transport)?;

        inner
            .mailer
            .send(msg)
            .await
            .context("send email")
            .map_err(SendError::Transport)?;
        Ok(DeliveryReceipt::default())
    }

    fn channel(&self) -> Channel {
        Channel::Email
    }
}

/// In-memory sender used by tests and dry-run tooling. Records every send;
/// can be scripted to fail.
#[derive(Default)]
pub struct RecordingSender {
    channel: Option<Channel>,
    pub sent: std::sync::Mutex<Vec<(String, String)>>,
    fail_next: std::sync::Mutex<Option<FailMode>>,
}

#[derive(Debug, Clone, Copy)]
pub enum FailMode {
    ConsentRevoked,
    Transport,
}

impl RecordingSender {
    pub fn new(channel: Channel) -> Self {
        Self {
            channel: Some(channel),
            ..Default::default()
        }
    }

    pub fn fail_next(&self, mode: FailMode) {
        *self.fail_next.lock().expect("fail_next mutex poisoned") = Some(mode);
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().expect("sent mutex poisoned").len()
    }
}

#[async_trait]
impl ChannelSender for RecordingSender {
    async fn send(&self, to: &str, body: &str) -> Result<DeliveryReceipt, SendError> {
        if let Some(mode) = self.fail_next.lock().expect("fail_next mutex poisoned").take() {
            return Err(match mode {
                FailMode::ConsentRevoked => SendError::ConsentRevoked,
                FailMode::Transport => {
                    SendError::Transport(anyhow::anyhow!("scripted transport failure"))
                }
            });
        }
        self.sent
            .lock()
            .expect("sent mutex poisoned")
            .push((to.to_string(), body.to_string()));
        Ok(DeliveryReceipt::default())
    }

    fn channel(&self) -> Channel {
        self.channel.unwrap_or(Channel::Sms)
    }
}
