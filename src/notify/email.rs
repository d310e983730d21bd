use anyhow::{Context, Result};
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};

use super::{AlertEvent, Notifier};

pub struct EmailNotifier {
    inner: Option<Inner>,
}

struct Inner {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl EmailNotifier {
    /// Disabled (send is a no-op) unless the full SMTP env is present.
    pub fn from_env() -> Self {
        let inner = (|| {
            let host = std::env::var("SMTP_HOST").ok()?;
            let user = std::env::var("SMTP_USER").ok()?;
            let pass = std::env::var("SMTP_PASS").ok()?;
            let from = std::env::var("NOTIFY_EMAIL_FROM").ok()?.parse().ok()?;
            let to = std::env::var("NOTIFY_EMAIL_TO").ok()?.parse().ok()?;

            let creds = Credentials::new(user, pass);
            let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&host)
                .ok()?
                .credentials(creds)
                .build();
            Some(Inner { mailer, from, to })
        })();
        Self { inner }
    }
}

#[async_trait::async_trait]
impl Notifier for EmailNotifier {
    async fn send(&self, ev: &AlertEvent) -> Result<()> {
        let Some(inner) = &self.inner else {
            tracing::debug!("ops email disabled (SMTP env incomplete)");
            return Ok(());
        };

        let subject = format!("Nurture alert: {:?}", ev.kind);
        let body = format!(
            "Kind: {:?}\nLeads: {}\nDetail: {}\nTimestamp: {}\n",
            ev.kind,
            ev.lead_ids.join(", "),
            ev.detail,
            ev.ts.to_rfc3339()
        );

        let msg = Message::builder()
            .from(inner.from.clone())
            .to(inner.to.clone())
            .subject(subject)
            .header(header::ContentType::TEXT_PLAIN)
            .body(body)
            .context("build email")?;

        inner.mailer.send(msg).await.context("send email")?;
        Ok(())
    }
}
