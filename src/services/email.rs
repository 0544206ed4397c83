//! Transactional email
//!
//! Lead notifications go to the broker inbox and, when enabled, a short
//! confirmation goes back to the lead. Delivery is pluggable: the Resend HTTP
//! API, plain SMTP through lettre, or a disabled mailer that only logs.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use lettre::{
    message::MultiPart, transport::smtp::authentication::Credentials, AsyncSmtpTransport,
    AsyncTransport, Message, Tokio1Executor,
};
use serde_json::json;
use std::sync::Arc;

use crate::config::{EmailConfig, EmailProvider};
use crate::models::{Lead, Listing};

/// A rendered email
#[derive(Debug, Clone, PartialEq)]
pub struct EmailMessage {
    pub to: String,
    pub reply_to: Option<String>,
    pub subject: String,
    pub text: String,
    pub html: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<()>;

    /// Provider name for logs
    fn name(&self) -> &'static str;
}

/// Sends through the Resend HTTP API
pub struct ResendMailer {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    from: String,
}

impl ResendMailer {
    pub fn new(client: reqwest::Client, endpoint: &str, api_key: &str, from: &str) -> Self {
        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            from: from.to_string(),
        }
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        let mut body = json!({
            "from": self.from,
            "to": [message.to],
            "subject": message.subject,
            "text": message.text,
            "html": message.html,
        });
        if let Some(reply_to) = &message.reply_to {
            body["reply_to"] = json!(reply_to);
        }

        let response = self
            .client
            .post(format!("{}/emails", self.endpoint))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("Resend request failed")?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(anyhow!("Resend returned {}: {}", status, detail));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "resend"
    }
}

/// Sends through an SMTP relay
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpMailer {
    pub fn new(config: &EmailConfig) -> Result<Self> {
        let host = config
            .smtp_host
            .as_deref()
            .ok_or_else(|| anyhow!("SMTP host not configured"))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(host)
            .map_err(|e| anyhow!("Failed to create SMTP transport: {}", e))?
            .port(config.smtp_port);

        if let (Some(username), Some(password)) = (&config.smtp_username, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from: config.from.clone(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        let mut builder = Message::builder()
            .from(self.from.parse().map_err(|e| anyhow!("Invalid from address: {}", e))?)
            .to(message.to.parse().map_err(|e| anyhow!("Invalid to address: {}", e))?)
            .subject(message.subject.clone());
        if let Some(reply_to) = &message.reply_to {
            builder = builder.reply_to(reply_to.parse().map_err(|e| anyhow!("Invalid reply-to address: {}", e))?);
        }

        let email = builder
            .multipart(MultiPart::alternative_plain_html(
                message.text.clone(),
                message.html.clone(),
            ))
            .map_err(|e| anyhow!("Failed to build email: {}", e))?;

        self.transport
            .send(email)
            .await
            .map_err(|e| anyhow!("Failed to send email: {}", e))?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "smtp"
    }
}

/// Logs instead of sending
pub struct DisabledMailer;

#[async_trait]
impl Mailer for DisabledMailer {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        tracing::info!(to = %message.to, subject = %message.subject, "Email delivery disabled; not sent");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "disabled"
    }
}

/// Build the configured mailer
pub fn create_mailer(config: &EmailConfig, client: reqwest::Client) -> Result<Arc<dyn Mailer>> {
    Ok(match config.provider {
        EmailProvider::Disabled => Arc::new(DisabledMailer),
        EmailProvider::Resend => {
            let api_key = config
                .api_key
                .as_deref()
                .ok_or_else(|| anyhow!("Resend API key not configured"))?;
            Arc::new(ResendMailer::new(client, &config.endpoint, api_key, &config.from))
        }
        EmailProvider::Smtp => Arc::new(SmtpMailer::new(config)?),
    })
}

/// Renders and sends lead emails
pub struct Notifier {
    mailer: Arc<dyn Mailer>,
    notify_to: Option<String>,
    auto_reply: bool,
    site_name: String,
}

impl Notifier {
    pub fn new(mailer: Arc<dyn Mailer>, config: &EmailConfig) -> Self {
        Self {
            mailer,
            notify_to: config.notify_to.clone(),
            auto_reply: config.auto_reply,
            site_name: config.site_name.clone(),
        }
    }

    /// Tell the broker about a new lead. Returns false when no broker inbox
    /// is configured.
    pub async fn lead_notification(&self, lead: &Lead, listing: Option<&Listing>) -> Result<bool> {
        let Some(to) = self.notify_to.clone() else {
            tracing::debug!("No notify_to address configured; skipping lead notification");
            return Ok(false);
        };
        let message = render_lead_notification(&self.site_name, to, lead, listing);
        self.mailer.send(&message).await?;
        tracing::info!(lead_id = lead.id, provider = self.mailer.name(), "Lead notification sent");
        Ok(true)
    }

    /// Confirm receipt to the lead. Returns false when auto-reply is off or
    /// the lead left no email.
    pub async fn lead_auto_reply(&self, lead: &Lead) -> Result<bool> {
        if !self.auto_reply {
            return Ok(false);
        }
        let Some(to) = lead.email.clone() else {
            return Ok(false);
        };
        let message = render_auto_reply(&self.site_name, to, lead, self.notify_to.clone());
        self.mailer.send(&message).await?;
        tracing::info!(lead_id = lead.id, "Lead auto-reply sent");
        Ok(true)
    }
}

fn render_lead_notification(site_name: &str, to: String, lead: &Lead, listing: Option<&Listing>) -> EmailMessage {
    let mut rows: Vec<(&str, String)> = vec![
        ("Name", lead.name.clone()),
        ("Source", lead.source.to_string()),
    ];
    if let Some(email) = &lead.email {
        rows.push(("Email", email.clone()));
    }
    if let Some(phone) = &lead.phone {
        rows.push(("Phone", phone.clone()));
    }
    if let Some(intent) = lead.intent {
        rows.push(("Intent", intent.to_string()));
    }
    if let Some(budget) = &lead.budget {
        rows.push(("Budget", budget.clone()));
    }
    if let Some(timeline) = &lead.timeline {
        rows.push(("Timeline", timeline.clone()));
    }
    if let Some(listing) = listing {
        rows.push(("Listing", format!("{} ({})", listing.title, listing.full_address())));
    }
    if let Some(message) = &lead.message {
        rows.push(("Message", message.clone()));
    }

    let text = rows
        .iter()
        .map(|(label, value)| format!("{}: {}", label, value))
        .collect::<Vec<_>>()
        .join("\n");
    let html_rows: String = rows
        .iter()
        .map(|(label, value)| {
            format!(
                "<tr><th align=\"left\">{}</th><td>{}</td></tr>",
                label,
                escape_html(value).replace('\n', "<br>")
            )
        })
        .collect();

    EmailMessage {
        to,
        reply_to: lead.email.clone(),
        subject: format!("[{}] New lead: {}", site_name, lead.name),
        text: format!("New lead received.\n\n{}\n", text),
        html: format!("<p>New lead received.</p><table>{}</table>", html_rows),
    }
}

fn render_auto_reply(site_name: &str, to: String, lead: &Lead, reply_to: Option<String>) -> EmailMessage {
    let greeting = if lead.name.trim().is_empty() {
        "Hi there".to_string()
    } else {
        format!("Hi {}", lead.name)
    };
    let text = format!(
        "{},\n\nThanks for reaching out to {}. An agent will get back to you shortly.\n\n{}",
        greeting, site_name, site_name
    );
    let html = format!(
        "<p>{},</p><p>Thanks for reaching out to {}. An agent will get back to you shortly.</p><p>{}</p>",
        escape_html(&greeting),
        escape_html(site_name),
        escape_html(site_name)
    );

    EmailMessage {
        to,
        reply_to,
        subject: format!("Thanks for contacting {}", site_name),
        text,
        html,
    }
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
