//! Contact form delivery.
//!
//! Validates website contact requests and forwards them by email through a
//! [`Mailer`]. The SendGrid v3 API is used in production; [`LogMailer`]
//! only logs the message (dry-run).

use anyhow::{Context, anyhow};
use askama::Template;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};
use validator::{Validate, ValidationError};

use crate::config::ContactConfig;
use crate::error::{Error, Result};

const SENDGRID_SEND_URL: &str = "https://api.sendgrid.com/v3/mail/send";

/// Contact form payload.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct ContactRequest {
    #[validate(length(min = 2, message = "Name must be at least 2 characters"))]
    pub name: String,

    #[validate(email(message = "Invalid email address"))]
    pub email: String,

    #[validate(length(min = 8, message = "Phone must be at least 8 characters"))]
    pub phone: String,

    #[validate(length(min = 10, message = "Message must be at least 10 characters"))]
    pub message: String,

    #[validate(custom(
        function = "validate_privacy_policy",
        message = "The privacy policy must be accepted"
    ))]
    pub privacy_policy: bool,
}

fn validate_privacy_policy(accepted: &bool) -> std::result::Result<(), ValidationError> {
    if *accepted {
        Ok(())
    } else {
        Err(ValidationError::new("privacy_policy"))
    }
}

impl ContactRequest {
    fn trimmed(self) -> Self {
        Self {
            name: self.name.trim().to_string(),
            email: self.email.trim().to_string(),
            phone: self.phone.trim().to_string(),
            message: self.message.trim().to_string(),
            privacy_policy: self.privacy_policy,
        }
    }
}

/// A composed email ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Trait for email delivery.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> anyhow::Result<()>;
}

/// SendGrid v3 mail client.
pub struct SendGridMailer {
    http_client: Client,
    api_key: String,
}

impl SendGridMailer {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http_client: Client::new(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl Mailer for SendGridMailer {
    async fn send(&self, email: &OutgoingEmail) -> anyhow::Result<()> {
        let body = json!({
            "personalizations": [{ "to": [{ "email": email.to }] }],
            "from": { "email": email.from },
            "subject": email.subject,
            "content": [{ "type": "text/html", "value": email.html }],
        });

        let response = self
            .http_client
            .post(SENDGRID_SEND_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("Failed to reach SendGrid")?;

        // SendGrid answers 202 for queued mail
        if response.status() != StatusCode::ACCEPTED {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("SendGrid API error ({status}): {body}"));
        }

        Ok(())
    }
}

/// Mailer that only logs (dry-run mode).
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &OutgoingEmail) -> anyhow::Result<()> {
        info!(
            from = %email.from,
            to = %email.to,
            subject = %email.subject,
            "Dry run: contact email not sent"
        );
        Ok(())
    }
}

/// Validates contact requests and hands them to the mailer.
pub struct ContactNotifier {
    mailer: Option<Arc<dyn Mailer>>,
    from: Option<String>,
    to: Option<String>,
}

impl ContactNotifier {
    /// `mailer` is `None` when no delivery provider is configured.
    pub fn new(mailer: Option<Arc<dyn Mailer>>, config: &ContactConfig) -> Self {
        Self {
            mailer,
            from: config.from.clone(),
            to: config.to.clone(),
        }
    }

    /// Build the notifier the configuration asks for: SendGrid when an API
    /// key is set, otherwise no mailer at all.
    pub fn from_config(config: &ContactConfig) -> Self {
        let mailer = config
            .sendgrid_api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .map(|key| Arc::new(SendGridMailer::new(key)) as Arc<dyn Mailer>);
        Self::new(mailer, config)
    }

    pub async fn submit(&self, request: ContactRequest) -> Result<()> {
        let request = request.trimmed();
        request.validate()?;

        let (Some(mailer), Some(from), Some(to)) = (&self.mailer, &self.from, &self.to) else {
            error!("Contact delivery is not configured");
            return Err(Error::Configuration("contact email delivery is not configured"));
        };

        let email = compose_email(&request, from, to)?;
        mailer.send(&email).await.map_err(|e| {
            error!(to = %to, "Contact email delivery failed: {:#}", e);
            Error::Delivery(e.to_string())
        })?;

        info!(name = %request.name, "Contact request forwarded");
        Ok(())
    }
}

/// HTML body of the contact notification. Askama escapes every field.
#[derive(Template)]
#[template(path = "contact_email.html")]
struct ContactEmailTemplate<'a> {
    name: &'a str,
    email: &'a str,
    phone: &'a str,
    message_lines: Vec<&'a str>,
}

fn compose_email(request: &ContactRequest, from: &str, to: &str) -> Result<OutgoingEmail> {
    let html = ContactEmailTemplate {
        name: &request.name,
        email: &request.email,
        phone: &request.phone,
        message_lines: request.message.lines().collect(),
    }
    .render()?;

    Ok(OutgoingEmail {
        from: from.to_string(),
        to: to.to_string(),
        subject: format!("New website contact - {}", request.name),
        html,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingMailer {
        sent: Mutex<Vec<OutgoingEmail>>,
        fail: bool,
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, email: &OutgoingEmail) -> anyhow::Result<()> {
            if self.fail {
                return Err(anyhow!("provider unavailable"));
            }
            self.sent.lock().await.push(email.clone());
            Ok(())
        }
    }

    fn config() -> ContactConfig {
        ContactConfig {
            sendgrid_api_key: Some("SG.test".into()),
            from: Some("web@example.com".into()),
            to: Some("sales@example.com".into()),
        }
    }

    fn request() -> ContactRequest {
        ContactRequest {
            name: "Ana".into(),
            email: "ana@example.com".into(),
            phone: "5512345678".into(),
            message: "Me interesa la casa\ndel centro".into(),
            privacy_policy: true,
        }
    }

    #[tokio::test]
    async fn test_submit_sends_email() {
        let mailer = Arc::new(RecordingMailer::default());
        let notifier = ContactNotifier::new(Some(mailer.clone() as Arc<dyn Mailer>), &config());

        notifier.submit(request()).await.unwrap();

        let sent = mailer.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "New website contact - Ana");
        assert_eq!(sent[0].to, "sales@example.com");
        assert!(sent[0].html.contains("Me interesa la casa<br>del centro"));
    }

    #[tokio::test]
    async fn test_submit_validation() {
        let mailer = Arc::new(RecordingMailer::default());
        let notifier = ContactNotifier::new(Some(mailer.clone() as Arc<dyn Mailer>), &config());

        let bad = ContactRequest {
            name: " A ".into(),
            email: "not-an-email".into(),
            privacy_policy: false,
            ..request()
        };
        let err = notifier.submit(bad).await.unwrap_err();
        let Error::InvalidFields(errors) = err else {
            panic!("expected field errors, got {err:?}");
        };
        let fields = errors.field_errors();
        assert!(fields.contains_key("name"));
        assert!(fields.contains_key("email"));
        assert!(!fields.contains_key("phone"));
        // name, email and the privacy flag
        assert_eq!(fields.len(), 3);

        assert!(mailer.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_submit_unconfigured() {
        let notifier = ContactNotifier::new(None, &config());
        assert!(matches!(
            notifier.submit(request()).await,
            Err(Error::Configuration(_))
        ));

        let mailer = Arc::new(RecordingMailer::default());
        let notifier = ContactNotifier::new(
            Some(mailer as Arc<dyn Mailer>),
            &ContactConfig {
                to: None,
                ..config()
            },
        );
        assert!(matches!(
            notifier.submit(request()).await,
            Err(Error::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_submit_delivery_failure() {
        let mailer = Arc::new(RecordingMailer {
            fail: true,
            ..Default::default()
        });
        let notifier = ContactNotifier::new(Some(mailer as Arc<dyn Mailer>), &config());
        assert!(matches!(
            notifier.submit(request()).await,
            Err(Error::Delivery(_))
        ));
    }

    #[test]
    fn test_from_config_without_key() {
        let notifier = ContactNotifier::from_config(&ContactConfig {
            sendgrid_api_key: Some(String::new()),
            ..config()
        });
        assert!(notifier.mailer.is_none());
    }

    #[test]
    fn test_compose_escapes_user_input() {
        let req = ContactRequest {
            name: "<b>Eve</b>".into(),
            message: "a & b <script>".into(),
            ..request()
        };
        let email = compose_email(&req, "f@x.com", "t@x.com").unwrap();
        assert!(email.html.contains("&lt;b&gt;Eve&lt;/b&gt;"));
        assert!(email.html.contains("a &amp; b &lt;script&gt;"));
        assert!(!email.html.contains("<script>"));
        assert!(!email.html.contains("<b>Eve"));
    }

    #[test]
    fn test_compose_keeps_line_breaks_escaped() {
        let req = ContactRequest {
            message: "first <i>line</i>\r\nsecond & last".into(),
            ..request()
        };
        let email = compose_email(&req, "f@x.com", "t@x.com").unwrap();
        assert!(email.html.contains("first &lt;i&gt;line&lt;/i&gt;<br>second &amp; last"));
        assert!(!email.html.contains("\r"));
        assert_eq!(email.subject, "New website contact - Ana");
    }

    #[test]
    fn test_deserialize_camel_case() {
        let req: ContactRequest = serde_json::from_str(
            r#"{"name":"Ana","email":"a@b.co","phone":"12345678","message":"0123456789","privacyPolicy":true}"#,
        )
        .unwrap();
        assert!(req.privacy_policy);
        assert!(req.validate().is_ok());
    }
}
