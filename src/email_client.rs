use async_trait::async_trait;
use serde::Serialize;

use crate::error::EmailError;
use crate::validators::is_valid_email;

/// Something that can hand one message to one recipient
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn deliver(&self, recipient: &str, subject: &str, html_content: &str) -> Result<(), EmailError>;
}

/// HTTP mail API client
#[derive(Clone)]
pub struct EmailClient {
    http_client: reqwest::Client,
    base_url: String,
    sender: SenderEmail,
}

#[derive(Clone, Debug)]
pub struct SenderEmail(String);

impl SenderEmail {
    pub fn parse(s: &str) -> Result<Self, EmailError> {
        let email = is_valid_email(s).map_err(|e| EmailError::InvalidRecipient(e.to_string()))?;
        Ok(Self(email))
    }

    pub fn inner(&self) -> &str {
        &self.0
    }
}

#[derive(Serialize)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
}

impl EmailClient {
    pub fn new(base_url: String, sender: SenderEmail, http_client: reqwest::Client) -> Self {
        Self {
            http_client,
            base_url,
            sender,
        }
    }
}

#[async_trait]
impl MailTransport for EmailClient {
    async fn deliver(&self, recipient: &str, subject: &str, html_content: &str) -> Result<(), EmailError> {
        let url = format!("{}/email", self.base_url.trim_end_matches('/'));
        let request = SendEmailRequest {
            from: self.sender.inner(),
            to: recipient,
            subject,
            html: html_content,
        };

        self.http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| EmailError::SendFailed(e.to_string()))?
            .error_for_status()
            .map_err(|e| EmailError::SendFailed(format!("mail API returned error: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sender_parse_valid_email() {
        let sender = SenderEmail::parse("NoReply@Bookly.dev").unwrap();
        assert_eq!(sender.inner(), "noreply@bookly.dev");
    }

    #[test]
    fn test_sender_parse_invalid_email() {
        assert!(SenderEmail::parse("invalid-email").is_err());
    }

    #[tokio::test]
    async fn test_unreachable_mail_api_is_a_send_failure() {
        let client = EmailClient::new(
            "http://127.0.0.1:9".to_string(),
            SenderEmail::parse("noreply@bookly.dev").unwrap(),
            reqwest::Client::new(),
        );

        let result = client.deliver("a@x.com", "Hi", "<p>Hi</p>").await;
        assert!(matches!(result, Err(EmailError::SendFailed(_))));
    }
}
