/// Background mail dispatch
///
/// Handlers enqueue messages and move on; a worker task drains the queue and
/// retries each delivery with exponential backoff. A message is attempted
/// until it succeeds or `max_attempts` is reached, so a recipient may see a
/// duplicate if the mail API accepted a send whose response was lost.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::email_client::MailTransport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub recipients: Vec<String>,
    pub subject: String,
    pub html_body: String,
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::from_millis(200),
        }
    }

    fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Cloneable handle for enqueueing mail
#[derive(Clone)]
pub struct MailQueue {
    sender: mpsc::UnboundedSender<EmailMessage>,
}

impl MailQueue {
    /// The receiver goes to `spawn_mail_worker`, or to a test that wants to
    /// inspect what was sent.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<EmailMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Fire and forget; never waits for delivery
    pub fn send(&self, message: EmailMessage) {
        let recipients = message.recipients.len();
        if self.sender.send(message).is_err() {
            tracing::error!(recipients, "Mail queue is closed, message dropped");
        } else {
            tracing::debug!(recipients, "Mail enqueued");
        }
    }
}

pub fn spawn_mail_worker(
    mut receiver: mpsc::UnboundedReceiver<EmailMessage>,
    transport: Arc<dyn MailTransport>,
    policy: RetryPolicy,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = receiver.recv().await {
            // One slow recipient must not hold up the rest of the queue
            for recipient in message.recipients.iter().cloned() {
                let transport = transport.clone();
                let subject = message.subject.clone();
                let body = message.html_body.clone();
                tokio::spawn(async move {
                    deliver_with_retry(transport.as_ref(), &recipient, &subject, &body, policy).await;
                });
            }
        }
        tracing::info!("Mail worker stopped");
    })
}

/// Returns whether the message was eventually accepted
pub async fn deliver_with_retry(
    transport: &dyn MailTransport,
    recipient: &str,
    subject: &str,
    body: &str,
    policy: RetryPolicy,
) -> bool {
    for attempt in 1..=policy.max_attempts {
        match transport.deliver(recipient, subject, body).await {
            Ok(()) => {
                tracing::info!(attempt, "Mail delivered");
                return true;
            }
            Err(e) if attempt < policy.max_attempts => {
                tracing::warn!(attempt, error = %e, "Mail delivery failed, retrying");
                tokio::time::sleep(policy.delay_after(attempt)).await;
            }
            Err(e) => {
                tracing::error!(attempt, error = %e, "Mail delivery failed permanently");
            }
        }
    }
    false
}
