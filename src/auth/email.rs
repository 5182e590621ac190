//! Outbound email for password-reset links.
//!
//! Delivery is best-effort and bounded by a timeout. A failed or slow send
//! never fails the calling operation; the caller receives
//! `Delivery::Failed` and decides what to do with the link.

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailMessage {
    pub from: String,
    pub to_email: String,
    pub subject: String,
    pub body: String,
}

/// Email delivery abstraction (SMTP relay, HTTP API, etc.).
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Deliver a message or return an error to mark it as failed.
    async fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Local dev sender that logs the message instead of sending real email.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            from = %message.from,
            to_email = %message.to_email,
            subject = %message.subject,
            body = %message.body,
            "email send stub"
        );
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    Failed,
}

/// Send with an upper bound on how long the caller waits.
pub async fn deliver(sender: &dyn EmailSender, message: &EmailMessage, timeout: Duration) -> Delivery {
    match tokio::time::timeout(timeout, sender.send(message)).await {
        Ok(Ok(())) => Delivery::Delivered,
        Ok(Err(err)) => {
            warn!(to_email = %message.to_email, "Email delivery failed: {err:#}");
            Delivery::Failed
        }
        Err(_) => {
            warn!(
                to_email = %message.to_email,
                timeout_secs = timeout.as_secs(),
                "Email delivery timed out"
            );
            Delivery::Failed
        }
    }
}

/// Subject and body of the password-reset email.
pub(crate) fn reset_message(from: &str, to_email: &str, reset_url: &str, ttl_minutes: i64) -> EmailMessage {
    let validity = if ttl_minutes % 60 == 0 {
        let hours = ttl_minutes / 60;
        if hours == 1 {
            "1 hour".to_string()
        } else {
            format!("{hours} hours")
        }
    } else {
        format!("{ttl_minutes} minutes")
    };
    EmailMessage {
        from: from.to_string(),
        to_email: to_email.to_string(),
        subject: "Password reset for your portal account".to_string(),
        body: format!(
            "Hello,\n\nUse the following link to set your password (expires in {validity}):\n\n{reset_url}\n\nIf you did not request this, ignore this email.\n"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    struct FailingSender;

    #[async_trait]
    impl EmailSender for FailingSender {
        async fn send(&self, _message: &EmailMessage) -> Result<()> {
            Err(anyhow!("relay refused"))
        }
    }

    struct SlowSender;

    #[async_trait]
    impl EmailSender for SlowSender {
        async fn send(&self, _message: &EmailMessage) -> Result<()> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
    }

    fn message() -> EmailMessage {
        reset_message("no-reply@portal.test", "a@example.com", "https://x/reset?token=t", 60)
    }

    #[tokio::test]
    async fn log_sender_delivers() {
        assert_eq!(
            deliver(&LogEmailSender, &message(), Duration::from_secs(1)).await,
            Delivery::Delivered
        );
    }

    #[tokio::test]
    async fn sender_error_is_reported_as_failed() {
        assert_eq!(
            deliver(&FailingSender, &message(), Duration::from_secs(1)).await,
            Delivery::Failed
        );
    }

    #[tokio::test]
    async fn slow_sender_times_out() {
        assert_eq!(
            deliver(&SlowSender, &message(), Duration::from_millis(50)).await,
            Delivery::Failed
        );
    }

    #[test]
    fn reset_message_mentions_link_and_expiry() {
        let msg = message();
        assert!(msg.body.contains("https://x/reset?token=t"));
        assert!(msg.body.contains("expires in 1 hour"));
        assert!(msg.body.contains("If you did not request this"));
        let msg = reset_message("f", "t", "u", 90);
        assert!(msg.body.contains("expires in 90 minutes"));
    }
}
