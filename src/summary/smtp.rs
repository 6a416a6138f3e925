//! SMTP delivery for session summaries.

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, info};

use super::{render_transcript, SummaryDispatcher, SummaryError};
use crate::config::SummaryConfig;
use crate::transcript::{CallerId, Turn};

/// Sends rendered transcripts through an SMTP relay to the fixed
/// configuration-supplied recipient.
#[derive(Debug)]
pub struct SmtpSummaryDispatcher {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    sender: Mailbox,
    recipient: Mailbox,
}

impl SmtpSummaryDispatcher {
    /// Build a dispatcher from config. Absent host, credentials, or addresses
    /// mean delivery cannot work; that is reported as `NotConfigured` so the
    /// dialog layer can apologize instead of crashing mid-call.
    pub fn from_config(config: &SummaryConfig) -> Result<Self, SummaryError> {
        let host = config
            .smtp_host
            .as_deref()
            .filter(|h| !h.trim().is_empty())
            .ok_or(SummaryError::NotConfigured("summary.smtp_host"))?;
        let username = config
            .smtp_username
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or(SummaryError::NotConfigured("summary.smtp_username"))?;
        let password = config
            .smtp_password
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .ok_or(SummaryError::NotConfigured("summary.smtp_password"))?;

        let sender = parse_mailbox(config.from_address.as_deref(), "summary.from_address")?;
        let recipient = parse_mailbox(config.recipient.as_deref(), "summary.recipient")?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .map_err(|e| SummaryError::Transport(e.to_string()))?
            .port(config.smtp_port)
            .credentials(Credentials::new(username.to_string(), password.to_string()))
            .build();

        Ok(Self {
            transport,
            sender,
            recipient,
        })
    }

    /// Probe the SMTP relay without sending mail. Used by `voxtutor doctor`.
    pub async fn verify(&self) -> Result<(), SummaryError> {
        self.transport
            .test_connection()
            .await
            .map_err(|e| SummaryError::Transport(e.to_string()))
            .and_then(|ok| {
                if ok {
                    Ok(())
                } else {
                    Err(SummaryError::Transport("connection test failed".into()))
                }
            })
    }
}

fn parse_mailbox(value: Option<&str>, field: &'static str) -> Result<Mailbox, SummaryError> {
    let raw = value
        .filter(|v| !v.trim().is_empty())
        .ok_or(SummaryError::NotConfigured(field))?;
    raw.parse()
        .map_err(|e| SummaryError::Message(format!("{field} is not a valid address: {e}")))
}

#[async_trait]
impl SummaryDispatcher for SmtpSummaryDispatcher {
    async fn dispatch(&self, caller: &CallerId, turns: &[Turn]) -> Result<(), SummaryError> {
        let body = render_transcript(caller, turns);

        let message = Message::builder()
            .from(self.sender.clone())
            .to(self.recipient.clone())
            .subject(format!("Study session transcript ({} questions)", turns.len()))
            .body(body)
            .map_err(|e| SummaryError::Message(e.to_string()))?;

        debug!(caller = %caller, turns = turns.len(), "sending session summary");
        self.transport
            .send(message)
            .await
            .map_err(|e| SummaryError::Transport(e.to_string()))?;

        info!(caller = %caller, turns = turns.len(), "session summary delivered");
        Ok(())
    }

    fn name(&self) -> &str {
        "smtp"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_config() -> SummaryConfig {
        SummaryConfig {
            enabled: true,
            smtp_host: Some("smtp.example.com".into()),
            smtp_port: 587,
            smtp_username: Some("tutor@example.com".into()),
            smtp_password: Some("hunter2".into()),
            from_address: Some("VoxTutor <tutor@example.com>".into()),
            recipient: Some("student@example.com".into()),
        }
    }

    #[test]
    fn from_config_accepts_complete_settings() {
        assert!(SmtpSummaryDispatcher::from_config(&full_config()).is_ok());
    }

    #[test]
    fn missing_password_is_not_configured() {
        let config = SummaryConfig {
            smtp_password: None,
            ..full_config()
        };
        match SmtpSummaryDispatcher::from_config(&config) {
            Err(SummaryError::NotConfigured(field)) => {
                assert_eq!(field, "summary.smtp_password");
            }
            other => panic!("expected NotConfigured, got {other:?}"),
        }
    }

    #[test]
    fn blank_recipient_is_not_configured() {
        let config = SummaryConfig {
            recipient: Some("   ".into()),
            ..full_config()
        };
        assert!(matches!(
            SmtpSummaryDispatcher::from_config(&config),
            Err(SummaryError::NotConfigured("summary.recipient"))
        ));
    }

    #[test]
    fn malformed_recipient_is_a_message_error() {
        let config = SummaryConfig {
            recipient: Some("not-an-address".into()),
            ..full_config()
        };
        assert!(matches!(
            SmtpSummaryDispatcher::from_config(&config),
            Err(SummaryError::Message(_))
        ));
    }

    #[test]
    fn dispatcher_name() {
        let dispatcher = SmtpSummaryDispatcher::from_config(&full_config()).unwrap();
        assert_eq!(dispatcher.name(), "smtp");
    }
}
