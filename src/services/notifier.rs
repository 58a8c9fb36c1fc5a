//! Rate-limited mail notifications.

use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::error::{AppError, Result};
use crate::models::{Item, MailConfig, NotifyConfig, StockSnapshot, StockStatus};
use crate::services::throttle::ThrottleMarker;

/// Outbound channel for a notification body.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, mail: &MailConfig, body: &str) -> Result<()>;
}

/// Sends HTML mail through an authenticated STARTTLS relay.
#[derive(Debug, Default, Clone)]
pub struct SmtpMailer;

impl SmtpMailer {
    fn build_message(mail: &MailConfig, body: &str) -> Result<Message> {
        Message::builder()
            .from(mail.from.parse().map_err(AppError::mail)?)
            .to(mail.to.parse().map_err(AppError::mail)?)
            .subject(mail.subject.as_str())
            .header(ContentType::TEXT_HTML)
            .body(body.to_string())
            .map_err(AppError::mail)
    }
}

#[async_trait]
impl Transport for SmtpMailer {
    async fn send(&self, mail: &MailConfig, body: &str) -> Result<()> {
        let message = Self::build_message(mail, body)?;
        let relay = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&mail.host)?
            .port(mail.port)
            .credentials(Credentials::new(mail.user.clone(), mail.pass.clone()))
            .build();

        relay.send(message).await?;
        log::info!("Mail sent to {}", mail.to);
        Ok(())
    }
}

/// What happened to a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyOutcome {
    Sent,
    /// Skipped; another send is allowed after `remaining`.
    Suppressed { remaining: Duration },
}

/// Sends notifications, skipping them while the cooldown is active.
pub struct Notifier {
    transport: Box<dyn Transport>,
}

impl Notifier {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Send `body` unless a notification went out within the cooldown.
    ///
    /// `now` is checked against the cooldown. The marker is set to the clock
    /// time once the transport reports success.
    pub async fn notify(
        &self,
        mail: &MailConfig,
        throttle: &NotifyConfig,
        body: &str,
        now: SystemTime,
    ) -> Result<NotifyOutcome> {
        log::info!("Notify: {}", body.replace('\n', " "));

        let marker = ThrottleMarker::from_config(throttle);
        if let Some(remaining) = marker.remaining(now) {
            log::info!(
                "Notification suppressed, cooldown ends in {} min",
                remaining.as_secs() / 60
            );
            return Ok(NotifyOutcome::Suppressed { remaining });
        }

        self.transport.send(mail, body).await?;
        marker.touch(SystemTime::now())?;
        Ok(NotifyOutcome::Sent)
    }

    /// Send `body` regardless of the cooldown, still refreshing the marker.
    pub async fn notify_now(&self, mail: &MailConfig, throttle: &NotifyConfig, body: &str) -> Result<()> {
        self.transport.send(mail, body).await?;
        ThrottleMarker::from_config(throttle).touch(SystemTime::now())
    }
}

/// Compose the message listing every tracked item and its state.
pub fn compose_message(items: &[Item], snapshot: &StockSnapshot) -> String {
    let lines: Vec<String> = items
        .iter()
        .map(|item| {
            let status = StockStatus::from(snapshot.get(&item.name).unwrap_or(false));
            match status {
                StockStatus::InStock => format!("- {}: <b>{}</b>", item.name, status),
                StockStatus::OutOfStock => format!("- {}: {}", item.name, status),
            }
        })
        .collect();

    format!("Inventory status has changed.<br />\n{}", lines.join("<br />\n"))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Transport that records every body it is asked to send.
    #[derive(Clone, Default)]
    pub(crate) struct RecordingTransport {
        pub sent: Arc<Mutex<Vec<String>>>,
        pub fail: bool,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send(&self, _mail: &MailConfig, body: &str) -> Result<()> {
            if self.fail {
                return Err(AppError::mail("relay refused login"));
            }
            self.sent.lock().unwrap().push(body.to_string());
            Ok(())
        }
    }

    fn throttle(dir: &TempDir) -> NotifyConfig {
        NotifyConfig {
            marker_path: dir.path().join("notify"),
            cooldown_secs: 8 * 3600,
        }
    }

    #[test]
    fn test_compose_message() {
        let items = vec![
            Item::new("UDM", "https://store.example/udm"),
            Item::new("U6-Lite", "https://store.example/u6"),
        ];
        let snapshot: StockSnapshot = [("UDM", true), ("U6-Lite", false)].into_iter().collect();

        assert_eq!(
            compose_message(&items, &snapshot),
            "Inventory status has changed.<br />\n- UDM: <b>OK</b><br />\n- U6-Lite: NG"
        );
    }

    #[tokio::test]
    async fn test_throttle_limits_transport_calls() {
        let tmp = TempDir::new().unwrap();
        let throttle = throttle(&tmp);
        let transport = RecordingTransport::default();
        let notifier = Notifier::new(Box::new(transport.clone()));
        let mail = MailConfig::default();
        let hour = Duration::from_secs(3600);

        let first = notifier
            .notify(&mail, &throttle, "one", SystemTime::now())
            .await
            .unwrap();
        let second = notifier
            .notify(&mail, &throttle, "two", SystemTime::now() + hour)
            .await
            .unwrap();
        let third = notifier
            .notify(&mail, &throttle, "three", SystemTime::now() + 9 * hour)
            .await
            .unwrap();

        assert_eq!(first, NotifyOutcome::Sent);
        assert!(matches!(second, NotifyOutcome::Suppressed { .. }));
        assert_eq!(third, NotifyOutcome::Sent);
        assert_eq!(*transport.sent.lock().unwrap(), vec!["one", "three"]);
    }

    #[tokio::test]
    async fn test_marker_records_send_time() {
        let tmp = TempDir::new().unwrap();
        let throttle = throttle(&tmp);
        let notifier = Notifier::new(Box::new(RecordingTransport::default()));
        let round_start = SystemTime::now() - Duration::from_secs(600);
        let before_send = SystemTime::now();

        notifier
            .notify(&MailConfig::default(), &throttle, "body", round_start)
            .await
            .unwrap();

        let marker = ThrottleMarker::from_config(&throttle);
        assert!(marker.last_sent().unwrap() >= before_send);
    }

    #[tokio::test]
    async fn test_failed_send_leaves_marker_untouched() {
        let tmp = TempDir::new().unwrap();
        let throttle = throttle(&tmp);
        let notifier = Notifier::new(Box::new(RecordingTransport {
            fail: true,
            ..Default::default()
        }));

        let result = notifier
            .notify(&MailConfig::default(), &throttle, "body", SystemTime::now())
            .await;

        assert!(result.is_err());
        assert!(!throttle.marker_path.exists());
    }

    #[test]
    fn test_build_message_rejects_bad_address() {
        let mail = MailConfig {
            from: "not an address".into(),
            to: "you@example.com".into(),
            ..MailConfig::default()
        };
        assert!(SmtpMailer::build_message(&mail, "hi").is_err());
    }
}
