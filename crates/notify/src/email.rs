//! SMTP email notifier via `lettre` with TLS support.
//!
//! Recipients come from each notice; a fixed admin list is Bcc'd on
//! everything.

use crate::traits::{Notification, Notifier, NotifyError};
use lettre::{
    message::Mailbox, transport::smtp::authentication::Credentials, AsyncSmtpTransport,
    AsyncTransport, Message, Tokio1Executor,
};

fn parse_mailbox(addr: &str) -> Result<Mailbox, NotifyError> {
    addr.parse()
        .map_err(|e: lettre::address::AddressError| NotifyError::Config(format!("{addr}: {e}")))
}

/// Sends notices as emails via SMTP.
#[derive(Debug)]
pub struct EmailNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    /// Always Bcc'd, never shown to the primary recipient.
    bcc: Vec<Mailbox>,
}

impl EmailNotifier {
    /// Build an `EmailNotifier` from SMTP configuration.
    ///
    /// - `smtp_port`: defaults to 587.
    /// - `tls`: `None` or `Some(true)` enables STARTTLS; port 465 always
    ///   uses TLS regardless of this flag.
    ///
    /// SMTP credentials are resolved from the `SMTP_USERNAME` and `SMTP_PASSWORD`
    /// environment variables. If both are set, they are passed to the transport;
    /// otherwise the connection is unauthenticated.
    pub fn from_config(
        smtp_host: &str,
        smtp_port: Option<u16>,
        tls: Option<bool>,
        from: &str,
        bcc: &[String],
    ) -> Result<Self, NotifyError> {
        let from_mailbox = parse_mailbox(from)?;
        let bcc_mailboxes = bcc
            .iter()
            .map(|addr| parse_mailbox(addr))
            .collect::<Result<Vec<_>, _>>()?;

        let port = smtp_port.unwrap_or(587);
        let use_tls = tls.unwrap_or(true);

        let mut builder = if port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(smtp_host)
                .map_err(|e| NotifyError::Config(e.to_string()))?
                .port(port)
        } else if use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(smtp_host)
                .map_err(|e| NotifyError::Config(e.to_string()))?
                .port(port)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(smtp_host).port(port)
        };

        if let (Ok(username), Ok(password)) =
            (std::env::var("SMTP_USERNAME"), std::env::var("SMTP_PASSWORD"))
        {
            builder = builder.credentials(Credentials::new(username, password));
        }

        Ok(Self {
            transport: builder.build(),
            from: from_mailbox,
            bcc: bcc_mailboxes,
        })
    }

    /// Assemble the message for one notice.
    fn build_message(&self, notification: &Notification) -> Result<Message, NotifyError> {
        let to = notification
            .recipients
            .iter()
            .map(|addr| parse_mailbox(addr))
            .collect::<Result<Vec<_>, _>>()?;

        if to.is_empty() && self.bcc.is_empty() {
            return Err(NotifyError::Config(
                "at least one recipient is required".to_string(),
            ));
        }

        let mut builder = Message::builder().from(self.from.clone());
        for recipient in &to {
            builder = builder.to(recipient.clone());
        }
        for admin in self.bcc.iter().filter(|admin| !to.contains(admin)) {
            builder = builder.bcc(admin.clone());
        }

        builder
            .subject(&notification.subject)
            .body(notification.body.clone())
            .map_err(|e| NotifyError::Smtp(e.to_string()))
    }
}

#[async_trait::async_trait]
impl Notifier for EmailNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let email = self.build_message(notification)?;

        self.transport
            .send(email)
            .await
            .map_err(|e| NotifyError::Smtp(e.to_string()))?;

        tracing::info!(
            channel = "email",
            subject = %notification.subject,
            recipients = notification.recipients.len(),
            bcc = self.bcc.len(),
            "notice delivered"
        );

        Ok(())
    }

    fn channel_name(&self) -> &str {
        "email"
    }
}
