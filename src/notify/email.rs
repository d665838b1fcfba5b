use std::collections::HashMap;

use lettre::message::{Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use log::warn;

use crate::config::SmtpConfig;
use crate::store::Media;

/// Sends the per-requester cleanup summary over SMTP. Mirrors the
/// "`new()` returns `None` when not configured, best-effort per-recipient
/// loop" shape this crate's email ancestor uses.
pub struct EmailService {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl EmailService {
    pub fn new(config: &SmtpConfig) -> anyhow::Result<Self> {
        let creds = Credentials::new(config.username.clone(), config.password.clone());
        let transport = if config.port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
        }
        .port(config.port)
        .credentials(creds)
        .build();

        Ok(Self {
            transport,
            from: config.from_address.parse()?,
        })
    }

    /// Groups pending items by requester email and sends one summary per
    /// recipient; cleanup_date is `now + library cleanup_delay_days` for
    /// that item, dry_run reflects the run's actual mode.
    pub async fn send_cleanup_summary(
        &self,
        items_by_requester: &HashMap<String, Vec<Media>>,
        server_url: &str,
        dry_run: bool,
    ) {
        for (requester, items) in items_by_requester {
            if let Err(e) = self.send_one_summary(requester, items, server_url, dry_run).await {
                warn!("failed to send cleanup summary email to {requester}: {e}");
            }
        }
    }

    async fn send_one_summary(
        &self,
        to: &str,
        items: &[Media],
        server_url: &str,
        dry_run: bool,
    ) -> anyhow::Result<()> {
        let subject = if dry_run {
            "Jellysweep: items scheduled for cleanup (dry run)"
        } else {
            "Jellysweep: items scheduled for cleanup"
        };

        let mut list = String::new();
        for item in items {
            list.push_str(&format!(
                "- {} (deletes {})\n",
                item.title,
                item.default_delete_at.format("%Y-%m-%d")
            ));
        }
        let text = format!(
            "The following items you requested are scheduled for cleanup:\n\n{list}\nManage your requests at {server_url}\n"
        );
        let html = wrap_html(&list, server_url);

        let email = Message::builder()
            .from(self.from.clone())
            .to(to.parse()?)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(SinglePart::plain(text))
                    .singlepart(SinglePart::html(html)),
            )?;

        self.transport.send(email).await?;
        Ok(())
    }
}

fn wrap_html(list_text: &str, server_url: &str) -> String {
    let items_html = list_text
        .lines()
        .map(|line| format!("<li>{}</li>", html_escape(line.trim_start_matches("- "))))
        .collect::<String>();

    format!(
        "<html><body><h2>Jellysweep cleanup summary</h2><ul>{items_html}</ul>\
         <p><a href=\"{server_url}\">Manage your requests</a></p></body></html>"
    )
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}
