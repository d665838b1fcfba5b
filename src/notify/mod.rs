mod email;
mod ntfy;
mod webpush;

use std::collections::HashMap;

pub use email::EmailService;
pub use ntfy::NtfyClient;
pub use webpush::{PushOutcome, PushSubscription, WebPushNotifier};

use crate::store::Media;

/// Aggregates the three independent notification channels (§4.10). Each
/// channel is optional — absent configuration simply means that channel's
/// fan-out calls are no-ops — and a failure in one channel is logged and
/// never propagated to the caller.
#[derive(Default)]
pub struct Notifier {
    pub email: Option<EmailService>,
    pub ntfy: Option<NtfyClient>,
    pub webpush: Option<WebPushNotifier>,
}

impl Notifier {
    pub async fn notify_marked_for_cleanup(
        &self,
        items_by_requester: &HashMap<String, Vec<Media>>,
        total: usize,
        per_library: &[(String, usize)],
        server_url: &str,
        dry_run: bool,
    ) {
        if let Some(email) = &self.email {
            email.send_cleanup_summary(items_by_requester, server_url, dry_run).await;
        }
        if let Some(ntfy) = &self.ntfy {
            ntfy.send_run_summary(total, per_library).await;
        }
    }

    pub async fn notify_deletions_complete(&self, deleted_titles: &[String]) {
        if let Some(ntfy) = &self.ntfy {
            ntfy.send_deletion_summary(deleted_titles).await;
        }
    }

    /// Sends a webpush notification to the requester about their keep
    /// request's outcome. Returns whether the subscription should be
    /// dropped by the caller.
    pub async fn notify_keep_request_outcome(
        &self,
        subscription: &PushSubscription,
        accepted: bool,
    ) -> PushOutcome {
        let payload = if accepted {
            r#"{"title":"Keep request approved","body":"Your request to keep this item was approved."}"#
        } else {
            r#"{"title":"Keep request declined","body":"Your request to keep this item was declined."}"#
        };
        match &self.webpush {
            Some(webpush) => webpush.send(subscription, payload).await,
            None => PushOutcome::Failed,
        }
    }
}
