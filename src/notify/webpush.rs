use log::warn;
use serde::{Deserialize, Serialize};
use web_push::{
    ContentEncoding, SubscriptionInfo, VapidSignatureBuilder, WebPushClient, WebPushError,
    WebPushMessageBuilder,
};

use crate::config::WebPushConfig;

/// A subscription registered via `POST /api/webpush/subscribe`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushSubscription {
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
}

impl From<&PushSubscription> for SubscriptionInfo {
    fn from(s: &PushSubscription) -> Self {
        SubscriptionInfo::new(s.endpoint.clone(), s.p256dh.clone(), s.auth.clone())
    }
}

/// VAPID-signed push sender for keep-request accept/decline notifications.
pub struct WebPushNotifier {
    client: web_push::IsahcWebPushClient,
    private_key: Vec<u8>,
    subject: String,
}

#[derive(Debug)]
pub enum PushOutcome {
    Sent,
    /// The subscription's endpoint no longer exists; the caller should
    /// remove it from storage.
    SubscriptionGone,
    Failed,
}

impl WebPushNotifier {
    pub fn new(config: &WebPushConfig) -> anyhow::Result<Self> {
        let private_key = base64_url_decode(&config.vapid_private_key)?;
        Ok(Self {
            client: web_push::IsahcWebPushClient::new()?,
            private_key,
            subject: config.vapid_subject.clone(),
        })
    }

    pub async fn send(&self, subscription: &PushSubscription, payload: &str) -> PushOutcome {
        let info: SubscriptionInfo = subscription.into();
        let sig_builder = match VapidSignatureBuilder::from_pem(self.private_key.as_slice(), &info) {
            Ok(b) => b,
            Err(e) => {
                warn!("failed to build VAPID signature: {e}");
                return PushOutcome::Failed;
            }
        };
        let signature = match sig_builder.add_claim("sub", self.subject.clone()).build() {
            Ok(s) => s,
            Err(e) => {
                warn!("failed to sign VAPID claim: {e}");
                return PushOutcome::Failed;
            }
        };

        let mut builder = WebPushMessageBuilder::new(&info);
        builder.set_payload(ContentEncoding::Aes128Gcm, payload.as_bytes());
        builder.set_vapid_signature(signature);

        let message = match builder.build() {
            Ok(m) => m,
            Err(e) => {
                warn!("failed to build push message: {e}");
                return PushOutcome::Failed;
            }
        };

        match self.client.send(message).await {
            Ok(()) => PushOutcome::Sent,
            Err(WebPushError::EndpointNotValid) | Err(WebPushError::EndpointNotFound) => {
                PushOutcome::SubscriptionGone
            }
            Err(e) => {
                warn!("webpush send failed: {e}");
                PushOutcome::Failed
            }
        }
    }
}

fn base64_url_decode(s: &str) -> anyhow::Result<Vec<u8>> {
    use base64::Engine;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(s)?)
}
