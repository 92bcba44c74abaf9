use std::time::Duration;

use async_trait::async_trait;
use web_push::{ContentEncoding, SubscriptionInfo, VapidSignatureBuilder, WebPushMessageBuilder};

use fairpush_common::types::Subscriber;

use crate::error::DeliveryError;

/// Wire-level push exchange: deliver one serialized envelope to one
/// subscriber's push channel.
#[async_trait]
pub trait PushClient: Send + Sync + 'static {
    async fn deliver(&self, subscriber: &Subscriber, payload: &[u8]) -> Result<(), DeliveryError>;
}

/// Production client speaking the Web Push protocol with VAPID signing.
pub struct WebPushDelivery {
    client: web_push::WebPushClient,
    private_key: String,
    subject: String,
    timeout: Duration,
}

impl WebPushDelivery {
    /// `private_key` is the base64url-encoded ES256 VAPID signing key;
    /// `subject` becomes the VAPID `sub` claim. Every send is bounded by
    /// `timeout` so a hung exchange cannot pin a worker slot.
    pub fn new(
        private_key: String,
        subject: String,
        timeout: Duration,
    ) -> Result<Self, web_push::WebPushError> {
        let client = web_push::WebPushClient::new()?;
        Ok(Self {
            client,
            private_key,
            subject,
            timeout,
        })
    }
}

#[async_trait]
impl PushClient for WebPushDelivery {
    async fn deliver(&self, subscriber: &Subscriber, payload: &[u8]) -> Result<(), DeliveryError> {
        let subscription_info = SubscriptionInfo::new(
            subscriber.endpoint.clone(),
            subscriber.p256dh.clone(),
            subscriber.auth.clone(),
        );

        let mut builder = WebPushMessageBuilder::new(&subscription_info)?;
        builder.set_payload(ContentEncoding::Aes128Gcm, payload);

        let mut signature_builder = VapidSignatureBuilder::from_base64(
            &self.private_key,
            web_push::URL_SAFE_NO_PAD,
            &subscription_info,
        )?;
        signature_builder.add_claim("sub", self.subject.as_str());
        builder.set_vapid_signature(signature_builder.build()?);

        let message = builder.build()?;
        match tokio::time::timeout(self.timeout, self.client.send(message)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(DeliveryError::from_web_push(err)),
            Err(_) => Err(DeliveryError::Timeout(self.timeout)),
        }
    }
}
