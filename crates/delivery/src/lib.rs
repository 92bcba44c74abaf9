//! Push delivery: the VAPID-signed Web Push client, structured delivery
//! errors, and the broadcast dispatcher that fans one notification out to
//! every valid, registered subscriber.

pub mod client;
pub mod dispatcher;
pub mod error;

pub use client::{PushClient, WebPushDelivery};
pub use dispatcher::Dispatcher;
pub use error::DeliveryError;
