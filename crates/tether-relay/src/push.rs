//! Push-notification gateway boundary.
//!
//! The real gateway (APNs/FCM forwarding) is an external collaborator;
//! the relay depends only on this trait. Pushes are fire-and-forget:
//! delivery failures are the gateway's problem to log, never the
//! relay's to retry.

use async_trait::async_trait;
use tracing::info;

/// One push notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushNotification {
    /// Short title line.
    pub title: String,
    /// Body text.
    pub body: String,
}

/// Delivers push notifications to registered device tokens.
#[async_trait]
pub trait PushGateway: Send + Sync {
    /// Deliver `notification` to one device token. Best-effort.
    async fn send(&self, push_token: &str, notification: &PushNotification);
}

/// Default gateway: logs instead of delivering.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPushGateway;

#[async_trait]
impl PushGateway for LogPushGateway {
    async fn send(&self, push_token: &str, notification: &PushNotification) {
        info!(
            token = %push_token,
            title = %notification.title,
            body = %notification.body,
            "push (log-only)"
        );
    }
}
