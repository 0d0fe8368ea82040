//! Notification transport port. The evaluator is the sole emitter.

pub mod telegram;

use async_trait::async_trait;

use crate::errors::GatewayError;

pub use telegram::TelegramNotifier;

/// Pluggable notification channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one multi-line UTF-8 message.
    async fn send(&self, text: &str) -> Result<(), GatewayError>;
}

/// Fallback notifier for deployments without transport credentials:
/// logs the rendered message instead of delivering it.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, text: &str) -> Result<(), GatewayError> {
        tracing::info!(chars = text.len(), "notification (log transport):\n{text}");
        Ok(())
    }
}
