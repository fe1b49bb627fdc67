//! Notifier - best-effort operator messages
//!
//! Delivery failures are logged and swallowed; they never reach the trade cycle.

pub mod messages;
pub mod telegram;

pub use messages::format_gbp;
pub use telegram::TelegramClient;

use async_trait::async_trait;

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Fire-and-forget delivery
    async fn send(&self, text: &str);
}
