//! Outbound message transport used for one-time codes and subscriber
//! notifications. Delivery is at-least-once; receivers must tolerate
//! duplicates.

mod telegram;

use async_trait::async_trait;

use crate::error::SendError;
use crate::store::Deadline;

pub use telegram::TelegramSender;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Sender: Send + Sync {
    async fn send(&self, deadline: &Deadline, recipient: &str, payload: &str)
        -> Result<(), SendError>;
}

/// Development transport that writes every message to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSender;

#[async_trait]
impl Sender for LogSender {
    async fn send(
        &self,
        deadline: &Deadline,
        recipient: &str,
        payload: &str,
    ) -> Result<(), SendError> {
        if deadline.is_expired() {
            return Err(SendError::DeadlineExceeded);
        }
        log::info!("Mock: message for {}: {}", recipient, payload);
        Ok(())
    }
}
