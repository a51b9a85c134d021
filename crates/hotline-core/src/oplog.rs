//! Operator log: mirrors notable events into a Telegram channel.
//!
//! Strictly best-effort. A broken log channel must never take a flow down
//! with it, so every failure here degrades to a tracing line.

use std::sync::Arc;

use crate::{
    domain::{ChatId, MessageRef},
    formatting::clamp_message,
    messaging::MessengerPort,
};

#[derive(Clone)]
pub struct OpsLog {
    messenger: Arc<dyn MessengerPort>,
    channel: Option<ChatId>,
}

impl OpsLog {
    pub fn new(messenger: Arc<dyn MessengerPort>, channel: Option<ChatId>) -> Self {
        Self { messenger, channel }
    }

    /// Channel-less log for tests and for setups without a log channel.
    pub fn disabled(messenger: Arc<dyn MessengerPort>) -> Self {
        Self {
            messenger,
            channel: None,
        }
    }

    /// Record an event. Returns the channel message when one was posted so
    /// the caller can delete it later (the keep-alive loop does).
    pub async fn record(&self, text: &str) -> Option<MessageRef> {
        tracing::info!(target: "hotline::oplog", "{text}");

        let channel = self.channel?;
        let body = clamp_message(text);
        match self.messenger.send_html(channel, &body).await {
            Ok(message) => Some(message),
            Err(err) => {
                tracing::warn!(error = %err, "failed to post to the log channel");
                None
            }
        }
    }

    /// Delete a previously posted log message, ignoring failures.
    pub async fn forget(&self, message: MessageRef) {
        if let Err(err) = self.messenger.delete_message(message).await {
            tracing::debug!(error = %err, "failed to delete a log channel message");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingMessenger;

    #[tokio::test]
    async fn record_posts_to_the_channel_and_clamps_long_text() {
        let messenger = Arc::new(RecordingMessenger::new());
        let oplog = OpsLog::new(messenger.clone(), Some(ChatId(-42)));

        let posted = oplog.record("deploy finished").await;
        assert!(posted.is_some());

        let long = "x".repeat(4096);
        oplog.record(&long).await;

        let sent = messenger.sent_to(ChatId(-42));
        assert_eq!(sent[0], "deploy finished");
        assert_eq!(sent[1].chars().count(), 4000);
    }

    #[tokio::test]
    async fn record_without_a_channel_posts_nothing() {
        let messenger = Arc::new(RecordingMessenger::new());
        let oplog = OpsLog::disabled(messenger.clone());

        assert!(oplog.record("quiet").await.is_none());
        assert!(messenger.sent_to(ChatId(-42)).is_empty());
    }
}
