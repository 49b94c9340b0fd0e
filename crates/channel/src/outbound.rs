//! Outbound seam and send discipline.
//!
//! Replies ride the free reply token; pushes count against the platform's
//! monthly quota. The dispatcher swallows and logs send failures so an
//! unreachable platform never aborts flow handling.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use {async_trait::async_trait, tracing::warn};

use crate::{Result, message::OutboundMessage};

/// Platform send seam. The gateway provides the real HTTP implementation;
/// tests substitute a recorder.
#[async_trait]
pub trait Outbound: Send + Sync {
    /// Send using a reply token. Tokens are single-use and short-lived.
    async fn reply(&self, reply_token: &str, messages: Vec<OutboundMessage>) -> Result<()>;

    /// Push to a user without a token. Quota-bearing.
    async fn push(&self, user_id: &str, messages: Vec<OutboundMessage>) -> Result<()>;
}

/// Running counts of sends, for the health endpoint.
#[derive(Debug, Default)]
pub struct QuotaLedger {
    replies: AtomicU64,
    pushes: AtomicU64,
}

impl QuotaLedger {
    pub fn count_reply(&self) {
        self.replies.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count_push(&self) {
        self.pushes.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn replies(&self) -> u64 {
        self.replies.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn pushes(&self) -> u64 {
        self.pushes.load(Ordering::Relaxed)
    }
}

/// Fire-and-forget wrapper over an [`Outbound`].
#[derive(Clone)]
pub struct Dispatcher {
    outbound: Arc<dyn Outbound>,
    ledger: Arc<QuotaLedger>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(outbound: Arc<dyn Outbound>) -> Self {
        Self {
            outbound,
            ledger: Arc::new(QuotaLedger::default()),
        }
    }

    #[must_use]
    pub fn ledger(&self) -> Arc<QuotaLedger> {
        Arc::clone(&self.ledger)
    }

    /// Reply if a token is present, otherwise push. Failures are logged and
    /// swallowed.
    pub async fn respond(
        &self,
        user_id: &str,
        reply_token: Option<&str>,
        messages: Vec<OutboundMessage>,
    ) {
        if messages.is_empty() {
            return;
        }
        match reply_token {
            Some(token) => {
                self.ledger.count_reply();
                if let Err(e) = self.outbound.reply(token, messages.clone()).await {
                    warn!(user_id, error = %e, "reply failed, falling back to push");
                    self.push(user_id, messages).await;
                }
            },
            None => self.push(user_id, messages).await,
        }
    }

    /// Push now, logging any failure.
    pub async fn push(&self, user_id: &str, messages: Vec<OutboundMessage>) {
        if messages.is_empty() {
            return;
        }
        self.ledger.count_push();
        if let Err(e) = self.outbound.push(user_id, messages).await {
            warn!(user_id, error = %e, "push failed");
        }
    }

    /// Push after a delay, off the caller's task. Used for the verification
    /// follow-up so the synchronous reply lands first.
    pub fn push_later(&self, user_id: &str, messages: Vec<OutboundMessage>, delay: Duration) {
        let dispatcher = self.clone();
        let user_id = user_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            dispatcher.push(&user_id, messages).await;
        });
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        replies: Mutex<Vec<(String, Vec<OutboundMessage>)>>,
        pushes: Mutex<Vec<(String, Vec<OutboundMessage>)>>,
        fail_replies: bool,
    }

    #[async_trait]
    impl Outbound for Recorder {
        async fn reply(&self, reply_token: &str, messages: Vec<OutboundMessage>) -> Result<()> {
            if self.fail_replies {
                return Err(crate::Error::message("token expired"));
            }
            self.replies
                .lock()
                .unwrap()
                .push((reply_token.to_string(), messages));
            Ok(())
        }

        async fn push(&self, user_id: &str, messages: Vec<OutboundMessage>) -> Result<()> {
            self.pushes
                .lock()
                .unwrap()
                .push((user_id.to_string(), messages));
            Ok(())
        }
    }

    #[tokio::test]
    async fn respond_prefers_reply_token() {
        let recorder = Arc::new(Recorder::default());
        let dispatcher = Dispatcher::new(Arc::clone(&recorder) as Arc<dyn Outbound>);
        dispatcher
            .respond("U1", Some("rt1"), vec![OutboundMessage::text("hi")])
            .await;
        assert_eq!(recorder.replies.lock().unwrap().len(), 1);
        assert!(recorder.pushes.lock().unwrap().is_empty());
        assert_eq!(dispatcher.ledger().replies(), 1);
    }

    #[tokio::test]
    async fn failed_reply_falls_back_to_push() {
        let recorder = Arc::new(Recorder {
            fail_replies: true,
            ..Recorder::default()
        });
        let dispatcher = Dispatcher::new(Arc::clone(&recorder) as Arc<dyn Outbound>);
        dispatcher
            .respond("U1", Some("rt1"), vec![OutboundMessage::text("hi")])
            .await;
        let pushes = recorder.pushes.lock().unwrap();
        assert_eq!(pushes.len(), 1);
        assert_eq!(pushes[0].0, "U1");
    }

    #[tokio::test(start_paused = true)]
    async fn push_later_waits_out_the_delay() {
        let recorder = Arc::new(Recorder::default());
        let dispatcher = Dispatcher::new(Arc::clone(&recorder) as Arc<dyn Outbound>);
        dispatcher.push_later(
            "U1",
            vec![OutboundMessage::text("verified")],
            Duration::from_secs(2),
        );
        tokio::time::sleep(Duration::from_millis(1900)).await;
        assert!(recorder.pushes.lock().unwrap().is_empty());
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(recorder.pushes.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_batches_are_dropped() {
        let recorder = Arc::new(Recorder::default());
        let dispatcher = Dispatcher::new(Arc::clone(&recorder) as Arc<dyn Outbound>);
        dispatcher.respond("U1", Some("rt1"), Vec::new()).await;
        dispatcher.push("U1", Vec::new()).await;
        assert_eq!(dispatcher.ledger().replies(), 0);
        assert_eq!(dispatcher.ledger().pushes(), 0);
    }
}
