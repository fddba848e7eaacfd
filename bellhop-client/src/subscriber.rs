//! Change feed subscriber.
//!
//! Two independent loops feed the session reducer:
//!
//! - the subscription loop holds a live [`ChangeFeed`] subscription and
//!   reconnects on a fixed-delay policy when it drops
//! - the poll loop fetches unread notifications and visible orders on a
//!   timer, regardless of subscription health
//!
//! The poll is the correctness path and the subscription is the latency
//! path; merges downstream are idempotent, so overlap between the two
//! is harmless by construction.

use std::sync::Arc;

use shared::{ChangeEvent, Notification, Order};
use tokio::sync::{mpsc, watch, RwLock};
use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;
use crate::feed::ChangeFeed;
use crate::reconcile::Viewer;
use crate::retry::{RetryPolicy, Scheduler};
use crate::store::DataStore;

/// Health of the push subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedStatus {
    Connecting,
    Subscribed,
    /// Subscription lost; polling still bounds staleness.
    Degraded,
    /// Reconnects exhausted or permission denied; polling only.
    Closed,
}

/// One unit of input for the session reducer.
#[derive(Debug)]
pub enum FeedInput {
    /// Live event from the push subscription.
    Event(ChangeEvent),
    /// Poll result: current unread notifications and visible orders.
    Snapshot {
        notifications: Vec<Notification>,
        orders: Vec<Order>,
    },
    /// Poll failure (reported, never fatal).
    PollFailed(PipelineError),
    /// Subscription failure (drives the degraded warning).
    FeedError(PipelineError),
    /// Subscription (re)established; clears the degraded warning.
    FeedRestored,
}

/// Drives the subscription and poll loops.
#[derive(Clone)]
pub struct ChangeFeedSubscriber {
    pub feed: Arc<dyn ChangeFeed>,
    pub store: Arc<dyn DataStore>,
    pub scheduler: Arc<dyn Scheduler>,
    pub viewer: Arc<RwLock<Viewer>>,
    pub input_tx: mpsc::Sender<FeedInput>,
    pub status_tx: watch::Sender<FeedStatus>,
    pub token: CancellationToken,
    pub retry: RetryPolicy,
    pub poll_interval: std::time::Duration,
    pub unread_limit: usize,
    pub order_limit: usize,
}

impl ChangeFeedSubscriber {
    /// Subscription loop. Holds the live subscription, forwards its
    /// events, and reconnects on drop until the policy is exhausted.
    pub async fn run_subscription(self) {
        let mut attempt: u32 = 0;
        loop {
            if self.token.is_cancelled() {
                return;
            }
            match self.feed.subscribe().await {
                Ok(mut subscription) => {
                    attempt = 0;
                    let _ = self.status_tx.send(FeedStatus::Subscribed);
                    let _ = self.input_tx.send(FeedInput::FeedRestored).await;
                    tracing::info!("Change feed subscribed");
                    loop {
                        tokio::select! {
                            _ = self.token.cancelled() => return,
                            event = subscription.recv() => match event {
                                Ok(event) => {
                                    if self.input_tx.send(FeedInput::Event(event)).await.is_err() {
                                        return;
                                    }
                                }
                                Err(e) => {
                                    if self.report_feed_error(e).await {
                                        return;
                                    }
                                    break;
                                }
                            }
                        }
                    }
                }
                Err(e) => {
                    if self.report_feed_error(e).await {
                        return;
                    }
                }
            }

            let _ = self.status_tx.send(FeedStatus::Degraded);
            attempt += 1;
            let Some(delay) = self.retry.next_delay(attempt) else {
                tracing::warn!(attempt, "Reconnect attempts exhausted, polling only");
                let _ = self.status_tx.send(FeedStatus::Closed);
                return;
            };
            tracing::info!(attempt, delay_ms = delay.as_millis() as u64, "Reconnecting change feed");
            tokio::select! {
                _ = self.token.cancelled() => return,
                _ = self.scheduler.sleep(delay) => {}
            }
        }
    }

    /// Forward a subscription error to the reducer. Returns `true` when
    /// the loop must stop (permission problems do not heal on retry).
    async fn report_feed_error(&self, error: PipelineError) -> bool {
        let fatal = error.is_permission();
        tracing::warn!(error = %error, "Change feed subscription failed");
        let _ = self.input_tx.send(FeedInput::FeedError(error)).await;
        if fatal {
            let _ = self.status_tx.send(FeedStatus::Closed);
        }
        fatal
    }

    /// Safety-net poll loop. Runs one immediate poll so a fresh session
    /// starts from current state, then polls on the configured interval
    /// until shutdown.
    pub async fn run_poll(self) {
        self.poll_once().await;
        loop {
            tokio::select! {
                _ = self.token.cancelled() => return,
                _ = self.scheduler.sleep(self.poll_interval) => {}
            }
            self.poll_once().await;
        }
    }

    /// One fetch of unread notifications and visible orders, delivered
    /// to the reducer as a snapshot. Also used for on-demand re-checks.
    pub async fn poll_once(&self) {
        let viewer = self.viewer.read().await.clone();
        let notifications = self.store.fetch_unread_notifications(self.unread_limit).await;
        let orders = self.store.fetch_orders(&viewer, self.order_limit).await;
        let input = match (notifications, orders) {
            (Ok(notifications), Ok(orders)) => FeedInput::Snapshot {
                notifications,
                orders,
            },
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!(error = %e, "Poll failed");
                FeedInput::PollFailed(e)
            }
        };
        let _ = self.input_tx.send(input).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::MemoryFeed;
    use crate::retry::{InstantScheduler, TokioScheduler};
    use crate::store::MemoryStore;
    use std::time::Duration;

    fn subscriber(
        feed: Arc<MemoryFeed>,
        store: Arc<MemoryStore>,
        retry: RetryPolicy,
    ) -> (
        ChangeFeedSubscriber,
        mpsc::Receiver<FeedInput>,
        watch::Receiver<FeedStatus>,
    ) {
        let (input_tx, input_rx) = mpsc::channel(64);
        let (status_tx, status_rx) = watch::channel(FeedStatus::Connecting);
        let subscriber = ChangeFeedSubscriber {
            feed,
            store,
            scheduler: Arc::new(TokioScheduler),
            viewer: Arc::new(RwLock::new(Viewer::anonymous("c1"))),
            input_tx,
            status_tx,
            token: CancellationToken::new(),
            retry,
            poll_interval: Duration::from_secs(30),
            unread_limit: 50,
            order_limit: 100,
        };
        (subscriber, input_rx, status_rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_flow_through_subscription() {
        let feed = Arc::new(MemoryFeed::new());
        let store = Arc::new(MemoryStore::new());
        let (subscriber, mut input_rx, _status) =
            subscriber(feed.clone(), store, RetryPolicy::fixed(Duration::from_secs(5)));
        let token = subscriber.token.clone();
        tokio::spawn(subscriber.run_subscription());
        tokio::task::yield_now().await;

        assert!(matches!(
            input_rx.recv().await.unwrap(),
            FeedInput::FeedRestored
        ));

        let event = ChangeEvent::notification_insert(Notification::system("n1", "hi"));
        feed.publish(event.clone()).await;

        match input_rx.recv().await.unwrap() {
            FeedInput::Event(received) => assert_eq!(received, event),
            other => panic!("unexpected input: {other:?}"),
        }
        token.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_after_disconnect() {
        let feed = Arc::new(MemoryFeed::new());
        let store = Arc::new(MemoryStore::new());
        let (subscriber, mut input_rx, mut status_rx) = subscriber(
            feed.clone(),
            store,
            RetryPolicy::fixed(Duration::from_secs(5)),
        );
        let token = subscriber.token.clone();
        tokio::spawn(subscriber.run_subscription());
        tokio::task::yield_now().await;
        assert_eq!(*status_rx.borrow_and_update(), FeedStatus::Subscribed);
        assert!(matches!(
            input_rx.recv().await.unwrap(),
            FeedInput::FeedRestored
        ));

        feed.disconnect_all().await;
        // The drop is reported, then the loop re-subscribes.
        match input_rx.recv().await.unwrap() {
            FeedInput::FeedError(e) => assert!(e.is_connectivity()),
            other => panic!("unexpected input: {other:?}"),
        }
        assert!(matches!(
            input_rx.recv().await.unwrap(),
            FeedInput::FeedRestored
        ));
        // Watch updates coalesce, so wait until re-subscribed rather
        // than asserting each intermediate status.
        while *status_rx.borrow_and_update() != FeedStatus::Subscribed {
            status_rx.changed().await.unwrap();
        }

        // The new subscription is live.
        tokio::task::yield_now().await;
        let event = ChangeEvent::notification_insert(Notification::system("n2", "back"));
        feed.publish(event.clone()).await;
        match input_rx.recv().await.unwrap() {
            FeedInput::Event(received) => assert_eq!(received, event),
            other => panic!("unexpected input: {other:?}"),
        }
        token.cancel();
    }

    struct DownFeed;

    #[async_trait::async_trait]
    impl ChangeFeed for DownFeed {
        async fn subscribe(&self) -> crate::error::PipelineResult<crate::feed::FeedSubscription> {
            Err(PipelineError::Connectivity("endpoint unreachable".into()))
        }
    }

    #[tokio::test]
    async fn test_capped_policy_closes_feed() {
        let store = Arc::new(MemoryStore::new());
        let scheduler = Arc::new(InstantScheduler::new());
        let (input_tx, mut input_rx) = mpsc::channel(64);
        let (status_tx, mut status_rx) = watch::channel(FeedStatus::Connecting);
        let subscriber = ChangeFeedSubscriber {
            feed: Arc::new(DownFeed),
            store,
            scheduler: scheduler.clone(),
            viewer: Arc::new(RwLock::new(Viewer::anonymous("c1"))),
            input_tx,
            status_tx,
            token: CancellationToken::new(),
            retry: RetryPolicy::capped(Duration::from_millis(10), 2),
            poll_interval: Duration::from_secs(30),
            unread_limit: 50,
            order_limit: 100,
        };
        let handle = tokio::spawn(subscriber.run_subscription());
        handle.await.unwrap();
        assert_eq!(*status_rx.borrow_and_update(), FeedStatus::Closed);

        // Initial attempt plus two retries, each reported.
        let mut errors = 0;
        while let Ok(input) = input_rx.try_recv() {
            assert!(matches!(input, FeedInput::FeedError(_)));
            errors += 1;
        }
        assert_eq!(errors, 3);
        // Each retry waited the configured fixed delay.
        assert_eq!(
            scheduler.slept(),
            vec![Duration::from_millis(10), Duration::from_millis(10)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_delivers_snapshots_on_interval() {
        let feed = Arc::new(MemoryFeed::new());
        let store = Arc::new(MemoryStore::new());
        store.insert_notification(Notification::new_order("n1", "o1", "order"));
        let (subscriber, mut input_rx, _status) =
            subscriber(feed, store, RetryPolicy::fixed(Duration::from_secs(5)));
        let token = subscriber.token.clone();
        tokio::spawn(subscriber.run_poll());

        // Immediate poll on startup.
        match input_rx.recv().await.unwrap() {
            FeedInput::Snapshot { notifications, .. } => {
                assert_eq!(notifications.len(), 1);
            }
            other => panic!("unexpected input: {other:?}"),
        }
        // And again after the interval elapses.
        match input_rx.recv().await.unwrap() {
            FeedInput::Snapshot { notifications, .. } => {
                assert_eq!(notifications.len(), 1);
            }
            other => panic!("unexpected input: {other:?}"),
        }
        token.cancel();
    }
}
