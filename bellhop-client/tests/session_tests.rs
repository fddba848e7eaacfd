//! End-to-end session behavior over in-memory transports.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bellhop_agent::bridge::AgentBridge;
use bellhop_client::{
    Chime, ChimeChain, MemoryFeed, MemoryStore, NotifySession, PipelineResult, SessionBuilder,
    SessionConfig,
};
use shared::agent::AgentCommand;
use shared::{ChangeEvent, ClientIdentity, CustomerInfo, Notification, Order, OrderPatch,
    OrderStatus, OwnerRef, PaymentStatus};

/// Silent chime that counts starts, so tests can assert on alert
/// delivery without an audio device.
struct CountingChime {
    starts: AtomicUsize,
    playing: AtomicBool,
}

impl CountingChime {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            starts: AtomicUsize::new(0),
            playing: AtomicBool::new(false),
        })
    }

    fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }
}

impl Chime for CountingChime {
    fn name(&self) -> &str {
        "counting"
    }

    fn start(&self) -> PipelineResult<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.playing.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) {
        self.playing.store(false, Ordering::SeqCst);
    }
}

struct Harness {
    feed: Arc<MemoryFeed>,
    store: Arc<MemoryStore>,
    chime: Arc<CountingChime>,
    identity: ClientIdentity,
}

impl Harness {
    fn new() -> Self {
        Self {
            feed: Arc::new(MemoryFeed::new()),
            store: Arc::new(MemoryStore::new()),
            chime: CountingChime::new(),
            identity: ClientIdentity::generate(),
        }
    }

    fn builder(&self) -> SessionBuilder {
        let chain = Arc::new(ChimeChain::new(vec![
            self.chime.clone() as Arc<dyn Chime>
        ]));
        SessionBuilder::new(
            self.feed.clone(),
            self.store.clone(),
            self.identity.clone(),
            chain,
        )
        .with_config(SessionConfig::fast())
    }

    fn order(&self, id: &str, owner: OwnerRef, created_at: i64) -> Order {
        Order {
            id: id.into(),
            order_number: format!("A-{id}"),
            customer: CustomerInfo {
                name: "Ada".into(),
                phone: None,
                note: None,
            },
            total_amount: 12.0,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Unpaid,
            owner,
            admin_read_at: None,
            admin_done_at: None,
            created_at,
            updated_at: created_at,
            items: vec![],
        }
    }
}

/// Let the paused-time loops run for the given virtual duration.
async fn run_for(duration: Duration) {
    tokio::time::sleep(duration).await;
}

async fn wait_unread(session: &NotifySession, expected: usize) {
    let mut unread = session.unread();
    tokio::time::timeout(Duration::from_secs(60), async {
        while *unread.borrow_and_update() != expected {
            unread.changed().await.unwrap();
        }
    })
    .await
    .unwrap_or_else(|_| panic!("unread count never reached {expected}"));
}

#[tokio::test(start_paused = true)]
async fn test_push_and_poll_overlap_alerts_once() {
    let h = Harness::new();
    let notification = Notification::new_order("n1", "o1", "1x Margherita");
    // The same row arrives via the poll snapshot and the push event.
    h.store.insert_notification(notification.clone());
    let session = NotifySession::start(h.builder());
    run_for(Duration::from_millis(50)).await;
    h.feed
        .publish(ChangeEvent::notification_insert(notification))
        .await;

    wait_unread(&session, 1).await;
    // Several more poll cycles redeliver the same row.
    run_for(Duration::from_secs(3)).await;

    assert_eq!(*session.unread().borrow(), 1);
    assert_eq!(h.chime.starts(), 1, "duplicate deliveries must not re-alert");
    assert!(h.chime.is_playing());
    session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_mark_all_read_stops_chime_and_persists() {
    let h = Harness::new();
    h.store
        .insert_notification(Notification::new_order("n1", "o1", "order"));
    let session = NotifySession::start(h.builder());
    wait_unread(&session, 1).await;

    let flipped = session.handle().mark_all_read().await.unwrap();
    assert_eq!(flipped, 1);
    assert_eq!(*session.unread().borrow(), 0);
    assert!(!h.chime.is_playing());
    assert!(h.store.notification("n1").unwrap().is_read);

    // Later polls see the read row and must not resurrect it.
    run_for(Duration::from_secs(3)).await;
    assert_eq!(*session.unread().borrow(), 0);
    assert!(!h.chime.is_playing());
    session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_silence_holds_until_new_notification() {
    let h = Harness::new();
    h.store
        .insert_notification(Notification::new_order("n1", "o1", "first"));
    let session = NotifySession::start(h.builder());
    wait_unread(&session, 1).await;
    assert!(h.chime.is_playing());

    session.handle().silence().await.unwrap();
    run_for(Duration::from_millis(50)).await;
    assert!(!h.chime.is_playing());

    // Redelivery of the same unread row stays silent.
    run_for(Duration::from_secs(3)).await;
    assert!(!h.chime.is_playing());
    assert_eq!(h.chime.starts(), 1);

    // A genuinely new order overrides the silence.
    h.feed
        .publish(ChangeEvent::notification_insert(Notification::new_order(
            "n2", "o2", "second",
        )))
        .await;
    wait_unread(&session, 2).await;
    assert!(h.chime.is_playing());
    assert_eq!(h.chime.starts(), 2);
    session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_toggle_while_ringing_stops_and_new_order_resumes() {
    let h = Harness::new();
    h.store
        .insert_notification(Notification::new_order("n1", "o1", "order"));
    let session = NotifySession::start(h.builder());
    wait_unread(&session, 1).await;
    assert!(h.chime.is_playing());

    // While alerting the toggle is a stop; the preference stays on.
    let handle = session.handle();
    assert!(handle.toggle_sound().await.unwrap());
    run_for(Duration::from_millis(50)).await;
    assert!(!h.chime.is_playing());

    // A genuinely new notification resumes the alert.
    h.feed
        .publish(ChangeEvent::notification_insert(Notification::new_order(
            "n2", "o2", "second",
        )))
        .await;
    wait_unread(&session, 2).await;
    assert!(h.chime.is_playing());
    session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_sound_preference_off_keeps_arrivals_quiet() {
    let h = Harness::new();
    let session = NotifySession::start(h.builder());
    run_for(Duration::from_millis(50)).await;

    // Toggled while idle, the gesture flips the preference off.
    let handle = session.handle();
    assert!(!handle.toggle_sound().await.unwrap());

    h.feed
        .publish(ChangeEvent::notification_insert(Notification::new_order(
            "n1", "o1", "quiet",
        )))
        .await;
    wait_unread(&session, 1).await;
    assert!(!h.chime.is_playing());

    // Re-enabling with unread pending rings immediately.
    assert!(handle.toggle_sound().await.unwrap());
    run_for(Duration::from_millis(50)).await;
    assert!(h.chime.is_playing());
    session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_polling_covers_feed_outage() {
    let h = Harness::new();
    let session = NotifySession::start(h.builder());
    run_for(Duration::from_millis(100)).await;

    h.feed.disconnect_all().await;
    // While the subscription is down, a new row lands in the store and
    // the safety poll picks it up.
    h.store
        .insert_notification(Notification::new_order("n1", "o1", "during outage"));
    wait_unread(&session, 1).await;

    // The subscription recovers on its own and delivers pushes again.
    run_for(Duration::from_secs(10)).await;
    h.feed
        .publish(ChangeEvent::notification_insert(Notification::new_order(
            "n2", "o2", "after recovery",
        )))
        .await;
    wait_unread(&session, 2).await;
    session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_anonymous_to_authenticated_handoff() {
    let h = Harness::new();
    let client_id = h.identity.client_id.clone();
    h.store
        .insert_order(h.order("o1", OwnerRef::client(&client_id), 100));
    h.store.insert_order(h.order("o2", OwnerRef::user("u1"), 200));

    let session = NotifySession::start(h.builder());
    run_for(Duration::from_secs(1)).await;

    let handle = session.handle();
    let before = handle.orders().await.unwrap();
    assert_eq!(before.len(), 1, "only the anonymous order is visible");
    assert_eq!(before[0].id, "o1");

    handle.authenticate("u1").await.unwrap();
    run_for(Duration::from_secs(1)).await;

    let after = handle.orders().await.unwrap();
    assert_eq!(after.len(), 2, "pre-login order must stay tracked");
    // Most recent first.
    assert_eq!(after[0].id, "o2");
    session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_status_update_reaches_tracked_order() {
    let h = Harness::new();
    let client_id = h.identity.client_id.clone();
    h.store
        .insert_order(h.order("o1", OwnerRef::client(&client_id), 100));
    let session = NotifySession::start(h.builder());
    run_for(Duration::from_secs(1)).await;

    // Staff-side update event without an owner field.
    h.feed
        .publish(ChangeEvent::order_update(OrderPatch {
            id: "o1".into(),
            order_number: None,
            customer: None,
            total_amount: None,
            status: Some(OrderStatus::Ready),
            payment_status: None,
            owner: None,
            admin_read_at: None,
            admin_done_at: None,
            created_at: None,
            updated_at: Some(500),
            items: None,
        }))
        .await;
    run_for(Duration::from_millis(100)).await;

    let orders = session.handle().orders().await.unwrap();
    assert_eq!(orders[0].status, OrderStatus::Ready);
    session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_new_notification_is_forwarded_to_agent() {
    let h = Harness::new();
    let bridge = AgentBridge::new(16);
    let mut agent_rx = bridge.agent().subscribe();

    let session = NotifySession::start(h.builder().with_agent(bridge.foreground()));
    run_for(Duration::from_millis(50)).await;

    h.feed
        .publish(ChangeEvent::notification_insert(Notification::new_order(
            "n1", "o1", "1x Margherita",
        )))
        .await;

    let message = tokio::time::timeout(Duration::from_secs(10), agent_rx.recv())
        .await
        .unwrap()
        .unwrap();
    match message.decode() {
        Some(AgentCommand::NewNotification(payload)) => {
            assert_eq!(payload.data.order_id.as_deref(), Some("o1"));
        }
        other => panic!("unexpected agent message: {other:?}"),
    }
    session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_agent_play_and_stop_commands() {
    let h = Harness::new();
    let bridge = AgentBridge::new(16);
    let session = NotifySession::start(h.builder().with_agent(bridge.foreground()));
    run_for(Duration::from_millis(50)).await;

    bridge.agent().post(shared::agent::AgentMessage::play_sound());
    run_for(Duration::from_millis(50)).await;
    assert!(h.chime.is_playing());

    bridge.agent().post(shared::agent::AgentMessage::stop_sound());
    run_for(Duration::from_millis(50)).await;
    assert!(!h.chime.is_playing());
    session.shutdown().await;
}
