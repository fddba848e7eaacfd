//! In-process walkthrough of the notification pipeline.
//!
//! Runs the whole session against in-memory transports: places an
//! order, streams the feed events a backend would emit, rings the
//! chime (real audio device if one is present), then acknowledges.
//!
//! ```sh
//! cargo run -p bellhop-client --example in_process_demo
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use bellhop_agent::alerts::LogAlertSink;
use bellhop_agent::bridge::AgentBridge;
use bellhop_agent::lifecycle::{AgentConfig, BackgroundAgent};
use bellhop_client::{
    ChimeChain, IdentityResolver, MemoryFeed, MemoryStore, NotifySession, SessionBuilder,
    SessionConfig,
};
use shared::{ChangeEvent, CustomerInfo, Notification, Order, OrderItem, OrderPatch, OrderStatus,
    OwnerRef, PaymentStatus};

#[tokio::main]
async fn main() -> Result<()> {
    bellhop_client::logger::init_logger_with_file(Some("debug"), None);

    let identity = IdentityResolver::in_memory().resolve();
    println!("client identity: {}", identity.client_id);

    let feed = Arc::new(MemoryFeed::new());
    let store = Arc::new(MemoryStore::new());
    let chain = Arc::new(ChimeChain::standard(None, Duration::from_secs(2)));

    // Background agent on its own bridge.
    let bridge = AgentBridge::new(64);
    let agent = BackgroundAgent::new(&bridge, Arc::new(LogAlertSink), AgentConfig::default());
    tokio::spawn(agent.run());

    let session = NotifySession::start(
        SessionBuilder::new(feed.clone(), store.clone(), identity.clone(), chain)
            .with_config(SessionConfig::fast())
            .with_agent(bridge.foreground()),
    );
    let handle = session.handle();

    // A customer places an order; the backend inserts the row and a
    // notification, then both arrive over the change feed.
    let order = Order {
        id: "ord_1".into(),
        order_number: "A-1001".into(),
        customer: CustomerInfo {
            name: "Walk-in".into(),
            phone: None,
            note: None,
        },
        total_amount: 21.5,
        status: OrderStatus::Pending,
        payment_status: PaymentStatus::Unpaid,
        owner: OwnerRef::client(&identity.client_id),
        admin_read_at: None,
        admin_done_at: None,
        created_at: shared::util::now_millis(),
        updated_at: shared::util::now_millis(),
        items: vec![OrderItem {
            product_id: "p1".into(),
            name: "Margherita".into(),
            price: 10.75,
            quantity: 2,
            note: None,
        }],
    };
    store.insert_order(order.clone());
    feed.publish(ChangeEvent::order_insert(order)).await;

    let notification = Notification::new_order("ntf_1", "ord_1", "2x Margherita");
    store.insert_notification(notification.clone());
    feed.publish(ChangeEvent::notification_insert(notification))
        .await;

    tokio::time::sleep(Duration::from_millis(300)).await;
    println!("unread: {}", *session.unread().borrow());
    println!("ringing: {}", *session.ringing().borrow());

    // Kitchen marks the order ready; the partial update has no owner
    // field but the order is already tracked.
    feed.publish(ChangeEvent::order_update(OrderPatch {
        id: "ord_1".into(),
        order_number: None,
        customer: None,
        total_amount: None,
        status: Some(OrderStatus::Ready),
        payment_status: None,
        owner: None,
        admin_read_at: None,
        admin_done_at: None,
        created_at: None,
        updated_at: Some(shared::util::now_millis()),
        items: None,
    }))
    .await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    for order in handle.orders().await? {
        println!("order {} -> {:?}", order.order_number, order.status);
    }

    // Let the chime ring briefly, then acknowledge.
    tokio::time::sleep(Duration::from_secs(3)).await;
    let flipped = handle.mark_all_read().await?;
    println!("acknowledged {flipped} notification(s)");
    println!("ringing: {}", *session.ringing().borrow());

    session.shutdown().await;
    Ok(())
}
