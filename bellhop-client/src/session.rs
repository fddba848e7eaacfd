//! Notification session.
//!
//! # Architecture
//!
//! ```text
//!  subscription loop ──┐
//!  poll loop ──────────┼── mpsc FeedInput ──► reducer task ──► watch: unread,
//!  agent bridge ───────┘                        │                ringing, badge,
//!                                               │                status, warning
//!  AckHandle ───────── mpsc SessionCommand ─────┘
//! ```
//!
//! The reducer task is the only writer of the tracked sets and the
//! alert state, so there is no locking discipline to get wrong: push
//! events, poll snapshots, agent commands, and user gestures are
//! serialized through its two inboxes.

use std::sync::Arc;

use bellhop_agent::bridge::BridgeEndpoint;
use shared::agent::{AgentCommand, AgentMessage, PlatformAlertPayload};
use shared::{ChangeEvent, ClientIdentity, FeedRecord, Notification, Order};
use tokio::sync::{broadcast, mpsc, oneshot, watch, RwLock};
use tokio_util::sync::CancellationToken;

use crate::alert::AlertEngine;
use crate::chime::ChimeChain;
use crate::config::SessionConfig;
use crate::error::PipelineError;
use crate::feed::ChangeFeed;
use crate::reconcile::{NotificationSet, OrderSet, ReconciliationEngine, Viewer};
use crate::retry::{RetryPolicy, TokioScheduler};
use crate::store::DataStore;
use crate::subscriber::{ChangeFeedSubscriber, FeedInput, FeedStatus};
use crate::tasks::{SessionTasks, TaskKind};

const INPUT_BUFFER: usize = 256;
const COMMAND_BUFFER: usize = 32;

/// Commands from the acknowledgement handle to the reducer.
pub(crate) enum SessionCommand {
    MarkAllRead {
        reply: oneshot::Sender<usize>,
    },
    ToggleSound {
        reply: oneshot::Sender<bool>,
    },
    Silence,
    Authenticate {
        user_id: String,
    },
    Unread {
        reply: oneshot::Sender<Vec<Notification>>,
    },
    Orders {
        reply: oneshot::Sender<Vec<Order>>,
    },
}

/// Everything needed to start a session.
pub struct SessionBuilder {
    config: SessionConfig,
    feed: Arc<dyn ChangeFeed>,
    store: Arc<dyn DataStore>,
    identity: ClientIdentity,
    user_id: Option<String>,
    chain: Arc<ChimeChain>,
    agent: Option<BridgeEndpoint>,
}

impl SessionBuilder {
    pub fn new(
        feed: Arc<dyn ChangeFeed>,
        store: Arc<dyn DataStore>,
        identity: ClientIdentity,
        chain: Arc<ChimeChain>,
    ) -> Self {
        Self {
            config: SessionConfig::default(),
            feed,
            store,
            identity,
            user_id: None,
            chain,
            agent: None,
        }
    }

    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Start already authenticated.
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Connect a background agent over its bridge endpoint.
    pub fn with_agent(mut self, endpoint: BridgeEndpoint) -> Self {
        self.agent = Some(endpoint);
        self
    }
}

/// A running notification session.
pub struct NotifySession {
    command_tx: mpsc::Sender<SessionCommand>,
    unread_rx: watch::Receiver<usize>,
    status_rx: watch::Receiver<FeedStatus>,
    ringing_rx: watch::Receiver<bool>,
    badge_rx: watch::Receiver<bool>,
    warning_rx: watch::Receiver<Option<String>>,
    viewer: Arc<RwLock<Viewer>>,
    tasks: SessionTasks,
}

impl NotifySession {
    /// Start the subscription, poll, and reducer loops.
    pub fn start(builder: SessionBuilder) -> Self {
        let initial_viewer = match &builder.user_id {
            Some(user_id) => Viewer::authenticated(builder.identity.client_id.clone(), user_id),
            None => Viewer::anonymous(builder.identity.client_id.clone()),
        };
        let viewer = Arc::new(RwLock::new(initial_viewer.clone()));

        let (input_tx, input_rx) = mpsc::channel(INPUT_BUFFER);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (unread_tx, unread_rx) = watch::channel(0usize);
        let (status_tx, status_rx) = watch::channel(FeedStatus::Connecting);
        let (warning_tx, warning_rx) = watch::channel(None);

        let engine = AlertEngine::new(builder.config.sound_enabled, builder.chain);
        let ringing_rx = engine.ringing();
        let badge_rx = engine.badge();

        let mut tasks = SessionTasks::new();
        let token = tasks.shutdown_token();

        let subscriber = ChangeFeedSubscriber {
            feed: builder.feed,
            store: Arc::clone(&builder.store),
            scheduler: Arc::new(TokioScheduler),
            viewer: Arc::clone(&viewer),
            input_tx,
            status_tx,
            token: token.clone(),
            retry: RetryPolicy {
                delay: builder.config.reconnect_delay,
                max_attempts: builder.config.max_reconnect_attempts,
            },
            poll_interval: builder.config.poll_interval,
            unread_limit: builder.config.unread_fetch_limit,
            order_limit: builder.config.order_fetch_limit,
        };
        tasks.spawn(
            "feed_subscription",
            TaskKind::Listener,
            subscriber.clone().run_subscription(),
        );
        tasks.spawn("safety_poll", TaskKind::Periodic, subscriber.clone().run_poll());

        let reducer = Reducer {
            engine,
            recon: ReconciliationEngine::new(initial_viewer),
            orders: OrderSet::new(),
            notifications: NotificationSet::new(),
            store: builder.store,
            subscriber,
            viewer: Arc::clone(&viewer),
            agent: builder.agent,
            unread_tx,
            warning_tx,
        };
        tasks.spawn(
            "session_reducer",
            TaskKind::Worker,
            reducer.run(input_rx, command_rx, token.clone()),
        );

        Self {
            command_tx,
            unread_rx,
            status_rx,
            ringing_rx,
            badge_rx,
            warning_rx,
            viewer,
            tasks,
        }
    }

    /// Handle for acknowledgements and queries.
    pub fn handle(&self) -> crate::ack::AckHandle {
        crate::ack::AckHandle::new(self.command_tx.clone())
    }

    /// Live unread count.
    pub fn unread(&self) -> watch::Receiver<usize> {
        self.unread_rx.clone()
    }

    /// Push subscription health.
    pub fn feed_status(&self) -> watch::Receiver<FeedStatus> {
        self.status_rx.clone()
    }

    /// Whether the chime is sounding.
    pub fn ringing(&self) -> watch::Receiver<bool> {
        self.ringing_rx.clone()
    }

    /// Silent-failure badge (all audio tiers failed).
    pub fn badge(&self) -> watch::Receiver<bool> {
        self.badge_rx.clone()
    }

    /// Current user-facing warning, if any.
    pub fn warning(&self) -> watch::Receiver<Option<String>> {
        self.warning_rx.clone()
    }

    /// Current viewer credentials.
    pub async fn viewer(&self) -> Viewer {
        self.viewer.read().await.clone()
    }

    /// Stop every loop and wait for them to finish.
    pub async fn shutdown(self) {
        self.tasks.shutdown().await;
    }
}

struct Reducer {
    engine: AlertEngine,
    recon: ReconciliationEngine,
    orders: OrderSet,
    notifications: NotificationSet,
    store: Arc<dyn DataStore>,
    subscriber: ChangeFeedSubscriber,
    viewer: Arc<RwLock<Viewer>>,
    agent: Option<BridgeEndpoint>,
    unread_tx: watch::Sender<usize>,
    warning_tx: watch::Sender<Option<String>>,
}

impl Reducer {
    async fn run(
        mut self,
        mut input_rx: mpsc::Receiver<FeedInput>,
        mut command_rx: mpsc::Receiver<SessionCommand>,
        token: CancellationToken,
    ) {
        // Adopt the viewer decided at startup.
        self.recon.set_viewer(self.viewer.read().await.clone());
        let mut agent_rx = self.agent.as_ref().map(|endpoint| endpoint.subscribe());

        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                input = input_rx.recv() => match input {
                    Some(input) => self.handle_input(input).await,
                    None => return,
                },
                command = command_rx.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => return,
                },
                message = recv_agent(&mut agent_rx) => {
                    self.handle_agent(message).await;
                }
            }
        }
    }

    async fn handle_input(&mut self, input: FeedInput) {
        match input {
            FeedInput::Event(event) => self.apply_event(event).await,
            FeedInput::Snapshot {
                notifications,
                orders,
            } => {
                for order in orders {
                    self.recon.merge_order(&mut self.orders, order.into());
                }
                for notification in notifications {
                    self.merge_notification(notification);
                }
                // A successful poll clears a connectivity warning.
                self.warning_tx.send_if_modified(|warning| {
                    if warning.is_some() {
                        *warning = None;
                        true
                    } else {
                        false
                    }
                });
                self.refresh().await;
            }
            FeedInput::PollFailed(e) | FeedInput::FeedError(e) => self.report(e),
            FeedInput::FeedRestored => {
                let _ = self.warning_tx.send(None);
            }
        }
    }

    async fn apply_event(&mut self, event: ChangeEvent) {
        match event.record {
            FeedRecord::Order(patch) => {
                let outcome = self.recon.merge_order(&mut self.orders, patch);
                tracing::debug!(?outcome, "Merged order event");
            }
            FeedRecord::Notification(notification) => {
                self.merge_notification(notification);
            }
        }
        self.refresh().await;
    }

    fn merge_notification(&mut self, notification: Notification) {
        use crate::reconcile::MergeOutcome;
        let unread = !notification.is_read;
        let payload = alert_payload(&notification, &self.orders);
        let outcome = self.notifications.merge(notification);
        // Only a genuinely new unread row is worth waking the agent for.
        if outcome == MergeOutcome::Inserted && unread {
            if let Some(endpoint) = &self.agent {
                endpoint.post(AgentMessage::new_notification(&payload));
            }
        }
    }

    /// Recompute unread-derived state after any merge.
    async fn refresh(&mut self) {
        let unread = self.notifications.unread_ids();
        if unread.is_empty() {
            // Read flags can flip remotely (another device); stop the
            // chime when nothing is left unread.
            self.engine.all_read().await;
        } else {
            self.engine.observe_unread(&unread).await;
        }
        let _ = self.unread_tx.send(unread.len());
    }

    fn report(&self, error: PipelineError) {
        let message = if error.is_permission() {
            format!("Access denied by the backend, check configuration: {error}")
        } else {
            format!("Connection trouble, retrying: {error}")
        };
        let _ = self.warning_tx.send(Some(message));
    }

    async fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::MarkAllRead { reply } => {
                let flipped = self.notifications.mark_all_read();
                self.engine.acknowledge_all().await;
                let _ = self.unread_tx.send(0);
                // Local state is already read; the remote write is best
                // effort and a failure only surfaces as a warning.
                if !flipped.is_empty()
                    && let Err(e) = self.store.mark_notifications_read(&flipped).await
                {
                    tracing::warn!(error = %e, "Remote mark-read failed, local state kept");
                    self.report(e);
                }
                let _ = reply.send(flipped.len());
            }
            SessionCommand::ToggleSound { reply } => {
                let enabled = self
                    .engine
                    .toggle_sound(self.notifications.unread_count() > 0)
                    .await;
                let _ = reply.send(enabled);
            }
            SessionCommand::Silence => {
                self.engine.silence().await;
            }
            SessionCommand::Authenticate { user_id } => {
                let viewer = {
                    let mut viewer = self.viewer.write().await;
                    viewer.user_id = Some(user_id);
                    viewer.clone()
                };
                self.recon.set_viewer(viewer);
                // Fetch immediately so orders placed before login appear
                // without waiting for the next poll tick.
                self.subscriber.poll_once().await;
            }
            SessionCommand::Unread { reply } => {
                let mut unread: Vec<Notification> = self
                    .notifications
                    .unread_ids()
                    .iter()
                    .filter_map(|id| self.notifications.get(id).cloned())
                    .collect();
                unread.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                let _ = reply.send(unread);
            }
            SessionCommand::Orders { reply } => {
                let _ = reply.send(self.orders.recent());
            }
        }
    }

    async fn handle_agent(&mut self, message: Option<AgentMessage>) {
        let Some(message) = message else { return };
        match message.decode() {
            Some(AgentCommand::PlaySound) => self.engine.ring().await,
            Some(AgentCommand::StopSound) => self.engine.silence().await,
            Some(AgentCommand::CheckNotifications) => {
                self.subscriber.poll_once().await;
            }
            // Agent-bound commands echoed on a shared transport.
            Some(_) | None => {}
        }
    }
}

fn alert_payload(notification: &Notification, orders: &OrderSet) -> PlatformAlertPayload {
    match notification.order_id.as_deref() {
        Some(order_id) => {
            // The tracked order carries the display number; an untracked
            // id is shown as-is.
            let order_number = orders
                .get(order_id)
                .map(|order| order.order_number.clone())
                .unwrap_or_else(|| order_id.to_string());
            PlatformAlertPayload::for_order(
                order_id,
                order_number,
                notification.message.clone(),
                format!("/orders/{order_id}"),
            )
        }
        None => PlatformAlertPayload::announcement(notification.message.clone()),
    }
}

/// Receive from the agent bridge; parks forever when no agent is
/// attached (or the bridge closed) so the select arm never fires.
async fn recv_agent(rx: &mut Option<broadcast::Receiver<AgentMessage>>) -> Option<AgentMessage> {
    match rx {
        Some(receiver) => match receiver.recv().await {
            Ok(message) => Some(message),
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                tracing::warn!(missed, "Agent bridge lagged");
                None
            }
            Err(broadcast::error::RecvError::Closed) => {
                tracing::debug!("Agent bridge closed");
                std::future::pending().await
            }
        },
        None => std::future::pending().await,
    }
}
