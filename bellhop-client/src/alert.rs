//! Alert state machine and delivery engine.
//!
//! The state machine is pure: it takes observations (unread ids, user
//! gestures) and returns the side effect to perform. The engine applies
//! those effects to the chime chain and publishes UI-facing state over
//! watch channels. Keeping the decision logic pure makes the dedup and
//! silence rules testable without any audio device.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::watch;

use crate::chime::ChimeChain;
use crate::error::PipelineError;

/// Whether the chime is currently sounding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertPhase {
    Idle,
    Ringing,
}

/// Side effect requested by a state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertEffect {
    None,
    StartRinging,
    StopRinging,
}

/// Pure alert decision state.
///
/// Invariants:
/// - an id already seen this session never re-triggers the chime
/// - manual silence holds until a genuinely new id arrives
/// - disabling sound while ringing also silences the current batch
#[derive(Debug)]
pub struct AlertState {
    phase: AlertPhase,
    sound_enabled: bool,
    manually_silenced: bool,
    seen: HashSet<String>,
}

impl AlertState {
    pub fn new(sound_enabled: bool) -> Self {
        Self {
            phase: AlertPhase::Idle,
            sound_enabled,
            manually_silenced: false,
            seen: HashSet::new(),
        }
    }

    pub fn phase(&self) -> AlertPhase {
        self.phase
    }

    pub fn sound_enabled(&self) -> bool {
        self.sound_enabled
    }

    /// Observe the current unread set. Ids are deduplicated for the
    /// whole session, so redelivery via push/poll overlap is harmless.
    pub fn on_unread(&mut self, unread_ids: &[String]) -> AlertEffect {
        let mut any_new = false;
        for id in unread_ids {
            if self.seen.insert(id.clone()) {
                any_new = true;
            }
        }
        if !any_new {
            return AlertEffect::None;
        }
        // A new notification overrides an earlier manual silence.
        self.manually_silenced = false;
        if self.sound_enabled && self.phase == AlertPhase::Idle {
            self.phase = AlertPhase::Ringing;
            AlertEffect::StartRinging
        } else {
            AlertEffect::None
        }
    }

    /// User gesture: stop the current chime but keep sound enabled.
    pub fn silence(&mut self) -> AlertEffect {
        self.manually_silenced = true;
        if self.phase == AlertPhase::Ringing {
            self.phase = AlertPhase::Idle;
            AlertEffect::StopRinging
        } else {
            AlertEffect::None
        }
    }

    /// Everything acknowledged; nothing left to ring for.
    pub fn on_all_read(&mut self) -> AlertEffect {
        if self.phase == AlertPhase::Ringing {
            self.phase = AlertPhase::Idle;
            AlertEffect::StopRinging
        } else {
            AlertEffect::None
        }
    }

    /// User gesture: acknowledge the whole batch. Also counts as a
    /// deliberate silence so redelivery of the batch stays quiet.
    pub fn acknowledge_all(&mut self) -> AlertEffect {
        self.manually_silenced = true;
        self.on_all_read()
    }

    /// User gesture on the sound control.
    ///
    /// While ringing the gesture is a stop, not a preference flip: the
    /// preference stays on and the next genuinely new notification id
    /// rings again. While idle it toggles the preference; re-enabling
    /// resumes ringing only when unread notifications are pending and
    /// the quiet was not a deliberate silence gesture.
    pub fn toggle_sound(&mut self, has_unread: bool) -> AlertEffect {
        if self.phase == AlertPhase::Ringing {
            self.silence()
        } else if self.sound_enabled {
            self.sound_enabled = false;
            AlertEffect::None
        } else {
            self.sound_enabled = true;
            if has_unread && !self.manually_silenced {
                self.phase = AlertPhase::Ringing;
                AlertEffect::StartRinging
            } else {
                AlertEffect::None
            }
        }
    }

    /// External request to sound the chime (background agent command).
    /// Respects the sound preference but not the dedup set; the caller
    /// decided an alert is warranted.
    pub fn ring(&mut self) -> AlertEffect {
        if self.sound_enabled && self.phase == AlertPhase::Idle {
            self.manually_silenced = false;
            self.phase = AlertPhase::Ringing;
            AlertEffect::StartRinging
        } else {
            AlertEffect::None
        }
    }

    /// Playback failed after a start was requested.
    pub fn on_playback_failed(&mut self) {
        self.phase = AlertPhase::Idle;
    }
}

/// Applies alert effects to the audio fallback chain and publishes
/// ringing/badge state.
pub struct AlertEngine {
    state: AlertState,
    chain: Arc<ChimeChain>,
    ringing_tx: watch::Sender<bool>,
    badge_tx: watch::Sender<bool>,
}

impl AlertEngine {
    pub fn new(sound_enabled: bool, chain: Arc<ChimeChain>) -> Self {
        let (ringing_tx, _) = watch::channel(false);
        let (badge_tx, _) = watch::channel(false);
        Self {
            state: AlertState::new(sound_enabled),
            chain,
            ringing_tx,
            badge_tx,
        }
    }

    pub fn ringing(&self) -> watch::Receiver<bool> {
        self.ringing_tx.subscribe()
    }

    /// Silent-failure badge: set when every audio tier failed, so the
    /// UI can still show that an alert fired.
    pub fn badge(&self) -> watch::Receiver<bool> {
        self.badge_tx.subscribe()
    }

    pub fn sound_enabled(&self) -> bool {
        self.state.sound_enabled()
    }

    pub async fn observe_unread(&mut self, unread_ids: &[String]) {
        let effect = self.state.on_unread(unread_ids);
        self.apply(effect).await;
    }

    pub async fn silence(&mut self) {
        let effect = self.state.silence();
        self.apply(effect).await;
    }

    pub async fn ring(&mut self) {
        let effect = self.state.ring();
        self.apply(effect).await;
    }

    pub async fn all_read(&mut self) {
        let effect = self.state.on_all_read();
        self.apply(effect).await;
        let _ = self.badge_tx.send(false);
    }

    pub async fn acknowledge_all(&mut self) {
        let effect = self.state.acknowledge_all();
        self.apply(effect).await;
        let _ = self.badge_tx.send(false);
    }

    pub async fn toggle_sound(&mut self, has_unread: bool) -> bool {
        let effect = self.state.toggle_sound(has_unread);
        self.apply(effect).await;
        self.state.sound_enabled()
    }

    async fn apply(&mut self, effect: AlertEffect) {
        match effect {
            AlertEffect::None => {}
            AlertEffect::StartRinging => {
                // Stream setup can wait on the audio device for up to
                // the ready timeout; keep that off the reducer thread.
                let chain = Arc::clone(&self.chain);
                let started = tokio::task::spawn_blocking(move || chain.start())
                    .await
                    .unwrap_or_else(|e| {
                        Err(PipelineError::Audio(format!("playback task failed: {e}")))
                    });
                match started {
                    Ok(tier) => {
                        tracing::debug!(tier = %tier, "Chime started");
                        let _ = self.ringing_tx.send(true);
                    }
                    Err(e) => {
                        // Total audio failure degrades to a visual badge.
                        tracing::warn!(error = %e, "All audio tiers failed, raising badge");
                        self.state.on_playback_failed();
                        let _ = self.badge_tx.send(true);
                    }
                }
            }
            AlertEffect::StopRinging => {
                // Stopping only drops the playback thread's wake channel.
                self.chain.stop();
                let _ = self.ringing_tx.send(false);
            }
        }
    }
}
