use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::baas::realtime::{Realtime, RealtimeEvent};
use crate::config::RealtimeCfg;
use crate::helpers::retry::jittered;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Subscribed and waiting for events.
    Live,
    /// Disconnected; resubscribing as attempt `attempt` of the policy's maximum.
    Reconnecting { attempt: u32 },
    /// Out of attempts. Call [`ResilientSubscription::retry`] to start over.
    GaveUp,
}

#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(5000),
            jitter: false,
        }
    }
}

impl From<&RealtimeCfg> for ReconnectPolicy {
    fn from(cfg: &RealtimeCfg) -> Self {
        Self {
            max_attempts: cfg.max_attempts,
            base_delay: Duration::from_millis(cfg.base_delay_ms),
            max_delay: Duration::from_millis(cfg.max_delay_ms),
            jitter: cfg.jitter,
        }
    }
}

impl ReconnectPolicy {
    /// Wait before resubscribing when `attempts` reconnects have already happened
    /// since the last delivered event.
    pub fn delay_for(&self, attempts: u32) -> Duration {
        let delay = self.base_delay.saturating_mul(attempts).min(self.max_delay);
        if self.jitter && !delay.is_zero() {
            jittered(delay).min(self.max_delay)
        } else {
            delay
        }
    }
}

/// A realtime subscription that resubscribes after disconnects.
///
/// Events go to `callback`. Each delivered event resets the attempt counter.
/// After `max_attempts` reconnects without an event in between, the state turns
/// into [`SubscriptionState::GaveUp`] and the wrapper waits for [`retry`](Self::retry).
/// Dropping the wrapper unsubscribes.
pub struct ResilientSubscription {
    state: watch::Receiver<SubscriptionState>,
    retry: Arc<Notify>,
    task: JoinHandle<()>,
}

impl ResilientSubscription {
    pub fn spawn<F>(
        realtime: Realtime,
        channel: impl Into<String>,
        policy: ReconnectPolicy,
        callback: F,
    ) -> Self
    where
        F: FnMut(RealtimeEvent) + Send + 'static,
    {
        let channel = channel.into();
        // Subscribe before returning so no event published after `spawn` is missed.
        let first = realtime.subscribe(&channel);
        let (state_tx, state) = watch::channel(SubscriptionState::Live);
        let retry = Arc::new(Notify::new());

        let task = tokio::spawn(run(
            realtime,
            channel,
            policy,
            callback,
            first,
            state_tx,
            retry.clone(),
        ));

        Self { state, retry, task }
    }

    pub fn state(&self) -> SubscriptionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<SubscriptionState> {
        self.state.clone()
    }

    /// Start over after giving up. Has no effect in any other state.
    pub fn retry(&self) {
        if self.state() == SubscriptionState::GaveUp {
            self.retry.notify_one();
        }
    }

    pub fn stop(self) {}
}

impl Drop for ResilientSubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run<F>(
    realtime: Realtime,
    channel: String,
    policy: ReconnectPolicy,
    mut callback: F,
    first: crate::baas::realtime::Subscription,
    state: watch::Sender<SubscriptionState>,
    retry: Arc<Notify>,
) where
    F: FnMut(RealtimeEvent) + Send + 'static,
{
    let mut attempts: u32 = 0;
    let mut sub = Some(first);

    loop {
        let mut current = match sub.take() {
            Some(s) => s,
            None => realtime.subscribe(&channel),
        };
        state.send_replace(SubscriptionState::Live);

        while let Some(event) = current.recv().await {
            attempts = 0;
            callback(event);
        }
        drop(current);

        if attempts < policy.max_attempts {
            let delay = policy.delay_for(attempts);
            attempts += 1;
            debug!(%channel, attempt = attempts, ?delay, "disconnected, resubscribing");
            state.send_replace(SubscriptionState::Reconnecting { attempt: attempts });
            tokio::time::sleep(delay).await;
            continue;
        }

        warn!(%channel, attempts, "giving up on realtime channel");
        state.send_replace(SubscriptionState::GaveUp);
        retry.notified().await;
        info!(%channel, "manual retry requested");
        attempts = 0;
    }
}
