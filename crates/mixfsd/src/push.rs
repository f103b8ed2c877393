//! Server-initiated pushes: reliable delivery and the subscription loop.

use crate::fs::FileWatch;
use crate::metrics::{counters, gauges};
use crate::outbound::ReplyPath;
use crate::request::subscription_update;
use crate::server::ServerState;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// Push ids are drawn from `[0, PUSH_ID_SPACE)`.
pub const PUSH_ID_SPACE: u64 = 1 << 32;

/// How a reliable push ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// The client acknowledged the push.
    Acked,
    /// The give-up timeout elapsed without an ack.
    Expired,
}

fn random_push_id() -> u64 {
    rand::thread_rng().gen_range(0..PUSH_ID_SPACE)
}

/// Sends `[push_id, "subscriptionupdate", contents]` under a fresh id and
/// resends the same bytes every `push_retry` until the matching ack
/// arrives or `push_timeout` has elapsed since the first send.
pub async fn reliable_push(
    state: Arc<ServerState>,
    to: ReplyPath,
    contents: Vec<u8>,
) -> PushOutcome {
    let (push_id, acked) = loop {
        let id = random_push_id();
        if let Some(signal) = state.acks.register(id) {
            break (id, signal);
        }
    };
    let bytes = subscription_update(push_id, &contents);
    let retry = state.config.push_retry;

    state.outbound.send(&to, &bytes).await;
    let mut resend = interval_at(Instant::now() + retry, retry);
    resend.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let give_up = sleep(state.config.push_timeout);
    tokio::pin!(give_up);

    let outcome = loop {
        tokio::select! {
            biased;
            () = acked.notified() => break PushOutcome::Acked,
            () = &mut give_up => break PushOutcome::Expired,
            _ = resend.tick() => {
                debug!(push_id, "retransmitting push");
                state.outbound.send(&to, &bytes).await;
            }
        }
    };
    state.acks.remove(push_id);

    match outcome {
        PushOutcome::Acked => {
            counters::pushes_total("acked");
            debug!(push_id, "push acknowledged");
        }
        PushOutcome::Expired => {
            counters::pushes_total("expired");
            debug!(push_id, "push abandoned without ack");
        }
    }
    outcome
}

/// Pushes the file's contents on every write until `duration` elapses or
/// the watch closes. Each push is delivered by its own [`reliable_push`].
pub async fn run_subscription(
    state: Arc<ServerState>,
    path: String,
    duration: Duration,
    mut watch: FileWatch,
    to: ReplyPath,
) {
    gauges::inc_subscriptions_active();
    let deadline = sleep(duration);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            () = &mut deadline => {
                debug!(path = %path, "subscription expired");
                break;
            }
            changed = watch.changed() => {
                if changed.is_none() {
                    debug!(path = %path, "file watch closed");
                    break;
                }
                match state.store.contents(&path).await {
                    Ok(contents) => {
                        tokio::spawn(reliable_push(Arc::clone(&state), to.clone(), contents));
                    }
                    Err(e) => {
                        warn!(path = %path, "subscription read failed: {}", e);
                        break;
                    }
                }
            }
        }
    }
    gauges::dec_subscriptions_active();
}
