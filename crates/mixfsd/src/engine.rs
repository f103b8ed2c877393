//! Per-datagram request handling.

use crate::dedup::Claim;
use crate::error::ServerError;
use crate::fs::FsError;
use crate::metrics::counters;
use crate::outbound::ReplyPath;
use crate::push::run_subscription;
use crate::request::{error_reply, ok_reply, Operation, Request};
use crate::server::ServerState;
use mixfs_common::hop::Wrapped;
use mixfs_common::{Field, Message};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Reason sent for an operation name the server does not implement.
pub const UNKNOWN_OPERATION: &str = "unknown operation";

/// Decodes one datagram and dispatches it.
///
/// In mixnet mode the datagram is `[envelope, rpc]` and the reply follows
/// the envelope; otherwise it goes back to `peer`.
///
/// # Errors
///
/// Returns [`ServerError::Wire`] for a datagram that does not decode into a
/// request. Nothing has been sent in that case.
pub async fn handle_datagram(
    state: Arc<ServerState>,
    peer: SocketAddr,
    datagram: Vec<u8>,
) -> Result<(), ServerError> {
    trace!(%peer, len = datagram.len(), "datagram received");
    let (reply_to, rpc) = if state.config.mixnet {
        let wrapped = Wrapped::decode(&datagram)?;
        (ReplyPath::Relayed(wrapped.envelope), wrapped.payload)
    } else {
        (ReplyPath::Direct(peer), datagram)
    };
    let msg = Message::decode(&rpc, state.config.max_fields)?;
    let request = Request::parse(&msg)?;
    dispatch(&state, request, reply_to).await;
    Ok(())
}

/// Runs one request: ack correlation, duplicate filtering, execution,
/// caching and the reply.
pub async fn dispatch(state: &Arc<ServerState>, request: Request, reply_to: ReplyPath) {
    let Request { msg_id, op } = request;
    counters::requests_total(op.name());

    if op == Operation::Ack {
        if !state.acks.fulfill(msg_id) {
            debug!(msg_id, "ack for unknown push ignored");
        }
        return;
    }

    if state.config.filters_duplicates() {
        match state.dedup.claim(msg_id) {
            Claim::Fresh => {}
            Claim::Replay(cached) => {
                counters::duplicates_replayed_total();
                debug!(msg_id, "replaying cached reply");
                state.outbound.send(&reply_to, &cached).await;
                return;
            }
            Claim::InFlight => {
                debug!(msg_id, "duplicate of an executing request dropped");
                return;
            }
        }
    }

    debug!(msg_id, op = op.name(), "dispatching");
    let reply = match op {
        Operation::Subscribe { path, duration_ms } => {
            subscribe(state, msg_id, path, duration_ms, &reply_to)
        }
        op => execute(state, msg_id, op).await,
    };
    state.dedup.insert(msg_id, reply.clone());
    state.outbound.send(&reply_to, &reply).await;
}

fn subscribe(
    state: &Arc<ServerState>,
    msg_id: u64,
    path: String,
    duration_ms: u64,
    reply_to: &ReplyPath,
) -> Vec<u8> {
    match state.store.watch(&path) {
        Ok(watch) => {
            let duration = Duration::from_millis(duration_ms).min(state.config.max_subscription);
            debug!(msg_id, path = %path, ?duration, "subscription started");
            tokio::spawn(run_subscription(
                Arc::clone(state),
                path,
                duration,
                watch,
                reply_to.clone(),
            ));
            ok_reply(msg_id, Vec::new())
        }
        Err(e) => failure(msg_id, &e),
    }
}

async fn execute(state: &ServerState, msg_id: u64, op: Operation) -> Vec<u8> {
    let store = &state.store;
    let result: Result<Vec<Field>, FsError> = match op {
        Operation::Read {
            path,
            offset,
            length,
        } => {
            let length = usize::try_from(length)
                .unwrap_or(usize::MAX)
                .min(state.config.max_datagram);
            store
                .read(&path, offset, length)
                .await
                .map(|(bytes, mtime)| vec![Field::Bytes(bytes), Field::Number(mtime)])
        }
        Operation::Write {
            path,
            offset,
            content,
        } => store.write(&path, offset, &content).await.map(|()| Vec::new()),
        Operation::Append { path, content } => {
            store.append(&path, &content).await.map(|()| Vec::new())
        }
        Operation::LastWrite { path } => store
            .last_write(&path)
            .await
            .map(|mtime| vec![Field::Number(mtime)]),
        Operation::Chmod { path, mode } => store.chmod(&path, mode).await.map(|()| Vec::new()),
        Operation::Unknown(name) => {
            debug!(msg_id, operation = %name, "unknown operation");
            return error_reply(msg_id, UNKNOWN_OPERATION);
        }
        Operation::Subscribe { .. } | Operation::Ack => {
            return error_reply(msg_id, UNKNOWN_OPERATION);
        }
    };
    match result {
        Ok(fields) => ok_reply(msg_id, fields),
        Err(e) => failure(msg_id, &e),
    }
}

fn failure(msg_id: u64, err: &FsError) -> Vec<u8> {
    warn!(msg_id, "operation failed: {}", err);
    error_reply(msg_id, &err.to_string())
}
