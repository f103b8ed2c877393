use crate::cache::{Lookup, ReadCache};
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::route::MixRoute;
use mixfs_common::transport::send_to_host;
use mixfs_common::types::{op, status, MAX_FIELDS};
use mixfs_common::wire::{encode, Field, Message};
use std::collections::{HashSet, VecDeque};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tracing::{debug, trace};

/// Push ids remembered for duplicate suppression.
const SEEN_PUSHES: usize = 1024;

/// A subscription update pushed by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Push {
    /// Server-chosen push id.
    pub id: u64,
    /// The file's contents after the write.
    pub contents: Vec<u8>,
}

/// A mixfs client bound to one local UDP socket.
///
/// Calls are sequential: each waits for its own reply, resending the same
/// bytes until it arrives. Replies to earlier calls are discarded and
/// subscription pushes are acknowledged and queued.
pub struct Client {
    config: ClientConfig,
    socket: UdpSocket,
    route: Option<MixRoute>,
    cache: ReadCache,
    pushes: VecDeque<Push>,
    seen: HashSet<u64>,
    seen_order: VecDeque<u64>,
}

impl Client {
    /// Binds the local socket and prepares the relay route if enabled.
    ///
    /// # Errors
    ///
    /// Fails on an invalid configuration or if binding fails.
    pub async fn connect(config: ClientConfig) -> Result<Self, ClientError> {
        config.validate().map_err(ClientError::Config)?;
        let socket = UdpSocket::bind(&config.bind).await?;
        let route = if config.mixnet.enabled {
            let reply_to = match &config.mixnet.reply_to {
                Some(addr) => addr.clone(),
                None => socket.local_addr()?.to_string(),
            };
            Some(MixRoute::new(
                &config.mixnet.forward_relays,
                &config.server,
                &config.mixnet.return_relays,
                &reply_to,
            ))
        } else {
            None
        };
        debug!(bind = %socket.local_addr()?, server = %config.server, mixnet = route.is_some(), "client ready");
        Ok(Self {
            cache: ReadCache::new(config.cache_interval()),
            config,
            socket,
            route,
            pushes: VecDeque::new(),
            seen: HashSet::new(),
            seen_order: VecDeque::new(),
        })
    }

    /// The bound socket address.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket's local address cannot be read.
    pub fn local_addr(&self) -> Result<SocketAddr, ClientError> {
        Ok(self.socket.local_addr()?)
    }

    /// Sends `[msg_id, operation, ...args]` under a fresh random msg id and
    /// waits for the matching `"ok"` reply.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Remote`] for an `"error"` reply and
    /// [`ClientError::Timeout`] once every attempt went unanswered.
    pub async fn call(&mut self, operation: &str, args: Vec<Field>) -> Result<Message, ClientError> {
        let msg_id = u64::from(rand::random::<u32>());
        let mut fields = Vec::with_capacity(args.len() + 2);
        fields.push(Field::Number(msg_id));
        fields.push(Field::from(operation));
        fields.extend(args);
        let rpc = encode(&fields)?;
        let (dest, datagram) = self.envelope(&rpc);

        let attempts = self.config.retry.max_attempts;
        let interval = self.config.retry_interval();
        for attempt in 1..=attempts {
            trace!(msg_id, attempt, "sending request");
            send_to_host(&self.socket, &dest, &datagram).await?;
            let deadline = tokio::time::Instant::now() + interval;
            while let Some(msg) = self.recv_until(deadline).await? {
                match msg.number(0) {
                    Ok(id) if id == msg_id => return reply_result(msg),
                    _ => trace!(msg_id, "ignoring unrelated datagram"),
                }
            }
            debug!(msg_id, attempt, operation, "no reply yet");
        }
        Err(ClientError::Timeout { attempts })
    }

    /// Reads `length` bytes at `offset`, answering from the read cache
    /// when possible.
    ///
    /// # Errors
    ///
    /// Fails like [`Client::call`].
    pub async fn read(&mut self, path: &str, offset: u64, length: u64) -> Result<Vec<u8>, ClientError> {
        match self.cache.lookup(path, offset, length, Instant::now()) {
            Lookup::Fresh(bytes) => {
                debug!(path, "read served from cache");
                return Ok(bytes);
            }
            Lookup::Stale { mtime } => {
                if self.last_write(path).await? == mtime {
                    if let Some(bytes) = self.cache.revalidate(path, offset, length, Instant::now()) {
                        debug!(path, "cached read revalidated");
                        return Ok(bytes);
                    }
                }
            }
            Lookup::Miss => {}
        }
        let (bytes, _) = self.read_uncached(path, offset, length).await?;
        Ok(bytes)
    }

    /// Reads from the server and refreshes the cache. Returns the bytes and
    /// the file's modification time.
    ///
    /// # Errors
    ///
    /// Fails like [`Client::call`].
    pub async fn read_uncached(
        &mut self,
        path: &str,
        offset: u64,
        length: u64,
    ) -> Result<(Vec<u8>, u64), ClientError> {
        let reply = self
            .call(op::READ, vec![path.into(), offset.into(), length.into()])
            .await?;
        let bytes = reply.bytes(2)?.to_vec();
        let mtime = reply.number(3)?;
        self.cache
            .store(path, offset, length, bytes.clone(), mtime, Instant::now());
        Ok((bytes, mtime))
    }

    /// Overwrites bytes at `offset`.
    ///
    /// # Errors
    ///
    /// Fails like [`Client::call`].
    pub async fn write(&mut self, path: &str, offset: u64, data: &[u8]) -> Result<(), ClientError> {
        self.cache.invalidate(path);
        self.call(op::WRITE, vec![path.into(), offset.into(), data.into()])
            .await?;
        Ok(())
    }

    /// Appends bytes. Each server execution appends again, so with
    /// at-least-once servers a lost reply can duplicate the data.
    ///
    /// # Errors
    ///
    /// Fails like [`Client::call`].
    pub async fn append(&mut self, path: &str, data: &[u8]) -> Result<(), ClientError> {
        self.cache.invalidate(path);
        self.call(op::APPEND, vec![path.into(), data.into()]).await?;
        Ok(())
    }

    /// Returns the file's modification time in unix seconds.
    ///
    /// # Errors
    ///
    /// Fails like [`Client::call`].
    pub async fn last_write(&mut self, path: &str) -> Result<u64, ClientError> {
        let reply = self.call(op::LAST_WRITE, vec![path.into()]).await?;
        Ok(reply.number(2)?)
    }

    /// Sets the file's permission bits.
    ///
    /// # Errors
    ///
    /// Fails like [`Client::call`].
    pub async fn chmod(&mut self, path: &str, mode: u32) -> Result<(), ClientError> {
        self.call(op::CHMOD, vec![path.into(), u64::from(mode).into()])
            .await?;
        Ok(())
    }

    /// Asks for the file's contents after every write for `duration`.
    /// Updates are collected with [`Client::next_update`].
    ///
    /// # Errors
    ///
    /// Fails like [`Client::call`].
    pub async fn subscribe(&mut self, path: &str, duration: Duration) -> Result<(), ClientError> {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self.call(op::SUBSCRIBE, vec![path.into(), millis.into()])
            .await?;
        Ok(())
    }

    /// Waits up to `timeout` for a subscription update not seen before.
    ///
    /// Every push received, repeated ones included, is acknowledged.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket fails.
    pub async fn next_update(&mut self, timeout: Duration) -> Result<Option<Push>, ClientError> {
        if let Some(push) = self.pushes.pop_front() {
            return Ok(Some(push));
        }
        let deadline = tokio::time::Instant::now() + timeout;
        while self.pushes.is_empty() {
            if self.recv_until(deadline).await?.is_none() {
                break;
            }
        }
        Ok(self.pushes.pop_front())
    }

    /// Receives until a datagram that is not a push arrives or `deadline`
    /// passes. Pushes are handled on the way.
    async fn recv_until(
        &mut self,
        deadline: tokio::time::Instant,
    ) -> Result<Option<Message>, ClientError> {
        let mut buf = vec![0u8; self.config.max_datagram];
        loop {
            let Ok(received) = tokio::time::timeout_at(deadline, self.socket.recv_from(&mut buf)).await
            else {
                return Ok(None);
            };
            let (n, _) = received?;
            let msg = match Message::decode(&buf[..n], MAX_FIELDS) {
                Ok(msg) => msg,
                Err(e) => {
                    debug!("dropping undecodable datagram: {}", e);
                    continue;
                }
            };
            if msg.bytes(1).ok() == Some(op::SUBSCRIPTION_UPDATE.as_bytes()) {
                self.on_push(&msg).await?;
                continue;
            }
            return Ok(Some(msg));
        }
    }

    async fn on_push(&mut self, msg: &Message) -> Result<(), ClientError> {
        let Ok(id) = msg.number(0) else {
            return Ok(());
        };
        let ack = encode(&[Field::Number(id), Field::from(op::ACK)])?;
        let (dest, datagram) = self.envelope(&ack);
        send_to_host(&self.socket, &dest, &datagram).await?;

        if !self.seen.insert(id) {
            trace!(push_id = id, "repeated push acknowledged");
            return Ok(());
        }
        self.seen_order.push_back(id);
        if self.seen_order.len() > SEEN_PUSHES {
            if let Some(old) = self.seen_order.pop_front() {
                self.seen.remove(&old);
            }
        }
        let contents = msg.bytes(2).map(<[u8]>::to_vec).unwrap_or_default();
        debug!(push_id = id, len = contents.len(), "subscription update");
        self.pushes.push_back(Push { id, contents });
        Ok(())
    }

    fn envelope(&self, rpc: &[u8]) -> (String, Vec<u8>) {
        match &self.route {
            Some(route) => route.wrap(rpc),
            None => (self.config.server.clone(), rpc.to_vec()),
        }
    }
}

fn reply_result(msg: Message) -> Result<Message, ClientError> {
    let outcome = msg.bytes(1)?;
    if outcome == status::OK.as_bytes() {
        return Ok(msg);
    }
    if outcome == status::ERROR.as_bytes() {
        let reason = msg.bytes(2).unwrap_or_default();
        return Err(ClientError::Remote(String::from_utf8_lossy(reason).into_owned()));
    }
    Err(ClientError::UnexpectedReply)
}
