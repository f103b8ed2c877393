#![allow(dead_code)]

use async_trait::async_trait;
use mixfsd::config::{Semantics, ServerConfig};
use mixfsd::fs::{FileStore, FileWatch, FsError};
use mixfsd::server::ServerState;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

pub fn test_config() -> ServerConfig {
    ServerConfig {
        listen: "127.0.0.1:0".parse().unwrap(),
        semantics: Semantics::AtLeastOnce,
        failure_rate: 0,
        mixnet: false,
        metrics_addr: "127.0.0.1:0".parse().unwrap(),
        dedup_capacity: 1024,
        max_datagram: 1000,
        max_fields: 10,
        push_retry: Duration::from_millis(100),
        push_timeout: Duration::from_millis(450),
        max_subscription: Duration::from_secs(60),
    }
}

#[derive(Default)]
struct MemFile {
    data: Vec<u8>,
    mtime: u64,
    mode: u32,
}

/// In-memory [`FileStore`]; writes bump the mtime and notify watchers.
#[derive(Default)]
pub struct MemoryFs {
    files: Mutex<HashMap<String, MemFile>>,
    watchers: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<()>>>>,
}

impl MemoryFs {
    pub fn with_file(path: &str, data: &[u8], mtime: u64) -> Arc<Self> {
        let fs = Arc::new(Self::default());
        fs.put(path, data, mtime);
        fs
    }

    pub fn put(&self, path: &str, data: &[u8], mtime: u64) {
        self.files.lock().unwrap().insert(
            path.to_owned(),
            MemFile {
                data: data.to_vec(),
                mtime,
                mode: 0o644,
            },
        );
    }

    /// Overwrites the whole file the way a local writer would.
    pub fn replace(&self, path: &str, data: &[u8]) {
        self.modify(path, |buf| *buf = data.to_vec()).unwrap();
    }

    pub fn data(&self, path: &str) -> Vec<u8> {
        self.files.lock().unwrap()[path].data.clone()
    }

    pub fn mode(&self, path: &str) -> u32 {
        self.files.lock().unwrap()[path].mode
    }

    fn modify(&self, path: &str, f: impl FnOnce(&mut Vec<u8>)) -> Result<(), FsError> {
        {
            let mut files = self.files.lock().unwrap();
            let file = files.get_mut(path).ok_or(FsError::Open)?;
            f(&mut file.data);
            file.mtime += 1;
        }
        if let Some(senders) = self.watchers.lock().unwrap().get_mut(path) {
            senders.retain(|tx| tx.send(()).is_ok());
        }
        Ok(())
    }
}

#[async_trait]
impl FileStore for MemoryFs {
    async fn read(&self, path: &str, offset: u64, length: usize) -> Result<(Vec<u8>, u64), FsError> {
        let files = self.files.lock().unwrap();
        let file = files.get(path).ok_or(FsError::Open)?;
        let start = usize::try_from(offset).unwrap().min(file.data.len());
        let end = start.saturating_add(length).min(file.data.len());
        Ok((file.data[start..end].to_vec(), file.mtime))
    }

    async fn write(&self, path: &str, offset: u64, data: &[u8]) -> Result<(), FsError> {
        let offset = usize::try_from(offset).unwrap();
        self.modify(path, |buf| {
            if buf.len() < offset + data.len() {
                buf.resize(offset + data.len(), 0);
            }
            buf[offset..offset + data.len()].copy_from_slice(data);
        })
    }

    async fn append(&self, path: &str, data: &[u8]) -> Result<(), FsError> {
        self.modify(path, |buf| buf.extend_from_slice(data))
    }

    async fn last_write(&self, path: &str) -> Result<u64, FsError> {
        let files = self.files.lock().unwrap();
        files.get(path).map(|f| f.mtime).ok_or(FsError::Open)
    }

    async fn chmod(&self, path: &str, mode: u32) -> Result<(), FsError> {
        let mut files = self.files.lock().unwrap();
        files.get_mut(path).ok_or(FsError::Open)?.mode = mode;
        Ok(())
    }

    async fn contents(&self, path: &str) -> Result<Vec<u8>, FsError> {
        let files = self.files.lock().unwrap();
        files.get(path).map(|f| f.data.clone()).ok_or(FsError::Open)
    }

    fn watch(&self, path: &str) -> Result<FileWatch, FsError> {
        if !self.files.lock().unwrap().contains_key(path) {
            return Err(FsError::Open);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.watchers
            .lock()
            .unwrap()
            .entry(path.to_owned())
            .or_default()
            .push(tx);
        Ok(FileWatch::new(rx, None))
    }
}

pub async fn start_server(
    config: ServerConfig,
    store: Arc<dyn FileStore>,
) -> (SocketAddr, Arc<ServerState>) {
    let socket = UdpSocket::bind(config.listen).await.unwrap();
    let addr = socket.local_addr().unwrap();
    let state = ServerState::new(config, socket, store);
    tokio::spawn(mixfsd::run(Arc::clone(&state)));
    (addr, state)
}

/// A bare UDP peer speaking raw wire bytes.
pub struct Peer {
    pub socket: UdpSocket,
}

impl Peer {
    pub async fn bind() -> Self {
        Self {
            socket: UdpSocket::bind("127.0.0.1:0").await.unwrap(),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.socket.local_addr().unwrap()
    }

    pub async fn send(&self, to: SocketAddr, bytes: &[u8]) {
        self.socket.send_to(bytes, to).await.unwrap();
    }

    pub async fn recv_timeout(&self, timeout: Duration) -> Option<Vec<u8>> {
        let mut buf = vec![0u8; 65_536];
        let (n, _) = tokio::time::timeout(timeout, self.socket.recv_from(&mut buf))
            .await
            .ok()?
            .unwrap();
        buf.truncate(n);
        Some(buf)
    }

    pub async fn recv(&self) -> Vec<u8> {
        self.recv_timeout(Duration::from_secs(5))
            .await
            .expect("timeout waiting for datagram")
    }

    pub async fn call(&self, to: SocketAddr, bytes: &[u8]) -> Vec<u8> {
        self.send(to, bytes).await;
        self.recv().await
    }

    /// Collects every datagram that arrives within `window`.
    pub async fn drain(&self, window: Duration) -> Vec<Vec<u8>> {
        let deadline = tokio::time::Instant::now() + window;
        let mut out = Vec::new();
        loop {
            let left = deadline.saturating_duration_since(tokio::time::Instant::now());
            if left.is_zero() {
                return out;
            }
            match self.recv_timeout(left).await {
                Some(d) => out.push(d),
                None => return out,
            }
        }
    }
}
