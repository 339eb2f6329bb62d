//! Datagram transport between members.

use async_trait::async_trait;
use log::{debug, error, warn};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::watch;

use paxos_rs::CommLayer;
use px_data::Member;

#[derive(Debug, Error)]
pub enum TransportErr {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("transport closed")]
    Closed,
}

/// Unreliable, unordered datagrams addressed by [`Member`].
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    fn local(&self) -> Member;

    /// Best effort, never blocks. Failures are logged and the datagram dropped.
    fn send_to(&self, to: &Member, buf: &[u8]);

    /// Next datagram and its sender. `Err(Closed)` once closed.
    async fn recv(&self) -> Result<(Member, Vec<u8>), TransportErr>;

    /// Unblocks pending `recv` calls; later sends are dropped.
    fn close(&self);
}

/// Lets the protocol core send through any [`Transport`].
pub struct TransportComm(pub Arc<dyn Transport>);

impl CommLayer for TransportComm {
    #[inline]
    fn send_to(&self, member: &Member, buf: &[u8]) {
        self.0.send_to(member, buf);
    }
}

pub(crate) struct CloseSignal {
    closed: AtomicBool,
    tx: watch::Sender<bool>,
    rx: watch::Receiver<bool>,
}

impl CloseSignal {
    pub(crate) fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            closed: AtomicBool::new(false),
            tx,
            rx,
        }
    }

    pub(crate) fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.tx.send(true);
        }
    }

    #[inline]
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Resolves once `close` was called.
    pub(crate) async fn wait(&self) {
        let mut rx = self.rx.clone();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

pub struct UdpTransport {
    socket: UdpSocket,
    local: Member,
    max_datagram_size: usize,
    close: CloseSignal,
}

impl UdpTransport {
    /// Binds `me`. Port 0 picks a free port, see [`Transport::local`].
    pub async fn bind(me: &Member, max_datagram_size: usize) -> Result<Self, TransportErr> {
        let socket = UdpSocket::bind(me.socket_addr()).await?;
        let local = Member::from(socket.local_addr()?);
        debug!("udp transport bound to {}", local);
        Ok(Self {
            socket,
            local,
            max_datagram_size,
            close: CloseSignal::new(),
        })
    }
}

#[async_trait]
impl Transport for UdpTransport {
    fn local(&self) -> Member {
        self.local
    }

    fn send_to(&self, to: &Member, buf: &[u8]) {
        if self.close.is_closed() {
            return;
        }
        if buf.len() > self.max_datagram_size {
            error!("drop {} bytes datagram to {}: too large", buf.len(), to);
            return;
        }
        match self.socket.try_send_to(buf, to.socket_addr()) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                warn!("socket busy, drop datagram to {}", to);
            }
            Err(e) => warn!("send to {} failed: {}", to, e),
        }
    }

    async fn recv(&self) -> Result<(Member, Vec<u8>), TransportErr> {
        let mut buf = vec![0u8; self.max_datagram_size];
        loop {
            if self.close.is_closed() {
                return Err(TransportErr::Closed);
            }
            tokio::select! {
                () = self.close.wait() => return Err(TransportErr::Closed),
                r = self.socket.recv_from(&mut buf) => match r {
                    Ok((n, from)) => {
                        buf.truncate(n);
                        return Ok((Member::from(from), buf));
                    }
                    // ICMP unreachable from an earlier send surfaces here on some platforms.
                    Err(e) if e.kind() == io::ErrorKind::ConnectionReset => {
                        debug!("ignore {}", e);
                    }
                    Err(e) => return Err(TransportErr::Io(e)),
                },
            }
        }
    }

    fn close(&self) {
        debug!("close udp transport {}", self.local);
        self.close.close();
    }
}
