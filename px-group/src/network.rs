//! In-process network for tests and simulations.

use async_trait::async_trait;
use fnv::{FnvHashMap, FnvHashSet};
use log::{debug, trace};
use rand::Rng;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use px_data::Member;

use crate::transport::{CloseSignal, Transport, TransportErr};
use crate::utils::lock;

type Datagram = (Member, Vec<u8>);

#[derive(Default)]
struct Links {
    routes: FnvHashMap<Member, mpsc::UnboundedSender<Datagram>>,
    // directed (from, to) links that drop everything
    cut: FnvHashSet<(Member, Member)>,
    isolated: FnvHashSet<Member>,
    loss_rate: f64,
}

impl Links {
    fn passes(&self, from: &Member, to: &Member) -> bool {
        if self.isolated.contains(from) || self.isolated.contains(to) {
            return false;
        }
        if self.cut.contains(&(*from, *to)) {
            return false;
        }
        self.loss_rate <= 0.0 || !rand::thread_rng().gen_bool(self.loss_rate.min(1.0))
    }
}

/// Shared switchboard. Cloning yields another handle on the same network.
#[derive(Clone, Default)]
pub struct MemNetwork {
    links: Arc<Mutex<Links>>,
}

impl MemNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops each datagram independently with probability `rate`.
    pub fn with_loss(rate: f64) -> Self {
        let net = Self::new();
        lock(&net.links).loss_rate = rate;
        net
    }

    /// Attaches `me`; a previous transport of `me` stops receiving.
    pub fn transport(&self, me: Member) -> Arc<MemTransport> {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.links).routes.insert(me, tx);
        Arc::new(MemTransport {
            me,
            network: self.clone(),
            inbox: tokio::sync::Mutex::new(rx),
            close: CloseSignal::new(),
        })
    }

    /// Drops traffic between `a` and `b`, both directions.
    pub fn cut(&self, a: &Member, b: &Member) {
        let mut links = lock(&self.links);
        links.cut.insert((*a, *b));
        links.cut.insert((*b, *a));
    }

    /// Drops traffic from `from` to `to` only.
    pub fn cut_one_way(&self, from: &Member, to: &Member) {
        lock(&self.links).cut.insert((*from, *to));
    }

    pub fn isolate(&self, m: &Member) {
        debug!("isolate {}", m);
        lock(&self.links).isolated.insert(*m);
    }

    pub fn rejoin(&self, m: &Member) {
        debug!("rejoin {}", m);
        lock(&self.links).isolated.remove(m);
    }

    pub fn heal_all(&self) {
        let mut links = lock(&self.links);
        links.cut.clear();
        links.isolated.clear();
    }

    fn deliver(&self, from: &Member, to: &Member, buf: &[u8]) {
        let links = lock(&self.links);
        if !links.passes(from, to) {
            trace!("drop datagram {} -> {}", from, to);
            return;
        }
        if let Some(route) = links.routes.get(to) {
            // receiver gone: same as loss
            let _ = route.send((*from, buf.to_vec()));
        }
    }
}

pub struct MemTransport {
    me: Member,
    network: MemNetwork,
    inbox: tokio::sync::Mutex<mpsc::UnboundedReceiver<Datagram>>,
    close: CloseSignal,
}

#[async_trait]
impl Transport for MemTransport {
    fn local(&self) -> Member {
        self.me
    }

    fn send_to(&self, to: &Member, buf: &[u8]) {
        if self.close.is_closed() {
            return;
        }
        self.network.deliver(&self.me, to, buf);
    }

    async fn recv(&self) -> Result<(Member, Vec<u8>), TransportErr> {
        if self.close.is_closed() {
            return Err(TransportErr::Closed);
        }
        let mut inbox = self.inbox.lock().await;
        tokio::select! {
            () = self.close.wait() => Err(TransportErr::Closed),
            d = inbox.recv() => d.ok_or(TransportErr::Closed),
        }
    }

    fn close(&self) {
        self.close.close();
    }
}
