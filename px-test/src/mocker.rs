//! Mocker for testing: a seeded, single-threaded network simulation.
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use paxos_rs::{CommLayer, CommitNotifier, PaxosConfig, PaxosMachine, Receiver};
use px_data::{GroupMembership, Member, MsgId, MsgIdGenerator, Payload, SeqNo};

use crate::delay_queue::{DelayQueue, TickQueue};

/// Simulated milliseconds per step.
pub const STEP: u64 = 10;
pub const TICK_INTERVAL: u64 = 100;
/// Broadcasters re-send after this long without a commit.
pub const WAIT_TIMEOUT: u64 = 1000;

pub type Delivered = Arc<Mutex<Vec<(SeqNo, Payload)>>>;

pub fn member(i: usize) -> Member {
    format!("10.0.0.{}:2440", i + 1).parse().unwrap()
}

#[derive(Default)]
struct SimComm {
    outbox: Mutex<Vec<(Member, Vec<u8>)>>,
}

impl SimComm {
    fn take(&self) -> Vec<(Member, Vec<u8>)> {
        std::mem::take(&mut *self.outbox.lock().unwrap())
    }
}

impl CommLayer for SimComm {
    fn send_to(&self, member: &Member, buf: &[u8]) {
        self.outbox.lock().unwrap().push((*member, buf.to_vec()));
    }
}

struct SimReceiver(Delivered);

impl Receiver for SimReceiver {
    fn receive(&mut self, seq_no: SeqNo, message: &Payload) {
        self.0.lock().unwrap().push((seq_no, message.clone()));
    }
}

#[derive(Default)]
struct SimNotifier {
    committed: Mutex<HashSet<MsgId>>,
}

impl CommitNotifier for SimNotifier {
    fn unblock(&self, msg_id: MsgId) {
        self.committed.lock().unwrap().insert(msg_id);
    }
}

struct Envelope {
    to: usize,
    buf: Vec<u8>,
}

/// A local `broadcast` still waiting for its commit.
struct Pending {
    node: usize,
    payload: Payload,
    last_sent: u64,
}

pub struct SimConfig {
    pub n: usize,
    pub seed: u64,
    pub loss_rate: f64,
    pub min_latency: u64,
    pub max_latency: u64,
}

impl SimConfig {
    pub fn reliable(n: usize) -> Self {
        Self {
            n,
            seed: 2021,
            loss_rate: 0.0,
            min_latency: 1,
            max_latency: 5,
        }
    }

    pub fn lossy(n: usize, seed: u64, loss_rate: f64) -> Self {
        Self {
            n,
            seed,
            loss_rate,
            min_latency: 1,
            max_latency: 40,
        }
    }
}

pub struct Simulation {
    n: usize,
    members: Vec<Member>,
    nodes: Vec<Option<PaxosMachine>>,
    comms: Vec<Arc<SimComm>>,
    notifiers: Vec<Arc<SimNotifier>>,
    delivered: Vec<Delivered>,
    ids: Vec<MsgIdGenerator>,

    queue: TickQueue<Envelope>,
    rng: StdRng,
    loss_rate: f64,
    latency: (u64, u64),
    // directed (from, to) links that drop everything
    cut: HashSet<(usize, usize)>,

    pending: BTreeMap<MsgId, Pending>,
    committed: BTreeMap<MsgId, Payload>,
}

impl Simulation {
    pub fn new(conf: SimConfig) -> Self {
        let members = (0..conf.n).map(member).collect::<Vec<_>>();
        let mut sim = Self {
            n: conf.n,
            nodes: Vec::new(),
            comms: Vec::new(),
            notifiers: Vec::new(),
            delivered: Vec::new(),
            ids: Vec::new(),
            queue: TickQueue::default(),
            rng: StdRng::seed_from_u64(conf.seed),
            loss_rate: conf.loss_rate,
            latency: (conf.min_latency, conf.max_latency.max(conf.min_latency)),
            cut: HashSet::new(),
            pending: BTreeMap::new(),
            committed: BTreeMap::new(),
            members,
        };
        for i in 0..conf.n {
            sim.comms.push(Arc::new(SimComm::default()));
            sim.notifiers.push(Arc::new(SimNotifier::default()));
            sim.delivered.push(Delivered::default());
            sim.ids.push(MsgIdGenerator::new(i));
            sim.nodes.push(None);
            sim.boot(i);
        }
        sim
    }

    /// Starts member `i` with empty protocol state.
    fn boot(&mut self, i: usize) {
        let membership = GroupMembership::new(self.members.clone(), self.members[i])
            .expect("member list contains every member");
        let node = PaxosMachine::new(
            Arc::new(membership),
            self.comms[i].clone(),
            Box::new(SimReceiver(self.delivered[i].clone())),
            self.notifiers[i].clone(),
            PaxosConfig::default(),
            self.now(),
        );
        self.nodes[i] = Some(node);
    }

    #[inline]
    pub fn now(&self) -> u64 {
        self.queue.now()
    }

    pub fn node(&self, i: usize) -> &PaxosMachine {
        self.nodes[i].as_ref().expect("member is down")
    }

    pub fn is_up(&self, i: usize) -> bool {
        self.nodes[i].is_some()
    }

    /// Drops the member with all its state; in-flight datagrams to it are lost.
    pub fn crash(&mut self, i: usize) {
        debug!("crash {}", self.members[i]);
        self.nodes[i] = None;
        let _ = self.comms[i].take();
        self.pending.retain(|_, p| p.node != i);
    }

    /// Splits the group into `side` and the rest.
    pub fn partition(&mut self, side: &[usize]) {
        for a in side {
            for b in (0..self.n).filter(|b| !side.contains(b)) {
                self.cut.insert((*a, b));
                self.cut.insert((b, *a));
            }
        }
    }

    pub fn heal(&mut self) {
        self.cut.clear();
    }

    pub fn set_loss_rate(&mut self, rate: f64) {
        self.loss_rate = rate;
    }

    /// Starts a local broadcast at member `i`, retried until committed there.
    pub fn broadcast(&mut self, i: usize, payload: Payload) -> MsgId {
        let msg_id = self.ids[i].next_id();
        self.pending.insert(
            msg_id,
            Pending {
                node: i,
                payload: payload.clone(),
                last_sent: self.now(),
            },
        );
        if let Some(node) = self.nodes[i].as_ref() {
            node.forward_broadcast(payload, msg_id);
        }
        msg_id
    }

    pub fn run_for(&mut self, duration: u64) {
        let end = self.now() + duration;
        while self.now() < end {
            self.step();
        }
    }

    /// Runs until every pending broadcast committed or `limit` elapsed.
    pub fn run_until_quiet(&mut self, limit: u64) -> bool {
        let end = self.now() + limit;
        while self.now() < end {
            self.step();
            if self.pending.is_empty() {
                return true;
            }
        }
        self.pending.is_empty()
    }

    fn step(&mut self) {
        self.queue.advance(STEP);
        let now = self.now();

        if let Some(due) = self.queue.trigger() {
            for (env, _) in due {
                if let Some(node) = self.nodes[env.to].as_mut() {
                    // undecodable datagrams are dropped like on the wire
                    let _ = node.process_bytes(&env.buf);
                }
            }
        }
        if now % TICK_INTERVAL == 0 {
            for node in self.nodes.iter_mut().flatten() {
                node.on_tick(now);
            }
        }
        self.retry_broadcasts();
        self.flush_outboxes();
    }

    fn retry_broadcasts(&mut self) {
        let now = self.now();
        let mut done = Vec::new();
        for (msg_id, p) in self.pending.iter_mut() {
            if self.notifiers[p.node].committed.lock().unwrap().contains(msg_id) {
                done.push(*msg_id);
                continue;
            }
            if now >= p.last_sent + WAIT_TIMEOUT {
                p.last_sent = now;
                if let Some(node) = self.nodes[p.node].as_ref() {
                    node.forward_broadcast(p.payload.clone(), *msg_id);
                }
            }
        }
        for msg_id in done {
            if let Some(p) = self.pending.remove(&msg_id) {
                self.committed.insert(msg_id, p.payload);
            }
        }
    }

    fn flush_outboxes(&mut self) {
        for from in 0..self.n {
            let sent = self.comms[from].take();
            if self.nodes[from].is_none() {
                continue;
            }
            for (to, buf) in sent {
                let to = match self.members.iter().position(|m| *m == to) {
                    Some(to) => to,
                    None => continue,
                };
                if self.cut.contains(&(from, to)) {
                    continue;
                }
                if self.loss_rate > 0.0 && self.rng.gen_bool(self.loss_rate) {
                    continue;
                }
                let delay = self.rng.gen_range(self.latency.0, self.latency.1 + 1);
                self.queue.push(Envelope { to, buf }, delay);
            }
        }
    }

    pub fn delivered(&self, i: usize) -> Vec<(SeqNo, Payload)> {
        self.delivered[i].lock().unwrap().clone()
    }

    /// Payloads whose broadcast returned.
    pub fn committed(&self) -> &BTreeMap<MsgId, Payload> {
        &self.committed
    }

    pub fn num_pending(&self) -> usize {
        self.pending.len()
    }

    /// Live members that believe they are elected.
    pub fn elected(&self) -> Vec<usize> {
        (0..self.n)
            .filter(|i| {
                self.nodes[*i]
                    .as_ref()
                    .map_or(false, |node| node.leader_role().is_elected())
            })
            .collect()
    }
}
