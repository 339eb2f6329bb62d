//! Mocker for testing.
use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, Mutex};

use px_data::{GroupMembership, LogicalTime, Member, MsgId, Payload, PaxosMsg, SeqNo};

use crate::config::PaxosConfig;
use crate::machine::PaxosMachine;
use crate::traits::*;

pub type Delivered = Arc<Mutex<Vec<(SeqNo, Payload)>>>;

pub fn init_logger() {
    use simplelog::*;
    let _ = TermLogger::init(LevelFilter::Debug, Config::default(), TerminalMode::Mixed);
}

pub fn member(i: usize) -> Member {
    format!("127.0.0.1:{}", 2440 + i).parse().unwrap()
}

pub fn membership(n: usize, me: usize) -> Arc<GroupMembership> {
    Arc::new(GroupMembership::new((0..n).map(member), member(me)).unwrap())
}

/// Records every outgoing datagram.
#[derive(Default)]
pub struct MockComm {
    outbox: Mutex<Vec<(Member, Vec<u8>)>>,
}

impl MockComm {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn take(&self) -> Vec<(Member, PaxosMsg)> {
        self.outbox
            .lock()
            .unwrap()
            .drain(..)
            .map(|(to, buf)| (to, PaxosMsg::decode(&buf).unwrap()))
            .collect()
    }
}

impl CommLayer for MockComm {
    fn send_to(&self, member: &Member, buf: &[u8]) {
        self.outbox.lock().unwrap().push((*member, buf.to_vec()));
    }
}

pub struct MockReceiver {
    delivered: Delivered,
}

impl MockReceiver {
    pub fn new() -> (Self, Delivered) {
        let delivered = Delivered::default();
        (
            Self {
                delivered: delivered.clone(),
            },
            delivered,
        )
    }
}

impl Receiver for MockReceiver {
    fn receive(&mut self, seq_no: SeqNo, message: &Payload) {
        self.delivered.lock().unwrap().push((seq_no, message.clone()));
    }
}

#[derive(Default)]
pub struct MockNotifier {
    pub unblocked: Mutex<Vec<MsgId>>,
}

impl CommitNotifier for MockNotifier {
    fn unblock(&self, msg_id: MsgId) {
        self.unblocked.lock().unwrap().push(msg_id);
    }
}

#[derive(Default)]
pub struct MockListener {
    pub failed: Vec<(Member, BTreeSet<Member>)>,
}

impl FailureListener for MockListener {
    fn member_failed(&mut self, failed: &Member, alive: &BTreeSet<Member>) {
        self.failed.push((*failed, alive.clone()));
    }
}

/// Returns true to drop a datagram sent from `from` to `to`.
pub type DropRule = Box<dyn FnMut(usize, usize, &PaxosMsg) -> bool>;

/// In-process group; datagrams are pumped by hand.
pub struct MockGroup {
    pub nodes: Vec<PaxosMachine>,
    pub comms: Vec<Arc<MockComm>>,
    pub delivered: Vec<Delivered>,
    pub notifiers: Vec<Arc<MockNotifier>>,
    pub down: HashSet<usize>,
    pub time: LogicalTime,
    drop_rule: Option<DropRule>,
}

impl MockGroup {
    pub fn new(n: usize) -> Self {
        let mut group = Self {
            nodes: Vec::with_capacity(n),
            comms: Vec::with_capacity(n),
            delivered: Vec::with_capacity(n),
            notifiers: Vec::with_capacity(n),
            down: HashSet::new(),
            time: 0,
            drop_rule: None,
        };
        for i in 0..n {
            let comm = MockComm::new();
            let (recv, delivered) = MockReceiver::new();
            let notifier = Arc::new(MockNotifier::default());
            let node = PaxosMachine::new(
                membership(n, i),
                comm.clone(),
                Box::new(recv),
                notifier.clone(),
                PaxosConfig::default(),
                0,
            );
            group.nodes.push(node);
            group.comms.push(comm);
            group.delivered.push(delivered);
            group.notifiers.push(notifier);
        }
        group
    }

    pub fn set_drop_rule(&mut self, rule: impl FnMut(usize, usize, &PaxosMsg) -> bool + 'static) {
        self.drop_rule = Some(Box::new(rule));
    }

    pub fn clear_drop_rule(&mut self) {
        self.drop_rule = None;
    }

    fn index_of(&self, m: &Member) -> usize {
        (m.port() - 2440) as usize
    }

    /// Pumps datagrams until the group is quiet.
    pub fn deliver_all(&mut self) {
        for _ in 0..10_000 {
            let mut batch = Vec::new();
            for (i, comm) in self.comms.iter().enumerate() {
                for (to, msg) in comm.take() {
                    if !self.down.contains(&i) {
                        batch.push((i, to, msg));
                    }
                }
            }
            if batch.is_empty() {
                return;
            }
            for (from, to, msg) in batch {
                let to = self.index_of(&to);
                if self.down.contains(&to) {
                    continue;
                }
                if let Some(rule) = self.drop_rule.as_mut() {
                    if rule(from, to, &msg) {
                        continue;
                    }
                }
                self.nodes[to].process(&msg);
            }
        }
        panic!("group never quiesced");
    }

    /// Advances every live member's clock in 100-unit steps.
    pub fn run_for(&mut self, duration: LogicalTime) {
        let end = self.time + duration;
        while self.time < end {
            self.time += 100;
            for i in 0..self.nodes.len() {
                if !self.down.contains(&i) {
                    self.nodes[i].on_tick(self.time);
                }
            }
            self.deliver_all();
        }
    }

    pub fn broadcast(&mut self, from: usize, message: Payload, msg_id: MsgId) {
        self.nodes[from].forward_broadcast(message, msg_id);
        self.deliver_all();
    }

    pub fn crash(&mut self, i: usize) {
        self.down.insert(i);
    }

    pub fn recover(&mut self, i: usize) {
        self.down.remove(&i);
    }

    pub fn delivered(&self, i: usize) -> Vec<(SeqNo, Payload)> {
        self.delivered[i].lock().unwrap().clone()
    }

    pub fn unblocked(&self, i: usize) -> Vec<MsgId> {
        self.notifiers[i].unblocked.lock().unwrap().clone()
    }
}
