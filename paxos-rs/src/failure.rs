//! Heartbeat-based failure detection.

use fnv::FnvHashMap;
use log::{debug, warn};
use std::collections::BTreeSet;
use std::sync::Arc;

use px_data::{GroupMembership, LogicalTime, Member, PaxosMsg};

use crate::config::PaxosConfig;
use crate::traits::{CommLayer, FailureListener};
use crate::utils::encode_or_log;

pub struct FailureDetector {
    membership: Arc<GroupMembership>,
    comm: Arc<dyn CommLayer>,
    heartbeat: Vec<u8>,
    peers: Vec<Member>,

    alive: BTreeSet<Member>,
    last_heard_from: FnvHashMap<Member, LogicalTime>,
    last_heartbeat: Option<LogicalTime>,
    time: LogicalTime,

    heartbeat_interval: LogicalTime,
    failure_timeout: LogicalTime,
}

impl FailureDetector {
    pub fn new(
        membership: Arc<GroupMembership>,
        comm: Arc<dyn CommLayer>,
        config: &PaxosConfig,
        time: LogicalTime,
    ) -> Self {
        let me = *membership.me();
        let heartbeat = encode_or_log(&PaxosMsg::Heartbeat { sender: me }).unwrap_or_default();
        let peers = membership
            .members()
            .iter()
            .filter(|m| **m != me)
            .copied()
            .collect::<Vec<Member>>();
        // Every peer gets a full timeout of grace from start.
        let last_heard_from = peers.iter().map(|m| (*m, time)).collect();

        Self {
            alive: membership.all(),
            membership,
            comm,
            heartbeat,
            peers,
            last_heard_from,
            last_heartbeat: None,
            time,
            heartbeat_interval: config.heartbeat_interval,
            failure_timeout: config.failure_timeout,
        }
    }

    pub fn dispatch(&mut self, msg: &PaxosMsg, listener: &mut dyn FailureListener) {
        match msg {
            PaxosMsg::Heartbeat { sender } => {
                if let Some(t) = self.last_heard_from.get_mut(sender) {
                    *t = self.time;
                    if self.alive.insert(*sender) {
                        debug!("{} is back", sender);
                    }
                }
            }
            PaxosMsg::Tick { time } => self.update(*time, listener),
            _ => {}
        }
    }

    fn update(&mut self, time: LogicalTime, listener: &mut dyn FailureListener) {
        self.time = time;
        let due = match self.last_heartbeat {
            None => true,
            Some(last) => time > last + self.heartbeat_interval,
        };
        if due && !self.heartbeat.is_empty() {
            self.last_heartbeat = Some(time);
            self.comm.send_to_all(&self.peers, &self.heartbeat);
        }

        let mut newly_failed = Vec::new();
        for (m, t) in self.last_heard_from.iter() {
            if time > t + self.failure_timeout && self.alive.remove(m) {
                newly_failed.push(*m);
            }
        }
        newly_failed.sort();
        for m in newly_failed {
            warn!(
                "{} considers {} failed, alive: {:?}",
                self.membership.me(),
                m,
                self.alive
            );
            listener.member_failed(&m, &self.alive);
        }
    }

    pub fn is_alive(&self, m: &Member) -> bool {
        self.alive.contains(m)
    }

    pub fn alive(&self) -> &BTreeSet<Member> {
        &self.alive
    }
}
