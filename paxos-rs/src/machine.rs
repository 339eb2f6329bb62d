use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use px_data::{
    CodecErr, GroupMembership, LogicalTime, Member, MsgId, Payload, PaxosMsg, SeqNo, ViewNumber,
};

use crate::acceptor::AcceptorRole;
use crate::config::PaxosConfig;
use crate::failure::FailureDetector;
use crate::leader::LeaderRole;
use crate::traits::{CommLayer, CommitNotifier, Receiver};

pub type Result<T> = core::result::Result<T, DispatchErr>;

#[derive(Debug, Error)]
pub enum DispatchErr {
    #[error("{0}")]
    Codec(#[from] CodecErr),

    #[error("tick received from the network")]
    RemoteTick,

    #[error("message from non-member {0}")]
    UnknownSender(Member),
}

/// Point-in-time view of one member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub me: Member,
    pub view_number: ViewNumber,
    pub leader: Member,
    pub elected: bool,
    pub delivered_up_to: SeqNo,
    pub alive: Vec<Member>,
}

/// The roles of one member behind a single dispatch point.
///
/// Messages from the network and clock ticks go through [`PaxosMachine::process`]
/// one at a time, so the roles never need their own locking.
pub struct PaxosMachine {
    membership: Arc<GroupMembership>,
    leader: LeaderRole,
    acceptor: AcceptorRole,
    detector: FailureDetector,
}

impl PaxosMachine {
    pub fn new(
        membership: Arc<GroupMembership>,
        comm: Arc<dyn CommLayer>,
        receiver: Box<dyn Receiver>,
        notifier: Arc<dyn CommitNotifier>,
        config: PaxosConfig,
        time: LogicalTime,
    ) -> Self {
        let acceptor = AcceptorRole::new(membership.clone(), comm.clone(), receiver, notifier);
        let detector = FailureDetector::new(membership.clone(), comm.clone(), &config, time);
        let leader = LeaderRole::new(membership.clone(), comm, config, time);
        Self {
            membership,
            leader,
            acceptor,
            detector,
        }
    }

    /// Decodes and dispatches one datagram.
    pub fn process_bytes(&mut self, buf: &[u8]) -> Result<()> {
        let msg = PaxosMsg::decode(buf)?;
        if msg.is_tick() {
            return Err(DispatchErr::RemoteTick);
        }
        if let Some(sender) = msg.sender() {
            if !self.membership.contains(sender) {
                return Err(DispatchErr::UnknownSender(*sender));
            }
        }
        self.process(&msg);
        Ok(())
    }

    pub fn process(&mut self, msg: &PaxosMsg) {
        if !msg.is_tick() {
            debug!("{} recv {}", self.membership.me(), msg);
        }
        self.leader.dispatch(msg);
        self.acceptor.dispatch(msg);
        self.detector.dispatch(msg, &mut self.leader);
    }

    #[inline]
    pub fn on_tick(&mut self, time: LogicalTime) {
        self.process(&PaxosMsg::Tick { time });
    }

    /// Sends a locally originated message to the believed leader.
    pub fn forward_broadcast(&self, message: Payload, msg_id: MsgId) {
        if !self.detector.is_alive(self.acceptor.leader()) {
            warn!(
                "{} forwards {} to suspected leader {}",
                self.membership.me(),
                msg_id,
                self.acceptor.leader()
            );
        }
        self.acceptor.forward_broadcast(message, msg_id);
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            me: *self.membership.me(),
            view_number: self.acceptor.view_number(),
            leader: *self.acceptor.leader(),
            elected: self.leader.is_elected(),
            delivered_up_to: self.acceptor.delivered_up_to(),
            alive: self.detector.alive().iter().copied().collect(),
        }
    }

    pub fn leader_role(&self) -> &LeaderRole {
        &self.leader
    }

    pub fn acceptor_role(&self) -> &AcceptorRole {
        &self.acceptor
    }
}
