//! Acceptor side of every member.

mod buffered;
mod missing;

pub use buffered::BufferedReceiver;
pub use missing::{MissingMessagesTracker, MAX_MISSING_REPORT};

use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::sync::Arc;

use px_data::{
    Acceptance, GroupMembership, Member, MsgId, Payload, PaxosMsg, SeqNo, ViewNumber, NO_OP_MSG_ID,
};

use crate::traits::{CommLayer, CommitNotifier, Receiver};
use crate::utils::send_msg;

pub struct AcceptorRole {
    membership: Arc<GroupMembership>,
    comm: Arc<dyn CommLayer>,
    notifier: Arc<dyn CommitNotifier>,
    receiver: BufferedReceiver,
    missing: MissingMessagesTracker,

    accepted: BTreeMap<SeqNo, Acceptance>,
    view_number: ViewNumber,
    leader: Member,
}

impl AcceptorRole {
    pub fn new(
        membership: Arc<GroupMembership>,
        comm: Arc<dyn CommLayer>,
        receiver: Box<dyn Receiver>,
        notifier: Arc<dyn CommitNotifier>,
    ) -> Self {
        let leader = membership.default_leader();
        Self {
            membership,
            comm,
            notifier,
            receiver: BufferedReceiver::new(receiver),
            missing: MissingMessagesTracker::new(),
            accepted: BTreeMap::new(),
            view_number: 0,
            leader,
        }
    }

    pub fn dispatch(&mut self, msg: &PaxosMsg) {
        match msg {
            PaxosMsg::NewView {
                leader,
                view_number,
            } => self.on_new_view(leader, *view_number),
            PaxosMsg::Accept {
                view_no,
                seq_no,
                message,
                msg_id,
                sender,
            } => self.on_accept(*view_no, *seq_no, message, *msg_id, sender),
            PaxosMsg::Success {
                seq_no,
                message,
                msg_id,
                sender,
            } => self.on_success(*seq_no, message, *msg_id, sender),
            _ => {}
        }
    }

    fn me(&self) -> Member {
        *self.membership.me()
    }

    fn on_new_view(&mut self, leader: &Member, view_number: ViewNumber) {
        if view_number == self.view_number && *leader == self.leader {
            // resent by a leader that missed our reply
            debug!("{} re-accepts view {} led by {}", self.me(), view_number, leader);
        } else if view_number <= self.view_number {
            debug!(
                "{} ignores stale view {} from {}, current view {}",
                self.me(),
                view_number,
                leader,
                self.view_number
            );
            return;
        } else {
            info!("{} accepts view {} led by {}", self.me(), view_number, leader);
            self.view_number = view_number;
            self.leader = *leader;
        }

        let reply = PaxosMsg::ViewAccepted {
            view_number,
            accepted: self.accepted.clone(),
            sender: self.me(),
        };
        send_msg(self.comm.as_ref(), leader, &reply);
    }

    fn on_accept(
        &mut self,
        view_no: ViewNumber,
        seq_no: SeqNo,
        message: &Payload,
        msg_id: MsgId,
        sender: &Member,
    ) {
        if view_no < self.view_number {
            debug!(
                "{} aborts slot {} of stale view {}, current view {}",
                self.me(),
                seq_no,
                view_no,
                self.view_number
            );
            send_msg(
                self.comm.as_ref(),
                sender,
                &PaxosMsg::Abort { view_no, seq_no },
            );
            return;
        }
        if view_no > self.view_number {
            // The sender completed an election this member missed.
            info!(
                "{} adopts view {} led by {} from accept",
                self.me(),
                view_no,
                sender
            );
            self.view_number = view_no;
            self.leader = *sender;
        }

        self.accepted
            .insert(seq_no, Acceptance::new(view_no, message.clone(), msg_id));
        let reply = PaxosMsg::Accepted {
            view_no,
            seq_no,
            msg_id,
            missing_success: self.missing.missing(seq_no),
            sender: self.me(),
        };
        send_msg(self.comm.as_ref(), sender, &reply);
    }

    fn on_success(&mut self, seq_no: SeqNo, message: &Payload, msg_id: MsgId, sender: &Member) {
        if self.receiver.receive(seq_no, message) {
            self.missing.received(seq_no);
        }
        if msg_id != NO_OP_MSG_ID {
            self.notifier.unblock(msg_id);
        }
        let ack = PaxosMsg::SuccessAck {
            seq_no,
            msg_id,
            sender: self.me(),
        };
        send_msg(self.comm.as_ref(), sender, &ack);
    }

    /// Hands a locally originated message to the believed leader.
    pub fn forward_broadcast(&self, message: Payload, msg_id: MsgId) {
        if message.is_no_op() {
            warn!("refuse to broadcast a no-op");
            return;
        }
        debug!("{} forwards {} to leader {}", self.me(), msg_id, self.leader);
        send_msg(
            self.comm.as_ref(),
            &self.leader,
            &PaxosMsg::BroadcastRequest { message, msg_id },
        );
    }

    #[inline]
    pub fn leader(&self) -> &Member {
        &self.leader
    }

    #[inline]
    pub fn view_number(&self) -> ViewNumber {
        self.view_number
    }

    pub fn accepted(&self, seq_no: SeqNo) -> Option<&Acceptance> {
        self.accepted.get(&seq_no)
    }

    #[inline]
    pub fn delivered_up_to(&self) -> SeqNo {
        self.receiver.delivered_up_to()
    }
}
