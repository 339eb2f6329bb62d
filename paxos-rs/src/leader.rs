//! Leader side: election, MultiAccept and MultiSuccess rounds.
//!
//! Every member runs a `LeaderRole`, but only the one holding the current
//! view (`elected`) drives slots. Each round is a [`QuorumRequest`]; the
//! round callbacks record follow-up rounds in [`LeaderState::spawned`],
//! which the role starts after the current message is dispatched.

use log::{debug, info, trace, warn};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use px_data::{
    select_leader, Acceptance, GroupMembership, LogicalTime, Member, MsgId, Payload, PaxosMsg,
    SeqNo, ViewNumber, NO_OP_MSG_ID,
};

use crate::config::PaxosConfig;
use crate::proposal::Proposal;
use crate::quorum::{QuorumPhase, QuorumRequest};
use crate::traits::{CommLayer, FailureListener};
use crate::utils::{next_view_number, send_msg};

/// Ids of this many recently committed messages are remembered to drop
/// retried broadcast requests.
pub const RECENTLY_COMMITTED_WINDOW: usize = 4096;

#[derive(Debug, Clone)]
enum Spawn {
    Accept {
        seq_no: SeqNo,
        message: Payload,
        msg_id: MsgId,
    },
    Success {
        seq_no: SeqNo,
        message: Payload,
        msg_id: MsgId,
    },
}

#[derive(Debug, Default)]
struct RecentIds {
    order: VecDeque<MsgId>,
    ids: HashSet<MsgId>,
}

impl RecentIds {
    fn push(&mut self, id: MsgId) {
        if id == NO_OP_MSG_ID || !self.ids.insert(id) {
            return;
        }
        self.order.push_back(id);
        if self.order.len() > RECENTLY_COMMITTED_WINDOW {
            if let Some(old) = self.order.pop_front() {
                self.ids.remove(&old);
            }
        }
    }

    fn contains(&self, id: &MsgId) -> bool {
        self.ids.contains(id)
    }
}

/// State shared by every round of the leader.
pub struct LeaderState {
    membership: Arc<GroupMembership>,
    comm: Arc<dyn CommLayer>,
    config: PaxosConfig,

    proposals: BTreeMap<SeqNo, Proposal>,
    successful: HashMap<SeqNo, (Payload, MsgId)>,
    circulating: HashSet<MsgId>,
    recently_committed: RecentIds,

    view_number: ViewNumber,
    seq_no: SeqNo,
    elected: bool,
    time: LogicalTime,

    spawned: Vec<Spawn>,
}

impl LeaderState {
    fn me(&self) -> Member {
        *self.membership.me()
    }

    fn on_new_view(&mut self, leader: &Member, view_number: ViewNumber) {
        if view_number <= self.view_number {
            return;
        }
        self.view_number = view_number;
        if *leader != self.me() && self.elected {
            info!(
                "{} steps down, {} leads view {}",
                self.me(),
                leader,
                view_number
            );
            self.elected = false;
        }
    }

    /// Folds one acceptor's accepted slots into the proposals.
    fn register_view_acceptance(&mut self, accepted: &BTreeMap<SeqNo, Acceptance>) {
        for (seq_no, acc) in accepted.iter() {
            match self.proposals.get_mut(seq_no) {
                Some(p) => {
                    p.accept_outcome(acc.view_number, acc.message.clone(), acc.msg_id);
                }
                None => {
                    self.proposals.insert(
                        *seq_no,
                        Proposal::new(acc.view_number, acc.message.clone(), acc.msg_id),
                    );
                }
            }
        }
    }

    fn register_acceptance(
        &mut self,
        view_no: ViewNumber,
        seq_no: SeqNo,
        message: &Payload,
        msg_id: MsgId,
    ) {
        match self.proposals.get_mut(&seq_no) {
            Some(p) => {
                p.accept_outcome(view_no, message.clone(), msg_id);
            }
            None => {
                self.proposals
                    .insert(seq_no, Proposal::new(view_no, message.clone(), msg_id));
            }
        }
    }

    /// Replays `Success` for slots the acceptor reported missing.
    fn send_missing_success(&self, missing: &BTreeSet<SeqNo>, to: &Member) {
        for seq_no in missing {
            if let Some((message, msg_id)) = self.successful.get(seq_no) {
                debug!("{} replays success {} to {}", self.me(), seq_no, to);
                let msg = PaxosMsg::Success {
                    seq_no: *seq_no,
                    message: message.clone(),
                    msg_id: *msg_id,
                    sender: self.me(),
                };
                send_msg(self.comm.as_ref(), to, &msg);
            }
        }
    }

    /// Re-drives every known proposal and fills the gaps with no-ops.
    fn on_elected(&mut self, view_number: ViewNumber) {
        if view_number != self.view_number {
            debug!(
                "{} won stale view {}, current view {}",
                self.me(),
                view_number,
                self.view_number
            );
            return;
        }
        info!("{} elected in view {}", self.me(), view_number);
        self.elected = true;

        if let Some(highest) = self.proposals.keys().next_back() {
            self.seq_no = self.seq_no.max(*highest);
        }
        for seq_no in 1..=self.seq_no {
            if !self.proposals.contains_key(&seq_no) {
                self.proposals.insert(
                    seq_no,
                    Proposal::new(view_number, Payload::NoOp, NO_OP_MSG_ID),
                );
            }
        }

        let seq_nos = self
            .proposals
            .keys()
            .filter(|s| !self.successful.contains_key(s))
            .copied()
            .collect::<Vec<SeqNo>>();
        for seq_no in seq_nos {
            if let Some(p) = self.proposals.get(&seq_no) {
                let (message, msg_id) = (p.newest_outcome().clone(), p.newest_msg_id());
                if msg_id != NO_OP_MSG_ID {
                    self.circulating.insert(msg_id);
                }
                self.spawned.push(Spawn::Accept {
                    seq_no,
                    message,
                    msg_id,
                });
            }
        }
    }

    fn on_chosen(&mut self, seq_no: SeqNo, message: &Payload, msg_id: MsgId) {
        debug!("{} slot {} chosen: {}", self.me(), seq_no, msg_id);
        self.successful.insert(seq_no, (message.clone(), msg_id));
        self.spawned.push(Spawn::Success {
            seq_no,
            message: message.clone(),
            msg_id,
        });
    }

    fn on_fully_acked(&mut self, seq_no: SeqNo, msg_id: MsgId) {
        trace!("{} slot {} acked by all", self.me(), seq_no);
        self.successful.remove(&seq_no);
        self.circulating.remove(&msg_id);
        self.recently_committed.push(msg_id);
    }
}

/// Campaigns for `view_number`.
pub struct Election {
    view_number: ViewNumber,
    won: bool,
}

impl QuorumPhase for Election {
    type Ctx = LeaderState;
    type Response = ();

    fn filter(&mut self, ctx: &mut LeaderState, msg: &PaxosMsg) -> Option<(Member, ())> {
        match msg {
            PaxosMsg::ViewAccepted {
                view_number,
                accepted,
                sender,
            } if *view_number == self.view_number => {
                // Outcomes reported after the quorum are not re-driven.
                if !self.won {
                    ctx.register_view_acceptance(accepted);
                }
                Some((*sender, ()))
            }
            _ => None,
        }
    }

    fn on_quorum_reached(&mut self, ctx: &mut LeaderState) {
        self.won = true;
        ctx.on_elected(self.view_number);
    }
}

/// Phase 2 for one slot.
pub struct MultiAccept {
    view_no: ViewNumber,
    seq_no: SeqNo,
    message: Payload,
    msg_id: MsgId,
}

impl QuorumPhase for MultiAccept {
    type Ctx = LeaderState;
    type Response = ();

    fn filter(&mut self, ctx: &mut LeaderState, msg: &PaxosMsg) -> Option<(Member, ())> {
        match msg {
            PaxosMsg::Accepted {
                view_no,
                seq_no,
                missing_success,
                sender,
                ..
            } if *view_no == self.view_no && *seq_no == self.seq_no => {
                ctx.register_acceptance(self.view_no, self.seq_no, &self.message, self.msg_id);
                ctx.send_missing_success(missing_success, sender);
                Some((*sender, ()))
            }
            _ => None,
        }
    }

    fn on_quorum_reached(&mut self, ctx: &mut LeaderState) {
        ctx.on_chosen(self.seq_no, &self.message, self.msg_id);
    }
}

/// Propagates a chosen slot until every member acknowledged it.
pub struct MultiSuccess {
    seq_no: SeqNo,
    msg_id: MsgId,
}

impl QuorumPhase for MultiSuccess {
    type Ctx = LeaderState;
    type Response = ();

    fn filter(&mut self, _ctx: &mut LeaderState, msg: &PaxosMsg) -> Option<(Member, ())> {
        match msg {
            PaxosMsg::SuccessAck {
                seq_no,
                msg_id,
                sender,
            } if *seq_no == self.seq_no && *msg_id == self.msg_id => Some((*sender, ())),
            _ => None,
        }
    }

    fn on_completed(&mut self, ctx: &mut LeaderState) -> bool {
        ctx.on_fully_acked(self.seq_no, self.msg_id);
        true
    }
}

pub struct LeaderRole {
    state: LeaderState,
    elections: Vec<QuorumRequest<Election>>,
    accepts: Vec<QuorumRequest<MultiAccept>>,
    successes: Vec<QuorumRequest<MultiSuccess>>,
}

impl LeaderRole {
    /// The default leader starts campaigning right away.
    pub fn new(
        membership: Arc<GroupMembership>,
        comm: Arc<dyn CommLayer>,
        config: PaxosConfig,
        time: LogicalTime,
    ) -> Self {
        let is_default_leader = membership.default_leader() == *membership.me();
        let mut role = Self {
            state: LeaderState {
                membership,
                comm,
                config,
                proposals: BTreeMap::new(),
                successful: HashMap::new(),
                circulating: HashSet::new(),
                recently_committed: RecentIds::default(),
                view_number: 0,
                seq_no: 0,
                elected: false,
                time,
                spawned: Vec::new(),
            },
            elections: Vec::new(),
            accepts: Vec::new(),
            successes: Vec::new(),
        };
        if is_default_leader {
            role.start_election();
        }
        role
    }

    pub fn dispatch(&mut self, msg: &PaxosMsg) {
        match msg {
            PaxosMsg::Tick { time } => self.state.time = *time,
            PaxosMsg::NewView {
                leader,
                view_number,
            } => self.on_new_view(leader, *view_number),
            PaxosMsg::Accept {
                view_no, sender, ..
            } => self.on_new_view(sender, *view_no),
            PaxosMsg::Abort { view_no, seq_no } => self.on_abort(*view_no, *seq_no),
            PaxosMsg::BroadcastRequest { message, msg_id } => {
                self.on_broadcast_request(message, *msg_id)
            }
            _ => {}
        }

        let state = &mut self.state;
        for r in self.elections.iter_mut() {
            r.receive(state, msg);
        }
        for r in self.accepts.iter_mut() {
            r.receive(state, msg);
        }
        for r in self.successes.iter_mut() {
            r.receive(state, msg);
        }
        self.elections.retain(|r| !r.is_finished());
        self.accepts.retain(|r| !r.is_finished());
        self.successes.retain(|r| !r.is_finished());

        self.start_spawned();
    }

    fn start_election(&mut self) {
        let s = &mut self.state;
        let view_number = next_view_number(
            s.view_number,
            s.membership.group_size(),
            s.membership.position_in_group(),
        );
        s.view_number = view_number;
        s.elected = false;
        info!("{} campaigns for view {}", s.me(), view_number);
        for r in self.elections.iter_mut() {
            r.finish();
        }

        let request = PaxosMsg::NewView {
            leader: s.me(),
            view_number,
        };
        let phase = Election {
            view_number,
            won: false,
        };
        let r = QuorumRequest::new(
            s.membership.clone(),
            s.comm.clone(),
            &request,
            s.time,
            s.config.resend_interval,
            phase,
        );
        self.elections.push(r);
    }

    fn start_spawned(&mut self) {
        let spawned = std::mem::take(&mut self.state.spawned);
        for spawn in spawned {
            match spawn {
                Spawn::Accept {
                    seq_no,
                    message,
                    msg_id,
                } => self.start_accept(seq_no, message, msg_id),
                Spawn::Success {
                    seq_no,
                    message,
                    msg_id,
                } => self.start_success(seq_no, message, msg_id),
            }
        }
    }

    fn start_accept(&mut self, seq_no: SeqNo, message: Payload, msg_id: MsgId) {
        let s = &self.state;
        let view_no = s.view_number;
        let request = PaxosMsg::Accept {
            view_no,
            seq_no,
            message: message.clone(),
            msg_id,
            sender: s.me(),
        };
        let phase = MultiAccept {
            view_no,
            seq_no,
            message,
            msg_id,
        };
        let r = QuorumRequest::new(
            s.membership.clone(),
            s.comm.clone(),
            &request,
            s.time,
            s.config.resend_interval,
            phase,
        );
        self.accepts.push(r);
    }

    fn start_success(&mut self, seq_no: SeqNo, message: Payload, msg_id: MsgId) {
        let s = &self.state;
        let request = PaxosMsg::Success {
            seq_no,
            message,
            msg_id,
            sender: s.me(),
        };
        let r = QuorumRequest::new(
            s.membership.clone(),
            s.comm.clone(),
            &request,
            s.time,
            s.config.resend_interval,
            MultiSuccess { seq_no, msg_id },
        );
        self.successes.push(r);
    }

    fn on_new_view(&mut self, leader: &Member, view_number: ViewNumber) {
        self.state.on_new_view(leader, view_number);
        if *leader != self.state.me() {
            // Campaigns for older views can no longer win.
            for r in self.elections.iter_mut() {
                if r.phase().view_number < view_number {
                    r.finish();
                }
            }
        }
    }

    fn on_broadcast_request(&mut self, message: &Payload, msg_id: MsgId) {
        let s = &mut self.state;
        if !s.elected {
            debug!("{} not elected, drop broadcast request {}", s.me(), msg_id);
            return;
        }
        if message.is_no_op() {
            warn!("{} drop no-op broadcast request", s.me());
            return;
        }
        if s.circulating.contains(&msg_id) || s.recently_committed.contains(&msg_id) {
            debug!("{} already ordering {}", s.me(), msg_id);
            return;
        }
        s.circulating.insert(msg_id);
        s.seq_no += 1;
        let seq_no = s.seq_no;
        s.proposals
            .insert(seq_no, Proposal::new(s.view_number, message.clone(), msg_id));
        s.spawned.push(Spawn::Accept {
            seq_no,
            message: message.clone(),
            msg_id,
        });
    }

    fn on_abort(&mut self, view_no: ViewNumber, seq_no: SeqNo) {
        for r in self.accepts.iter_mut() {
            let p = r.phase();
            if p.view_no == view_no && p.seq_no == seq_no && !r.is_quorum_reached() {
                debug!("{} abandons slot {} of view {}", self.state.me(), seq_no, view_no);
                let msg_id = p.msg_id;
                r.finish();
                self.state.proposals.remove(&seq_no);
                self.state.circulating.remove(&msg_id);
            }
        }
    }

    #[inline]
    pub fn view_number(&self) -> ViewNumber {
        self.state.view_number
    }

    #[inline]
    pub fn is_elected(&self) -> bool {
        self.state.elected
    }

    /// Highest slot assigned so far.
    #[inline]
    pub fn seq_no(&self) -> SeqNo {
        self.state.seq_no
    }

    pub fn proposal(&self, seq_no: SeqNo) -> Option<&Proposal> {
        self.state.proposals.get(&seq_no)
    }

    pub fn in_flight(&self) -> usize {
        self.elections.len() + self.accepts.len() + self.successes.len()
    }
}

impl FailureListener for LeaderRole {
    fn member_failed(&mut self, failed: &Member, alive: &BTreeSet<Member>) {
        let me = self.state.me();
        if select_leader(alive) != Some(me) {
            return;
        }
        if self.state.elected {
            debug!("{} already leads, {} failed", me, failed);
            return;
        }
        info!("{} takes over after {} failed", me, failed);
        self.start_election();
    }
}
