//! Broadcast-and-collect primitive shared by every leader phase.

use fnv::FnvHashMap;
use log::{debug, trace};
use std::sync::Arc;
use thiserror::Error;

use px_data::{GroupMembership, LogicalTime, Member, PaxosMsg};

use crate::traits::CommLayer;
use crate::utils::encode_or_log;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QuorumErr {
    #[error("recv response from non-member {0}")]
    NotAMember(Member),

    #[error("recv duplicate response from {0}")]
    DuplicateResponse(Member),

    #[error("request already finished")]
    Finished,
}

/// Phase-specific behavior plugged into a [`QuorumRequest`].
pub trait QuorumPhase {
    /// Shared state the phase callbacks mutate.
    type Ctx;
    type Response;

    /// Returns `Some((responder, response))` if `msg` answers this request.
    fn filter(&mut self, ctx: &mut Self::Ctx, msg: &PaxosMsg) -> Option<(Member, Self::Response)>;

    /// Fired once, when a strict majority has responded.
    fn on_quorum_reached(&mut self, _ctx: &mut Self::Ctx) {}

    /// Fired once, when every member has responded. Returns whether the
    /// request is done.
    fn on_completed(&mut self, _ctx: &mut Self::Ctx) -> bool {
        true
    }
}

pub struct QuorumRequest<P: QuorumPhase> {
    membership: Arc<GroupMembership>,
    comm: Arc<dyn CommLayer>,
    request: Vec<u8>,
    responses: FnvHashMap<Member, P::Response>,

    resend_interval: LogicalTime,
    last_resend: LogicalTime,

    quorum_reached: bool,
    completed: bool,
    finished: bool,
    phase: P,
}

impl<P: QuorumPhase> QuorumRequest<P> {
    /// Sends `request` to every member, self included.
    pub fn new(
        membership: Arc<GroupMembership>,
        comm: Arc<dyn CommLayer>,
        request: &PaxosMsg,
        time: LogicalTime,
        resend_interval: LogicalTime,
        phase: P,
    ) -> Self {
        let request = encode_or_log(request).unwrap_or_default();
        let qr = Self {
            membership,
            comm,
            request,
            responses: FnvHashMap::default(),
            resend_interval,
            last_resend: time,
            quorum_reached: false,
            completed: false,
            finished: false,
            phase,
        };
        qr.send_to(qr.membership.members());
        qr
    }

    fn send_to(&self, members: &[Member]) {
        if self.request.is_empty() {
            return;
        }
        self.comm.send_to_all(members, &self.request);
    }

    pub fn receive(&mut self, ctx: &mut P::Ctx, msg: &PaxosMsg) {
        if self.finished {
            return;
        }
        if let PaxosMsg::Tick { time } = msg {
            self.tick(*time);
            return;
        }
        if let Some((from, resp)) = self.phase.filter(ctx, msg) {
            if let Err(e) = self.add_response(from, resp) {
                trace!("{}", e);
                return;
            }

            if !self.quorum_reached && self.responses.len() >= self.membership.quorum_size() {
                self.quorum_reached = true;
                self.phase.on_quorum_reached(ctx);
            }

            if !self.completed && self.responses.len() == self.membership.group_size() {
                self.completed = true;
                if self.phase.on_completed(ctx) {
                    self.finish();
                }
            }
        }
    }

    fn add_response(&mut self, from: Member, resp: P::Response) -> Result<(), QuorumErr> {
        if self.finished {
            return Err(QuorumErr::Finished);
        }
        if !self.membership.contains(&from) {
            return Err(QuorumErr::NotAMember(from));
        }
        if self.responses.contains_key(&from) {
            return Err(QuorumErr::DuplicateResponse(from));
        }
        self.responses.insert(from, resp);
        Ok(())
    }

    /// Resends to members that have not answered yet once `resend_interval`
    /// has passed since the last send.
    pub fn tick(&mut self, time: LogicalTime) {
        if self.finished || time <= self.last_resend + self.resend_interval {
            return;
        }
        self.last_resend = time;
        let silent = self
            .membership
            .members()
            .iter()
            .filter(|m| !self.responses.contains_key(m))
            .copied()
            .collect::<Vec<Member>>();
        if !silent.is_empty() {
            debug!("resend to {} silent member(s)", silent.len());
            self.send_to(&silent);
        }
    }

    /// Stops resends and further response handling.
    #[inline]
    pub fn finish(&mut self) {
        self.finished = true;
    }

    #[inline]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    #[inline]
    pub fn is_quorum_reached(&self) -> bool {
        self.quorum_reached
    }

    pub fn responses(&self) -> &FnvHashMap<Member, P::Response> {
        &self.responses
    }

    #[inline]
    pub fn phase(&self) -> &P {
        &self.phase
    }
}
