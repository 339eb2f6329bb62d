use px_data::{Member, MsgId, Payload, SeqNo};
use std::collections::BTreeSet;

/// Outbound half of the transport. Sends are fire-and-forget: an
/// implementation logs failures and drops the datagram, resend covers the loss.
pub trait CommLayer: Send + Sync {
    fn send_to(&self, member: &Member, buf: &[u8]);

    fn send_to_all(&self, members: &[Member], buf: &[u8]) {
        for m in members {
            self.send_to(m, buf);
        }
    }
}

/// Cache-update collaborator. Called once per committed slot, in slot order.
pub trait Receiver: Send {
    fn receive(&mut self, seq_no: SeqNo, message: &Payload);
}

/// Wakes a local `broadcast` waiting on `msg_id`.
pub trait CommitNotifier: Send + Sync {
    fn unblock(&self, msg_id: MsgId);
}

pub trait FailureListener {
    /// Fired once per alive -> failed transition of `failed`.
    fn member_failed(&mut self, failed: &Member, alive: &BTreeSet<Member>);
}
