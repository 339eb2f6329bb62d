use px_data::{MsgId, Payload, ViewNumber};

/// Leader-side state of one slot: what was proposed and the newest
/// accepted outcome seen for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    proposed: Payload,
    newest_view: ViewNumber,
    newest_outcome: Payload,
    newest_msg_id: MsgId,
}

impl Proposal {
    pub fn new(view: ViewNumber, proposed: Payload, msg_id: MsgId) -> Self {
        Self {
            newest_outcome: proposed.clone(),
            proposed,
            newest_view: view,
            newest_msg_id: msg_id,
        }
    }

    /// Keeps the outcome only if `view` is strictly newer than the one held.
    pub fn accept_outcome(&mut self, view: ViewNumber, outcome: Payload, msg_id: MsgId) -> bool {
        if view > self.newest_view {
            self.newest_view = view;
            self.newest_outcome = outcome;
            self.newest_msg_id = msg_id;
            true
        } else {
            false
        }
    }

    pub fn proposed(&self) -> &Payload {
        &self.proposed
    }

    pub fn newest_view(&self) -> ViewNumber {
        self.newest_view
    }

    pub fn newest_outcome(&self) -> &Payload {
        &self.newest_outcome
    }

    pub fn newest_msg_id(&self) -> MsgId {
        self.newest_msg_id
    }
}
