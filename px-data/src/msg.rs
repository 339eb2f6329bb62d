use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

use crate::{LogicalTime, Member, MsgId, SeqNo, ViewNumber};

#[derive(Debug, Error)]
pub enum CodecErr {
    #[error("can't encode message: {0}")]
    Encode(serde_json::Error),

    #[error("can't decode message: {0}")]
    Decode(serde_json::Error),
}

/// Value decided for a slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    /// Filler committed only to keep the order gap-free. No cache effect.
    NoOp,
    App(Vec<u8>),
}

impl Payload {
    pub fn app(cont: impl AsRef<[u8]>) -> Self {
        Payload::App(cont.as_ref().to_vec())
    }

    #[inline]
    pub fn is_no_op(&self) -> bool {
        matches!(self, Payload::NoOp)
    }
}

/// What an acceptor recorded for one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acceptance {
    pub view_number: ViewNumber,
    pub message: Payload,
    pub msg_id: MsgId,
}

impl Acceptance {
    pub fn new(view_number: ViewNumber, message: Payload, msg_id: MsgId) -> Self {
        Self {
            view_number,
            message,
            msg_id,
        }
    }
}

/// Every record exchanged by the group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaxosMsg {
    Heartbeat {
        sender: Member,
    },
    /// Internal clock event. Never sent over the wire.
    Tick {
        time: LogicalTime,
    },
    NewView {
        leader: Member,
        view_number: ViewNumber,
    },
    ViewAccepted {
        view_number: ViewNumber,
        accepted: BTreeMap<SeqNo, Acceptance>,
        sender: Member,
    },
    Accept {
        view_no: ViewNumber,
        seq_no: SeqNo,
        message: Payload,
        msg_id: MsgId,
        sender: Member,
    },
    Accepted {
        view_no: ViewNumber,
        seq_no: SeqNo,
        msg_id: MsgId,
        missing_success: BTreeSet<SeqNo>,
        sender: Member,
    },
    Abort {
        view_no: ViewNumber,
        seq_no: SeqNo,
    },
    Success {
        seq_no: SeqNo,
        message: Payload,
        msg_id: MsgId,
        sender: Member,
    },
    SuccessAck {
        seq_no: SeqNo,
        msg_id: MsgId,
        sender: Member,
    },
    BroadcastRequest {
        message: Payload,
        msg_id: MsgId,
    },
}

impl PaxosMsg {
    pub fn sender(&self) -> Option<&Member> {
        match self {
            PaxosMsg::Heartbeat { sender }
            | PaxosMsg::ViewAccepted { sender, .. }
            | PaxosMsg::Accept { sender, .. }
            | PaxosMsg::Accepted { sender, .. }
            | PaxosMsg::Success { sender, .. }
            | PaxosMsg::SuccessAck { sender, .. } => Some(sender),
            PaxosMsg::NewView { leader, .. } => Some(leader),
            _ => None,
        }
    }

    #[inline]
    pub fn is_tick(&self) -> bool {
        matches!(self, PaxosMsg::Tick { .. })
    }

    pub fn encode(&self) -> Result<Vec<u8>, CodecErr> {
        serde_json::to_vec(self).map_err(CodecErr::Encode)
    }

    pub fn decode(buf: &[u8]) -> Result<PaxosMsg, CodecErr> {
        serde_json::from_slice(buf).map_err(CodecErr::Decode)
    }
}

impl fmt::Display for PaxosMsg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaxosMsg::Heartbeat { sender } => write!(f, "HEARTBEAT from {}", sender),
            PaxosMsg::Tick { time } => write!(f, "TICK {}", time),
            PaxosMsg::NewView {
                leader,
                view_number,
            } => write!(f, "NEW_VIEW {} {}", view_number, leader),
            PaxosMsg::ViewAccepted {
                view_number,
                accepted,
                sender,
            } => write!(
                f,
                "VIEW_ACCEPTED {} ({} slots) from {}",
                view_number,
                accepted.len(),
                sender
            ),
            PaxosMsg::Accept {
                view_no,
                seq_no,
                msg_id,
                ..
            } => write!(f, "ACCEPT {} {} {}", view_no, seq_no, msg_id),
            PaxosMsg::Accepted {
                seq_no,
                msg_id,
                missing_success,
                sender,
                ..
            } => write!(
                f,
                "ACCEPTED {} {} missing({:?}) from {}",
                seq_no, msg_id, missing_success, sender
            ),
            PaxosMsg::Abort { view_no, seq_no } => write!(f, "ABORT {} {}", view_no, seq_no),
            PaxosMsg::Success { seq_no, msg_id, .. } => {
                write!(f, "SUCCESS {} {}", seq_no, msg_id)
            }
            PaxosMsg::SuccessAck {
                seq_no,
                msg_id,
                sender,
            } => write!(f, "SUCCESS_ACK {} {} from {}", seq_no, msg_id, sender),
            PaxosMsg::BroadcastRequest { msg_id, .. } => write!(f, "BROADCAST_REQ {}", msg_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_accepted_survives_codec() {
        let sender: Member = "127.0.0.1:2440".parse().unwrap();
        let mut accepted = BTreeMap::new();
        accepted.insert(3, Acceptance::new(7, Payload::app("put(k,v)"), 1_000_001));
        accepted.insert(4, Acceptance::new(7, Payload::NoOp, 0));

        let msg = PaxosMsg::ViewAccepted {
            view_number: 7,
            accepted,
            sender,
        };
        let buf = msg.encode().unwrap();
        assert_eq!(PaxosMsg::decode(&buf).unwrap(), msg);
    }

    #[test]
    fn test_decode_garbage() {
        assert!(matches!(
            PaxosMsg::decode(b"\x00\x01garbage"),
            Err(CodecErr::Decode(_))
        ));
    }

    #[test]
    fn test_sender() {
        let leader: Member = "127.0.0.1:2440".parse().unwrap();
        let nv = PaxosMsg::NewView {
            leader,
            view_number: 3,
        };
        assert_eq!(nv.sender(), Some(&leader));
        assert_eq!(PaxosMsg::Abort { view_no: 1, seq_no: 1 }.sender(), None);
        assert!(PaxosMsg::Tick { time: 10 }.is_tick());
    }
}
