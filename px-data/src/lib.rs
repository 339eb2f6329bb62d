//! Data model and wire protocol shared by every role of the paxos group.

pub mod member;
pub mod msg;
pub mod txn;

pub use member::*;
pub use msg::*;
pub use txn::*;

/// Epoch of leadership. Encodes a ballot counter and the proposer's group index.
pub type ViewNumber = u64;
/// Position of a message in the agreed total order. The first slot is 1.
pub type SeqNo = u64;
pub type MsgId = u64;
/// Logical clock driven by the ticker. Milliseconds on a real node.
pub type LogicalTime = u64;

/// Message id carried by no-op fillers.
pub const NO_OP_MSG_ID: MsgId = 0;
