use std::sync::atomic::{AtomicU64, Ordering};

use crate::MsgId;

/// Upper bound of locally circulating message ids per member.
pub const MAX_CIRCULATING_MESSAGES: u64 = 1_000_000;

/// Generates group-unique message ids: `position * MAX + r` where the residue
/// `r` cycles through `1..MAX`. Residue 0 is never used, so position 0 never
/// yields [`NO_OP_MSG_ID`](crate::NO_OP_MSG_ID).
#[derive(Debug)]
pub struct MsgIdGenerator {
    position: u64,
    counter: AtomicU64,
}

impl MsgIdGenerator {
    pub fn new(position_in_group: usize) -> Self {
        Self {
            position: position_in_group as u64,
            counter: AtomicU64::new(0),
        }
    }

    pub fn next_id(&self) -> MsgId {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        self.position * MAX_CIRCULATING_MESSAGES + 1 + n % (MAX_CIRCULATING_MESSAGES - 1)
    }
}

#[test]
fn test_msg_id_layout() {
    let g = MsgIdGenerator::new(2);
    assert_eq!(g.next_id(), 2_000_001);
    assert_eq!(g.next_id(), 2_000_002);

    let g0 = MsgIdGenerator::new(0);
    assert_eq!(g0.next_id(), 1);
}

#[test]
fn test_msg_id_wraps_past_no_op() {
    let g = MsgIdGenerator::new(0);
    for _ in 1..MAX_CIRCULATING_MESSAGES - 1 {
        assert_ne!(g.next_id(), crate::NO_OP_MSG_ID);
    }
    assert_eq!(g.next_id(), MAX_CIRCULATING_MESSAGES - 1);
    // the counter wraps to 1, not 0
    assert_eq!(g.next_id(), 1);

    let g3 = MsgIdGenerator::new(3);
    for _ in 0..MAX_CIRCULATING_MESSAGES - 1 {
        g3.next_id();
    }
    assert_eq!(g3.next_id(), 3_000_001);
}
