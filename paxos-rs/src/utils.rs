//! Helpers shared by the roles.

use log::error;
use px_data::{Member, PaxosMsg, ViewNumber};

use crate::traits::CommLayer;

/// Next view owned by the member at `position`:
/// `((previous / group_size) + 1) * group_size + position`.
/// Unique across members and strictly greater than `previous`.
#[inline]
pub fn next_view_number(previous: ViewNumber, group_size: usize, position: usize) -> ViewNumber {
    let n = group_size as ViewNumber;
    (previous / n + 1) * n + position as ViewNumber
}

pub(crate) fn encode_or_log(msg: &PaxosMsg) -> Option<Vec<u8>> {
    match msg.encode() {
        Ok(buf) => Some(buf),
        Err(e) => {
            error!("drop {}: {}", msg, e);
            None
        }
    }
}

pub(crate) fn send_msg(comm: &dyn CommLayer, to: &Member, msg: &PaxosMsg) {
    if let Some(buf) = encode_or_log(msg) {
        comm.send_to(to, &buf);
    }
}

#[test]
fn test_next_view_number() {
    // 3 members, position 2 is the default leader.
    assert_eq!(next_view_number(0, 3, 2), 5);
    assert_eq!(next_view_number(5, 3, 1), 7);
    assert_eq!(next_view_number(7, 3, 2), 11);
    // views of different members never collide
    assert_ne!(next_view_number(9, 3, 0), next_view_number(9, 3, 1));
}
