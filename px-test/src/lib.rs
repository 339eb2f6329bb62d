//! Deterministic multi-member simulations of the Paxos core.
//! Kept apart from paxos-rs so scenarios drive the public API only.

pub mod delay_queue;
pub mod mocker;
mod safety;
mod utils;
