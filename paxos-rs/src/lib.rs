//! Multi-Paxos core of a replicated group.
//!
//! Everything here is sans-IO: bytes go out through [`traits::CommLayer`],
//! bytes and clock ticks come in through [`machine::PaxosMachine`].

pub mod acceptor;
pub mod config;
pub mod failure;
pub mod leader;
pub mod machine;
pub mod proposal;
pub mod quorum;
pub mod traits;
pub mod utils;

pub use config::PaxosConfig;
pub use machine::{DispatchErr, PaxosMachine, Snapshot};
pub use traits::{CommLayer, CommitNotifier, FailureListener, Receiver};

#[cfg(test)]
mod tests;
