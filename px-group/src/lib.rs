//! Runs a Paxos group member on tokio: network receive loop, clock ticks and
//! a single dispatcher owning the protocol state.

pub mod config;
pub mod group;
pub mod network;
pub mod timer;
pub mod transport;
mod utils;

pub use config::GroupConfig;
pub use group::{GroupErr, PaxosGroup};
pub use network::{MemNetwork, MemTransport};
pub use timer::WaitingTimer;
pub use transport::{Transport, TransportComm, TransportErr, UdpTransport};
