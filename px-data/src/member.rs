//! Group members and the immutable membership view.

use serde::{Deserialize, Serialize};
use std::{
    cmp::Ordering,
    collections::BTreeSet,
    fmt,
    net::{IpAddr, SocketAddr},
    str::FromStr,
};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MembershipErr {
    #[error("member list is empty")]
    EmptyGroup,

    #[error("could not find {0} in {1:?}")]
    NotInGroup(Member, Vec<Member>),

    #[error("position {0} out of range, group size is {1}")]
    InvalidPosition(usize, usize),

    #[error("invalid member address {0}")]
    InvalidAddress(String),
}

/// Identity of a node: network address plus port.
///
/// Members are totally ordered by address octets (unsigned), then by port.
/// This order decides the default leader and every tie-break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Member {
    addr: IpAddr,
    port: u16,
}

impl Member {
    pub fn new(addr: IpAddr, port: u16) -> Self {
        Self { addr, port }
    }

    #[inline(always)]
    pub fn addr(&self) -> IpAddr {
        self.addr
    }

    #[inline(always)]
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.addr, self.port)
    }
}

impl From<SocketAddr> for Member {
    fn from(sa: SocketAddr) -> Self {
        Member::new(sa.ip(), sa.port())
    }
}

impl FromStr for Member {
    type Err = MembershipErr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<SocketAddr>()
            .map(Member::from)
            .map_err(|_| MembershipErr::InvalidAddress(s.to_string()))
    }
}

impl Ord for Member {
    fn cmp(&self, other: &Self) -> Ordering {
        let octets = |ip: &IpAddr| match ip {
            IpAddr::V4(v4) => (0u8, v4.octets().to_vec()),
            IpAddr::V6(v6) => (1u8, v6.octets().to_vec()),
        };
        octets(&self.addr)
            .cmp(&octets(&other.addr))
            .then(self.port.cmp(&other.port))
    }
}

impl PartialOrd for Member {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.socket_addr())
    }
}

/// The highest-ordered member of `members` leads by default.
pub fn select_leader<'a>(members: impl IntoIterator<Item = &'a Member>) -> Option<Member> {
    members.into_iter().max().copied()
}

/// Sorted list of all members plus the local member and its index.
/// Fixed for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct GroupMembership {
    members: Vec<Member>,
    me: Member,
    position: usize,
}

impl GroupMembership {
    pub fn new(members: impl IntoIterator<Item = Member>, me: Member) -> Result<Self, MembershipErr> {
        let mut members = members.into_iter().collect::<Vec<Member>>();
        if members.is_empty() {
            return Err(MembershipErr::EmptyGroup);
        }
        members.sort();
        members.dedup();

        let position = members
            .iter()
            .position(|m| m == &me)
            .ok_or_else(|| MembershipErr::NotInGroup(me, members.clone()))?;

        Ok(Self {
            members,
            me,
            position,
        })
    }

    /// Build from the configured (unsorted) list and the index of this node in it.
    pub fn with_position(members: Vec<Member>, i: usize) -> Result<Self, MembershipErr> {
        let me = *members
            .get(i)
            .ok_or(MembershipErr::InvalidPosition(i, members.len()))?;
        Self::new(members, me)
    }

    #[inline(always)]
    pub fn me(&self) -> &Member {
        &self.me
    }

    #[inline(always)]
    pub fn members(&self) -> &[Member] {
        &self.members
    }

    #[inline(always)]
    pub fn group_size(&self) -> usize {
        self.members.len()
    }

    /// Index of the local member in the sorted list.
    #[inline(always)]
    pub fn position_in_group(&self) -> usize {
        self.position
    }

    /// Strict majority of the fixed member set.
    #[inline(always)]
    pub fn quorum_size(&self) -> usize {
        self.members.len() / 2 + 1
    }

    pub fn default_leader(&self) -> Member {
        // members is never empty
        self.members[self.members.len() - 1]
    }

    pub fn all(&self) -> BTreeSet<Member> {
        self.members.iter().copied().collect()
    }

    pub fn contains(&self, m: &Member) -> bool {
        self.members.binary_search(m).is_ok()
    }
}
