//! A key-value cache replicated through the group.
//!
//! Local updates are applied right away and then broadcast. Every member
//! applies the committed events of the others in delivery order.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;

use paxos_rs::{Receiver, Snapshot};
use px_data::{GroupMembership, MsgId, Payload, SeqNo};
use px_group::{GroupConfig, GroupErr, PaxosGroup, Transport};

use crate::config::{ConfigErr, NodeConfig};

pub type Entries = Arc<RwLock<HashMap<String, String>>>;

#[derive(Debug, Error)]
pub enum CacheErr {
    #[error("{0}")]
    Group(#[from] GroupErr),

    #[error("{0}")]
    Codec(#[from] serde_json::Error),

    #[error("{0}")]
    Config(#[from] ConfigErr),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheOp {
    Put { key: String, value: String },
    Remove { key: String },
    RemoveAll,
}

/// One cache update, tagged with the position of the member that made it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEvent {
    pub requester: u64,
    pub op: CacheOp,
}

impl CacheEvent {
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn decode(buf: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(buf)
    }
}

fn write(entries: &Entries) -> RwLockWriteGuard<'_, HashMap<String, String>> {
    entries.write().unwrap_or_else(|e| e.into_inner())
}

fn read(entries: &Entries) -> RwLockReadGuard<'_, HashMap<String, String>> {
    entries.read().unwrap_or_else(|e| e.into_inner())
}

fn apply(entries: &Entries, op: &CacheOp) {
    let mut map = write(entries);
    match op {
        CacheOp::Put { key, value } => {
            map.insert(key.clone(), value.clone());
        }
        CacheOp::Remove { key } => {
            map.remove(key);
        }
        CacheOp::RemoveAll => map.clear(),
    }
}

/// Applies committed events to the local map.
pub struct ReplicatedCache {
    me: u64,
    entries: Entries,
}

impl ReplicatedCache {
    pub fn new(me: u64, entries: Entries) -> Self {
        Self { me, entries }
    }
}

impl Receiver for ReplicatedCache {
    fn receive(&mut self, seq_no: SeqNo, message: &Payload) {
        let buf = match message {
            Payload::NoOp => return,
            Payload::App(buf) => buf,
        };
        match CacheEvent::decode(buf) {
            // already applied before it was broadcast
            Ok(ev) if ev.requester == self.me => {}
            Ok(ev) => {
                debug!("apply #{} from {}: {:?}", seq_no, ev.requester, ev.op);
                apply(&self.entries, &ev.op);
            }
            Err(e) => warn!("skip #{}, not a cache event: {}", seq_no, e),
        }
    }
}

/// Local entry point of a cache member.
pub struct CacheHandle {
    me: u64,
    entries: Entries,
    group: PaxosGroup,
}

impl CacheHandle {
    pub async fn start(
        membership: GroupMembership,
        transport: Arc<dyn Transport>,
        config: GroupConfig,
    ) -> Result<Self, CacheErr> {
        let me = membership.position_in_group() as u64;
        let entries = Entries::default();
        let receiver = ReplicatedCache::new(me, entries.clone());
        let group = PaxosGroup::start(membership, transport, Box::new(receiver), config).await?;
        Ok(Self { me, entries, group })
    }

    /// Binds the UDP endpoint named by `config` and joins the group.
    pub async fn start_udp(config: &NodeConfig) -> Result<Self, CacheErr> {
        let membership = config.membership()?;
        let me = membership.position_in_group() as u64;
        let entries = Entries::default();
        let receiver = ReplicatedCache::new(me, entries.clone());
        let group = PaxosGroup::start_udp(
            config.parse_members()?,
            config.my_position,
            Box::new(receiver),
            config.group,
        )
        .await?;
        Ok(Self { me, entries, group })
    }

    async fn update(&self, op: CacheOp) -> Result<MsgId, CacheErr> {
        apply(&self.entries, &op);
        let buf = CacheEvent {
            requester: self.me,
            op,
        }
        .encode()?;
        Ok(self.group.broadcast(buf).await?)
    }

    pub async fn put(&self, key: &str, value: &str) -> Result<MsgId, CacheErr> {
        self.update(CacheOp::Put {
            key: key.to_string(),
            value: value.to_string(),
        })
        .await
    }

    pub async fn remove(&self, key: &str) -> Result<MsgId, CacheErr> {
        self.update(CacheOp::Remove {
            key: key.to_string(),
        })
        .await
    }

    pub async fn clear(&self) -> Result<MsgId, CacheErr> {
        self.update(CacheOp::RemoveAll).await
    }

    pub fn get(&self, key: &str) -> Option<String> {
        read(&self.entries).get(key).cloned()
    }

    pub fn len(&self) -> usize {
        read(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorted copy of all entries.
    pub fn entries(&self) -> BTreeMap<String, String> {
        read(&self.entries)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub async fn status(&self) -> Result<Snapshot, CacheErr> {
        Ok(self.group.status().await?)
    }

    pub async fn close(&self) {
        self.group.close().await
    }
}
