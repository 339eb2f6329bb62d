//! Configurations for single node or system

use std::fs::File;
use std::path::Path;

use px_data::{GroupMembership, Member, MembershipErr};
use px_group::GroupConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const NODE_NAME_LIST: [&str; 5] = ["Alice", "Bob", "Carol", "Dave", "Eve"];
pub const DEFAULT_BASE_PORT: u16 = 8800;

#[derive(Debug, Error)]
pub enum ConfigErr {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("{0}")]
    Membership(#[from] MembershipErr),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub node_name: String,
    /// "ip:port" of every member, this node included.
    pub members: Vec<String>,
    /// Index of this node in `members`.
    pub my_position: usize,
    #[serde(default)]
    pub group: GroupConfig,
    #[serde(default)]
    pub test_config: TestConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestConfig {
    NonTest,
    /// Puts `put_num` keys, then waits until the keys of every member show
    /// up locally or `timeout_ms` passes.
    LocalCluster { put_num: usize, timeout_ms: u64 },
}

impl Default for TestConfig {
    fn default() -> Self {
        TestConfig::NonTest
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            node_name: NODE_NAME_LIST[0].to_string(),
            members: (0..4)
                .map(|i| format!("127.0.0.1:{}", DEFAULT_BASE_PORT + i))
                .collect(),
            my_position: 0,
            group: GroupConfig::default(),
            test_config: TestConfig::NonTest,
        }
    }
}

impl NodeConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigErr> {
        let reader = File::open(path)?;
        Ok(serde_yaml::from_reader(reader)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigErr> {
        let writer = File::create(path)?;
        serde_yaml::to_writer(writer, self)?;
        Ok(())
    }

    pub fn parse_members(&self) -> Result<Vec<Member>, ConfigErr> {
        self.members
            .iter()
            .map(|m| m.parse::<Member>().map_err(ConfigErr::from))
            .collect()
    }

    pub fn membership(&self) -> Result<GroupMembership, ConfigErr> {
        Ok(GroupMembership::with_position(
            self.parse_members()?,
            self.my_position,
        )?)
    }

    /// Configs of a `num`-node cluster on localhost, one per member.
    pub fn local_cluster(num: usize, base_port: u16, with_name: bool) -> Vec<NodeConfig> {
        let members = (0..num)
            .map(|i| format!("127.0.0.1:{}", base_port as usize + i))
            .collect::<Vec<_>>();
        (0..num)
            .map(|i| NodeConfig {
                node_name: node_name(with_name, i),
                members: members.clone(),
                my_position: i,
                ..NodeConfig::default()
            })
            .collect()
    }
}

/// Decide name of node.
pub fn node_name(with_name: bool, i: usize) -> String {
    match NODE_NAME_LIST.get(i) {
        Some(name) if with_name => name.to_string(),
        _ => format!("node-{}", i),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_fmt() {
        let path = std::env::temp_dir().join("px-demo-alice-config.yml");
        let mut conf = NodeConfig::default();
        conf.test_config = TestConfig::LocalCluster {
            put_num: 3,
            timeout_ms: 5000,
        };
        conf.save(&path).unwrap();

        let loaded = NodeConfig::load(&path).unwrap();
        assert_eq!(loaded.node_name, "Alice");
        assert_eq!(loaded.members, conf.members);
        assert_eq!(loaded.group, conf.group);
        assert_eq!(loaded.test_config, conf.test_config);
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let conf: NodeConfig = serde_yaml::from_str(
            "node_name: Bob\nmembers: [\"127.0.0.1:9001\", \"127.0.0.1:9000\"]\nmy_position: 0\n",
        )
        .unwrap();
        assert_eq!(conf.group, GroupConfig::default());
        assert_eq!(conf.test_config, TestConfig::NonTest);

        // position refers to the configured order, not the sorted one
        let ms = conf.membership().unwrap();
        assert_eq!(*ms.me(), "127.0.0.1:9001".parse::<Member>().unwrap());
        assert_eq!(ms.position_in_group(), 1);
    }

    #[test]
    fn test_bad_member_list() {
        let mut conf = NodeConfig::default();
        conf.members.push("not-an-address".to_string());
        assert!(matches!(
            conf.membership(),
            Err(ConfigErr::Membership(MembershipErr::InvalidAddress(_)))
        ));

        let mut conf = NodeConfig::default();
        conf.my_position = 4;
        assert!(matches!(
            conf.membership(),
            Err(ConfigErr::Membership(MembershipErr::InvalidPosition(4, 4)))
        ));
    }

    #[test]
    fn test_local_cluster() {
        let confs = NodeConfig::local_cluster(5, 9100, true);
        assert_eq!(confs.len(), 5);
        assert_eq!(confs[4].node_name, "Eve");
        assert_eq!(confs[2].my_position, 2);
        assert!(confs.iter().all(|c| c.members == confs[0].members));

        assert_eq!(node_name(true, 7), "node-7");
        assert_eq!(node_name(false, 0), "node-0");
    }
}
