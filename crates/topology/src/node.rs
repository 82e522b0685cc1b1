//! Topology vertices

use serde::{Deserialize, Serialize};
use std::fmt;

/// What a node does in the emulated network
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Host,
    Switch,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRole::Host => f.write_str("host"),
            NodeRole::Switch => f.write_str("switch"),
        }
    }
}

/// A host or switch, identified by a name unique within its topology
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub role: NodeRole,
}

impl Node {
    pub fn is_host(&self) -> bool {
        self.role == NodeRole::Host
    }

    pub fn is_switch(&self) -> bool {
        self.role == NodeRole::Switch
    }
}

/// Node names end up inside interface and namespace names, so keep them to
/// characters the kernel and iproute2 accept.
pub(crate) fn is_valid_node_id(id: &str) -> bool {
    !id.is_empty()
        && !id.starts_with('-')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_validation() {
        assert!(is_valid_node_id("h1"));
        assert!(is_valid_node_id("core_sw.2"));
        assert!(is_valid_node_id("edge-1"));

        assert!(!is_valid_node_id(""));
        assert!(!is_valid_node_id("-h1"));
        assert!(!is_valid_node_id("h 1"));
        assert!(!is_valid_node_id("h1/eth0"));
    }

    #[test]
    fn test_role_serde() {
        assert_eq!(serde_json::to_string(&NodeRole::Switch).unwrap(), "\"switch\"");
        let role: NodeRole = serde_json::from_str("\"host\"").unwrap();
        assert_eq!(role, NodeRole::Host);
    }
}
