//! Static network topology descriptors
//!
//! This crate provides the data model for emulated networks: hosts and
//! switches joined by links that carry a bandwidth limit and a propagation
//! delay. Topologies are built once through [`TopologyBuilder`], which rejects
//! unknown endpoints and duplicate names as they are declared, and are
//! immutable afterwards. They can be stored as JSON and are validated again
//! on load.

pub mod builder;
pub mod delay;
pub mod link;
pub mod node;
pub mod presets;
pub mod topology;

pub use builder::TopologyBuilder;
pub use delay::{Delay, DelayError};
pub use link::{Link, LinkConfig};
pub use node::{Node, NodeRole};
pub use presets::Preset;
pub use topology::Topology;

use std::path::PathBuf;
use thiserror::Error;

/// Construction-time errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TopologyError {
    #[error("Node '{0}' has not been declared")]
    UnknownNode(String),

    #[error("Node '{0}' is already declared")]
    DuplicateNode(String),

    #[error("Invalid node name '{0}' (use letters, digits, '-', '_' or '.')")]
    InvalidNodeId(String),

    #[error("Link {0}-{0} connects a node to itself")]
    SelfLoop(String),

    #[error("Link {link} has invalid bandwidth {bandwidth} Mbit/s")]
    InvalidBandwidth { link: String, bandwidth: f64 },

    #[error("Link {link} has invalid loss {loss}% (expected 0-100)")]
    InvalidLoss { link: String, loss: f32 },
}

/// Errors reading or writing the JSON form
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid topology document: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_node() {
        let err = TopologyError::UnknownNode("s9".to_string());
        assert!(err.to_string().contains("s9"));

        let err = TopologyError::SelfLoop("s1".to_string());
        assert_eq!(err.to_string(), "Link s1-s1 connects a node to itself");
    }
}
