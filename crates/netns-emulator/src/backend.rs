//! The emulation backend boundary
//!
//! A backend turns plan entries into live resources. [`crate::host::NetnsBackend`]
//! does it with Linux namespaces; [`crate::memory::MemoryBackend`] records the
//! same resources in process.

use crate::netns::NetNsError;
use crate::plan::{HostPlan, LinkPlan, NodePlan};
use crate::qdisc::QdiscError;
use crate::veth::VethError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Network namespace error: {0}")]
    NetNs(#[from] NetNsError),

    #[error("Veth interface error: {0}")]
    Veth(#[from] VethError),

    #[error("Qdisc configuration error: {0}")]
    Qdisc(#[from] QdiscError),

    #[error("Node '{0}' does not exist in the running network")]
    UnknownNode(String),

    #[error("`{command}` failed in ns {ns}: {stderr}")]
    Command {
        ns: String,
        command: String,
        stderr: String,
    },

    #[error("Injected failure: {0}")]
    Injected(String),
}

/// Live resources held by a backend
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResourceCount {
    pub namespaces: usize,
    pub links: usize,
    pub shaped_interfaces: usize,
}

impl ResourceCount {
    pub fn total(&self) -> usize {
        self.namespaces + self.links + self.shaped_interfaces
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Result of running a command inside a node
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

impl From<std::process::Output> for CommandOutput {
    fn from(output: std::process::Output) -> Self {
        Self {
            // Killed by a signal
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

/// Materializes a network plan.
///
/// Calls arrive in plan order: every node, then every link, then static ARP.
/// `teardown` must release everything created so far, including after a
/// partial start, and leave `resources()` empty.
#[allow(async_fn_in_trait)]
pub trait Backend {
    fn name(&self) -> &'static str;

    async fn create_node(&mut self, node: &NodePlan) -> Result<(), BackendError>;

    async fn create_link(&mut self, link: &LinkPlan) -> Result<(), BackendError>;

    /// Install permanent neighbour entries on `host` for every other peer
    async fn add_static_arp(&mut self, host: &HostPlan, peers: &[HostPlan]) -> Result<(), BackendError>;

    /// Run a shell command inside a node
    async fn exec(&self, node: &str, command: &str) -> Result<CommandOutput, BackendError>;

    async fn teardown(&mut self) -> Result<(), BackendError>;

    fn resources(&self) -> ResourceCount;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_count() {
        assert!(ResourceCount::default().is_empty());

        let count = ResourceCount {
            namespaces: 6,
            links: 5,
            shaped_interfaces: 10,
        };
        assert_eq!(count.total(), 21);
        assert!(!count.is_empty());
    }

    #[test]
    fn test_command_output_success() {
        let ok = CommandOutput::default();
        assert!(ok.success());

        let failed = CommandOutput {
            status: 1,
            ..CommandOutput::default()
        };
        assert!(!failed.success());
    }
}
