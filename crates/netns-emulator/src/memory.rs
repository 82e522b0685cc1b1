//! In-process backend
//!
//! Records the resources a real backend would hold and answers `ping` from
//! the topology graph. Only switches forward; hosts do not route between
//! their interfaces. Used for dry runs and for exercising the lifecycle
//! without privileges. Failures can be injected at a given link or node.

use crate::backend::{Backend, BackendError, CommandOutput, ResourceCount};
use crate::plan::{HostPlan, LinkPlan, NodePlan};
use crate::qdisc;
use std::collections::{HashMap, HashSet, VecDeque};
use std::net::Ipv4Addr;
use topology::NodeRole;
use tracing::debug;

#[derive(Debug, Default)]
pub struct MemoryBackend {
    nodes: Vec<String>,
    switches: HashSet<String>,
    /// Adjacency by node id, one entry per link end
    edges: HashMap<String, Vec<String>>,
    links: usize,
    shaped_interfaces: usize,
    addresses: HashMap<Ipv4Addr, String>,
    arp_entries: HashMap<String, usize>,
    ops: Vec<String>,
    fail_link: Option<usize>,
    fail_node: Option<String>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail when the link with this plan index is created
    pub fn with_failing_link(mut self, index: usize) -> Self {
        self.fail_link = Some(index);
        self
    }

    /// Fail when this node is created
    pub fn with_failing_node(mut self, id: impl Into<String>) -> Self {
        self.fail_node = Some(id.into());
        self
    }

    /// Every backend call so far, in order
    pub fn ops(&self) -> &[String] {
        &self.ops
    }

    pub fn arp_entries(&self, host: &str) -> usize {
        self.arp_entries.get(host).copied().unwrap_or(0)
    }

    fn has_node(&self, id: &str) -> bool {
        self.nodes.iter().any(|n| n == id)
    }

    fn reachable(&self, from: &str, to: &str) -> bool {
        let mut seen = HashSet::from([from]);
        let mut queue = VecDeque::from([from]);
        while let Some(node) = queue.pop_front() {
            if node == to {
                return true;
            }
            if node != from && !self.switches.contains(node) {
                continue;
            }
            for next in self.edges.get(node).into_iter().flatten() {
                if seen.insert(next.as_str()) {
                    queue.push_back(next.as_str());
                }
            }
        }
        false
    }

    fn ping(&self, node: &str, target: &str) -> CommandOutput {
        // Switch namespaces carry no address
        if self.switches.contains(node) {
            return CommandOutput {
                status: 2,
                stdout: String::new(),
                stderr: "ping: connect: Network is unreachable\n".to_string(),
            };
        }
        let Ok(ip) = target.parse::<Ipv4Addr>() else {
            return CommandOutput {
                status: 2,
                stdout: String::new(),
                stderr: format!("ping: {}: Name or service not known\n", target),
            };
        };

        let received = match self.addresses.get(&ip) {
            Some(dst) => self.reachable(node, dst),
            None => false,
        };
        let (status, received, loss) = if received { (0, 1, 0) } else { (1, 0, 100) };
        CommandOutput {
            status,
            stdout: format!(
                "PING {ip} ({ip}) 56(84) bytes of data.\n\n--- {ip} ping statistics ---\n1 packets transmitted, {received} received, {loss}% packet loss\n"
            ),
            stderr: String::new(),
        }
    }
}

impl Backend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn create_node(&mut self, node: &NodePlan) -> Result<(), BackendError> {
        if self.fail_node.as_deref() == Some(node.id.as_str()) {
            return Err(BackendError::Injected(format!("create node {}", node.id)));
        }
        self.ops.push(format!("create_node {}", node.id));
        self.nodes.push(node.id.clone());
        if node.role == NodeRole::Switch {
            self.switches.insert(node.id.clone());
        }
        Ok(())
    }

    async fn create_link(&mut self, link: &LinkPlan) -> Result<(), BackendError> {
        if self.fail_link == Some(link.index) {
            return Err(BackendError::Injected(format!(
                "create link {}<->{}",
                link.a.name, link.b.name
            )));
        }
        for end in link.endpoints() {
            if !self.has_node(&end.node) {
                return Err(BackendError::UnknownNode(end.node.clone()));
            }
        }

        self.ops
            .push(format!("create_link {}<->{}", link.a.name, link.b.name));
        self.links += 1;
        if let Some(shaping) = &link.shaping {
            self.shaped_interfaces += link
                .endpoints()
                .into_iter()
                .filter(|end| !qdisc::shaping_commands(&end.name, shaping).is_empty())
                .count();
        }
        self.edges
            .entry(link.a.node.clone())
            .or_default()
            .push(link.b.node.clone());
        self.edges
            .entry(link.b.node.clone())
            .or_default()
            .push(link.a.node.clone());
        for end in link.endpoints() {
            if let Some(address) = end.address {
                self.addresses.insert(address.ip(), end.node.clone());
            }
        }
        Ok(())
    }

    async fn add_static_arp(&mut self, host: &HostPlan, peers: &[HostPlan]) -> Result<(), BackendError> {
        if !self.has_node(&host.id) {
            return Err(BackendError::UnknownNode(host.id.clone()));
        }
        if host.default_interface.is_none() {
            return Ok(());
        }

        let entries = peers
            .iter()
            .filter(|p| p.id != host.id && p.mac.is_some() && p.default_interface.is_some())
            .count();
        self.ops.push(format!("static_arp {} {}", host.id, entries));
        self.arp_entries.insert(host.id.clone(), entries);
        Ok(())
    }

    async fn exec(&self, node: &str, command: &str) -> Result<CommandOutput, BackendError> {
        if !self.has_node(node) {
            return Err(BackendError::UnknownNode(node.to_string()));
        }
        debug!("[{}] {}", node, command);

        let words: Vec<&str> = command.split_whitespace().collect();
        match words.as_slice() {
            ["ping", .., target] => Ok(self.ping(node, target)),
            _ => Ok(CommandOutput::default()),
        }
    }

    async fn teardown(&mut self) -> Result<(), BackendError> {
        self.ops.push("teardown".to_string());
        self.nodes.clear();
        self.switches.clear();
        self.edges.clear();
        self.links = 0;
        self.shaped_interfaces = 0;
        self.addresses.clear();
        self.arp_entries.clear();
        Ok(())
    }

    fn resources(&self) -> ResourceCount {
        ResourceCount {
            namespaces: self.nodes.len(),
            links: self.links,
            shaped_interfaces: self.shaped_interfaces,
        }
    }
}
