//! Linux backend: one network namespace per node
//!
//! Hosts are bare namespaces. Switches are namespaces holding a Linux bridge
//! (`br0`) that enslaves every switch port. Links are veth pairs created in
//! the root namespace and moved into the two endpoint namespaces, then
//! configured with `ip` and shaped with `tc` from inside.

use crate::backend::{Backend, BackendError, CommandOutput, ResourceCount};
use crate::netns::Manager as NetNsManager;
use crate::plan::{HostPlan, InterfacePlan, LinkPlan, NodePlan};
use crate::qdisc::QdiscManager;
use crate::veth::PairManager as VethManager;
use std::path::PathBuf;
use topology::NodeRole;
use tracing::{debug, info, warn};

/// Bridge created inside every switch namespace
pub const SWITCH_BRIDGE: &str = "br0";

/// Where and under which names namespaces are created
#[derive(Clone, Debug)]
pub struct NetnsConfig {
    /// Prepended to node ids; also the sweep key for stale namespaces
    pub prefix: String,
    pub netns_dir: PathBuf,
}

impl Default for NetnsConfig {
    fn default() -> Self {
        let netns_dir = std::env::var_os("IP_NETNS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/var/run/netns"));
        Self {
            prefix: "tl-".to_string(),
            netns_dir,
        }
    }
}

impl NetnsConfig {
    pub fn namespace_for(&self, node: &str) -> String {
        format!("{}{}", self.prefix, node)
    }
}

/// Track resources per link for teardown
#[derive(Clone, Debug)]
struct LinkResources {
    veth_a: String,
    veth_b: String,
}

/// Backend that materializes a plan with namespaces, veth pairs and tc
pub struct NetnsBackend {
    config: NetnsConfig,
    netns_manager: NetNsManager,
    veth_manager: VethManager,
    qdisc_manager: QdiscManager,
    /// Node ids whose namespace exists, in creation order
    nodes: Vec<String>,
    links: Vec<LinkResources>,
    /// (namespace, interface) pairs carrying a qdisc
    shaped: Vec<(String, String)>,
}

impl NetnsBackend {
    pub async fn new(config: NetnsConfig) -> Result<Self, BackendError> {
        info!(
            "Initializing netns backend in {} (prefix {})",
            config.netns_dir.display(),
            config.prefix
        );

        let mut netns_manager = NetNsManager::new(&config.netns_dir)?;

        // Clean up any stale namespaces from previous runs
        let cleaned = netns_manager
            .force_cleanup_stale_namespaces(&config.prefix)
            .await
            .unwrap_or(0);
        if cleaned > 0 {
            info!("Cleaned up {} stale namespaces", cleaned);
        }

        let veth_manager = VethManager::new().await?;

        Ok(Self {
            config,
            netns_manager,
            veth_manager,
            qdisc_manager: QdiscManager::new(),
            nodes: Vec::new(),
            links: Vec::new(),
            shaped: Vec::new(),
        })
    }

    fn namespace_of(&self, node: &str) -> Result<String, BackendError> {
        let ns = self.config.namespace_for(node);
        if self.netns_manager.namespace_exists(&ns) {
            Ok(ns)
        } else {
            Err(BackendError::UnknownNode(node.to_string()))
        }
    }

    /// Run `ip args...` inside `ns`, failing on a non-zero exit
    async fn ip(&self, ns: &str, args: &[&str]) -> Result<(), BackendError> {
        let output = self.netns_manager.exec(ns, "ip", args).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(BackendError::Command {
                ns: ns.to_string(),
                command: format!("ip {}", args.join(" ")),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    /// Bring up a link end that has already been moved into its namespace
    async fn configure_end(&mut self, ns: &str, end: &InterfacePlan, link: &LinkPlan) -> Result<(), BackendError> {
        self.ip(ns, &["link", "set", "dev", &end.name, "up"]).await?;

        if let Some(address) = end.address {
            let cidr = address.to_string();
            self.ip(ns, &["addr", "add", &cidr, "dev", &end.name]).await?;
        }

        if end.role == NodeRole::Switch {
            self.ip(ns, &["link", "set", "dev", &end.name, "master", SWITCH_BRIDGE])
                .await?;
        }

        if let Some(shaping) = &link.shaping {
            let applied = self
                .qdisc_manager
                .apply(&self.netns_manager, ns, &end.name, shaping)
                .await?;
            if applied > 0 {
                self.shaped.push((ns.to_string(), end.name.clone()));
            }
        }

        Ok(())
    }
}

impl Backend for NetnsBackend {
    fn name(&self) -> &'static str {
        "netns"
    }

    async fn create_node(&mut self, node: &NodePlan) -> Result<(), BackendError> {
        let ns = self.config.namespace_for(&node.id);
        debug!("Creating {} {} in namespace {}", node.role, node.id, ns);

        self.netns_manager.create_namespace(&ns).await?;
        self.nodes.push(node.id.clone());

        self.ip(&ns, &["link", "set", "dev", "lo", "up"]).await?;

        if node.role == NodeRole::Switch {
            self.ip(&ns, &["link", "add", "name", SWITCH_BRIDGE, "type", "bridge"])
                .await?;
            self.ip(&ns, &["link", "set", "dev", SWITCH_BRIDGE, "up"]).await?;
        }

        info!("Created {} {}", node.role, node.id);
        Ok(())
    }

    async fn create_link(&mut self, link: &LinkPlan) -> Result<(), BackendError> {
        let ns_a = self.namespace_of(&link.a.node)?;
        let ns_b = self.namespace_of(&link.b.node)?;

        debug!(
            "Setting up link {}: {} <-> {}",
            link.index, link.a.name, link.b.name
        );

        // Best-effort cleanup in default namespace if stale
        for name in [&link.a.name, &link.b.name] {
            if let Err(e) = self.veth_manager.delete_if_exists(name).await {
                debug!("Could not clear leftover interface {}: {}", name, e);
            }
        }

        self.veth_manager.create_pair(&link.a.name, &link.b.name).await?;
        self.links.push(LinkResources {
            veth_a: link.a.name.clone(),
            veth_b: link.b.name.clone(),
        });

        for end in link.endpoints() {
            if let Some(mac) = end.mac {
                self.veth_manager.set_mac(&end.name, mac).await?;
            }
        }

        self.veth_manager
            .move_to_namespace(&link.a.name, &ns_a, &self.netns_manager)
            .await?;
        self.veth_manager
            .move_to_namespace(&link.b.name, &ns_b, &self.netns_manager)
            .await?;

        self.configure_end(&ns_a, &link.a, link).await?;
        self.configure_end(&ns_b, &link.b, link).await?;

        info!("Link up: {} <-> {}", link.a.name, link.b.name);
        Ok(())
    }

    async fn add_static_arp(&mut self, host: &HostPlan, peers: &[HostPlan]) -> Result<(), BackendError> {
        let Some(intf) = host.default_interface.as_deref() else {
            debug!("Host {} has no interface, skipping static ARP", host.id);
            return Ok(());
        };
        let ns = self.namespace_of(&host.id)?;

        let mut entries = 0;
        for peer in peers.iter().filter(|p| p.id != host.id) {
            let (Some(mac), Some(_)) = (peer.mac, peer.default_interface.as_ref()) else {
                continue;
            };
            let ip = peer.address.ip().to_string();
            let mac = mac.to_string();
            self.ip(
                &ns,
                &["neigh", "replace", &ip, "lladdr", &mac, "dev", intf, "nud", "permanent"],
            )
            .await?;
            entries += 1;
        }

        debug!("Installed {} static ARP entries on {}", entries, host.id);
        Ok(())
    }

    async fn exec(&self, node: &str, command: &str) -> Result<CommandOutput, BackendError> {
        let ns = self.namespace_of(node)?;
        let output = self.netns_manager.exec(&ns, "sh", &["-c", command]).await?;
        Ok(CommandOutput::from(output))
    }

    async fn teardown(&mut self) -> Result<(), BackendError> {
        info!("Tearing down {} nodes and {} links", self.nodes.len(), self.links.len());

        // Remove qdiscs inside namespaces first to release references
        for (ns, iface) in std::mem::take(&mut self.shaped) {
            self.qdisc_manager
                .remove_all(&self.netns_manager, &ns, &iface)
                .await;
        }

        // Ends still in the root namespace after a partial link setup
        for lr in std::mem::take(&mut self.links) {
            for name in [&lr.veth_a, &lr.veth_b] {
                if let Err(e) = self.veth_manager.delete_if_exists(name).await {
                    warn!("Failed to delete interface {}: {}", name, e);
                }
            }
        }

        // Deleting a namespace destroys the veth ends inside it
        let mut first_error = None;
        for node in std::mem::take(&mut self.nodes) {
            let ns = self.config.namespace_for(&node);
            if let Err(e) = self.netns_manager.delete_namespace(&ns).await {
                warn!("Failed to delete namespace {}: {}", ns, e);
                first_error.get_or_insert(e);
            }
        }

        // Final sweep for stale namespaces with our prefix
        let swept = self
            .netns_manager
            .force_cleanup_stale_namespaces(&self.config.prefix)
            .await
            .unwrap_or(0);
        if swept > 0 {
            debug!("Swept {} leftover namespaces", swept);
        }

        self.veth_manager.forget_all();

        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    fn resources(&self) -> ResourceCount {
        ResourceCount {
            namespaces: self.nodes.len(),
            links: self.links.len(),
            shaped_interfaces: self.shaped.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_naming() {
        let config = NetnsConfig {
            prefix: "lab-".to_string(),
            netns_dir: PathBuf::from("/tmp/netns"),
        };
        assert_eq!(config.namespace_for("h1"), "lab-h1");
        assert_eq!(NetnsConfig::default().prefix, "tl-");
    }

    #[tokio::test]
    #[cfg(feature = "sudo-tests")]
    async fn test_single_link_lifecycle() -> Result<(), BackendError> {
        use crate::plan::{NetOptions, NetworkPlan};
        use topology::Delay;

        let mut b = topology::Topology::builder("pair");
        b.add_host("h1").unwrap();
        b.add_switch("s1").unwrap();
        b.add_link("h1", "s1", 10.0, Delay::from_millis(5)).unwrap();
        let plan = NetworkPlan::new(&b.build(), &NetOptions::default()).unwrap();

        let mut backend = NetnsBackend::new(NetnsConfig {
            prefix: "tlunit-".to_string(),
            ..NetnsConfig::default()
        })
        .await?;

        for node in &plan.nodes {
            backend.create_node(node).await?;
        }
        backend.create_link(&plan.links[0]).await?;
        assert_eq!(backend.resources().shaped_interfaces, 2);

        let out = backend.exec("h1", "ip -o addr show dev h1-eth0").await?;
        assert!(out.stdout.contains("10.0.0.1/8"));

        backend.teardown().await?;
        assert!(backend.resources().is_empty());
        Ok(())
    }
}
