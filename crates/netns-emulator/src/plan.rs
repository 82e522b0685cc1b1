//! Materialization plan
//!
//! Maps a topology onto concrete interface names, IPv4 addresses, MAC
//! addresses and per-link shaping before any backend is touched. The plan is
//! deterministic: the same topology and options always produce the same
//! plan, so it can be printed, diffed and tested without privileges.

use crate::veth::is_valid_interface_name;
use ipnetwork::Ipv4Network;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::net::Ipv4Addr;
use thiserror::Error;
use topology::{LinkConfig, NodeRole, Topology};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("Invalid IP base {0}")]
    InvalidIpBase(String),

    #[error("IP base {base} has room for {capacity} hosts, topology has {hosts}")]
    AddressSpaceExhausted {
        base: String,
        capacity: u64,
        hosts: usize,
    },

    #[error("Interface name '{0}' is not valid (at most 15 characters)")]
    InterfaceName(String),

    #[error("Static ARP needs planned MAC addresses; enable automatic MACs")]
    StaticArpWithoutMacs,
}

/// How links are realized
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkClass {
    /// Token-bucket bandwidth limit plus netem delay on both ends
    #[default]
    Shaped,
    /// Unshaped veth pair
    Plain,
}

/// Options for bringing a topology up
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NetOptions {
    pub link_class: LinkClass,
    /// Derive host MACs from host numbers
    pub auto_set_macs: bool,
    /// Pre-populate every host's neighbour table
    pub auto_static_arp: bool,
    /// Network hosts are numbered from
    pub ip_base: Ipv4Addr,
    pub prefix_len: u8,
}

impl Default for NetOptions {
    fn default() -> Self {
        Self {
            link_class: LinkClass::Shaped,
            auto_set_macs: false,
            auto_static_arp: false,
            ip_base: Ipv4Addr::new(10, 0, 0, 0),
            prefix_len: 8,
        }
    }
}

/// 48-bit Ethernet address
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    /// Low 48 bits of `n`, big-endian: host 1 is 00:00:00:00:00:01
    pub fn from_index(n: u64) -> Self {
        let b = n.to_be_bytes();
        Self([b[2], b[3], b[4], b[5], b[6], b[7]])
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}", a, b, c, d, e, g)
    }
}

impl From<MacAddr> for String {
    fn from(mac: MacAddr) -> Self {
        mac.to_string()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NodePlan {
    pub id: String,
    pub role: NodeRole,
}

/// One end of a link
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct InterfacePlan {
    pub node: String,
    pub role: NodeRole,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac: Option<MacAddr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<Ipv4Network>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HostPlan {
    pub id: String,
    pub address: Ipv4Network,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac: Option<MacAddr>,
    /// First interface; carries the address and MAC. None for a host with no links.
    pub default_interface: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LinkPlan {
    pub index: usize,
    pub a: InterfacePlan,
    pub b: InterfacePlan,
    /// None for plain links
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shaping: Option<LinkConfig>,
}

impl LinkPlan {
    pub fn endpoints(&self) -> [&InterfacePlan; 2] {
        [&self.a, &self.b]
    }
}

/// Everything a backend needs to bring a topology up
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NetworkPlan {
    pub name: String,
    pub nodes: Vec<NodePlan>,
    pub hosts: Vec<HostPlan>,
    pub links: Vec<LinkPlan>,
}

impl NetworkPlan {
    pub fn new(topology: &Topology, options: &NetOptions) -> Result<Self, PlanError> {
        if options.auto_static_arp && !options.auto_set_macs {
            return Err(PlanError::StaticArpWithoutMacs);
        }

        let base = Ipv4Network::new(options.ip_base, options.prefix_len)
            .map_err(|_| PlanError::InvalidIpBase(format!("{}/{}", options.ip_base, options.prefix_len)))?;

        // Usable host numbers exclude the network and broadcast addresses
        let capacity = (1u64 << (32 - u32::from(base.prefix()))).saturating_sub(2);
        let host_count = topology.hosts().count();
        if host_count as u64 > capacity {
            return Err(PlanError::AddressSpaceExhausted {
                base: base.to_string(),
                capacity,
                hosts: host_count,
            });
        }

        let network = u32::from(base.network());
        let mut hosts: Vec<HostPlan> = topology
            .hosts()
            .enumerate()
            .map(|(i, node)| {
                let number = i as u32 + 1;
                let address = Ipv4Network::new(Ipv4Addr::from(network + number), base.prefix())
                    .map_err(|_| PlanError::InvalidIpBase(base.to_string()))?;
                Ok(HostPlan {
                    id: node.id.clone(),
                    address,
                    mac: options
                        .auto_set_macs
                        .then(|| MacAddr::from_index(u64::from(number))),
                    default_interface: None,
                })
            })
            .collect::<Result<_, PlanError>>()?;
        let host_index: HashMap<String, usize> = hosts
            .iter()
            .enumerate()
            .map(|(i, h)| (h.id.clone(), i))
            .collect();

        // Host ports count from 0, switch ports from 1
        let mut next_port: HashMap<String, u32> = topology
            .nodes()
            .iter()
            .map(|n| {
                let first = match n.role {
                    NodeRole::Host => 0,
                    NodeRole::Switch => 1,
                };
                (n.id.clone(), first)
            })
            .collect();

        let mut links = Vec::with_capacity(topology.links().len());
        for (index, link) in topology.links().iter().enumerate() {
            let mut endpoint = |id: &str| -> Result<InterfacePlan, PlanError> {
                let role = topology
                    .node(id)
                    .map(|n| n.role)
                    .unwrap_or(NodeRole::Host);
                let port = next_port.entry(id.to_string()).or_insert(0);
                let name = format!("{}-eth{}", id, port);
                *port += 1;
                if !is_valid_interface_name(&name) {
                    return Err(PlanError::InterfaceName(name));
                }

                let mut intf = InterfacePlan {
                    node: id.to_string(),
                    role,
                    name,
                    mac: None,
                    address: None,
                };
                if let Some(&h) = host_index.get(id) {
                    let host = &mut hosts[h];
                    if host.default_interface.is_none() {
                        host.default_interface = Some(intf.name.clone());
                        intf.mac = host.mac;
                        intf.address = Some(host.address);
                    }
                }
                Ok(intf)
            };

            let a = endpoint(&link.a)?;
            let b = endpoint(&link.b)?;
            links.push(LinkPlan {
                index,
                a,
                b,
                shaping: match options.link_class {
                    LinkClass::Shaped => Some(link.config.clone()),
                    LinkClass::Plain => None,
                },
            });
        }

        Ok(Self {
            name: topology.name().to_string(),
            nodes: topology
                .nodes()
                .iter()
                .map(|n| NodePlan {
                    id: n.id.clone(),
                    role: n.role,
                })
                .collect(),
            hosts,
            links,
        })
    }

    pub fn host(&self, id: &str) -> Option<&HostPlan> {
        self.hosts.iter().find(|h| h.id == id)
    }

    pub fn host_by_ip(&self, ip: Ipv4Addr) -> Option<&HostPlan> {
        self.hosts.iter().find(|h| h.address.ip() == ip)
    }

    /// Interfaces on `node` paired with the interface at the other end
    pub fn interfaces_of<'a>(
        &'a self,
        node: &'a str,
    ) -> impl Iterator<Item = (&'a InterfacePlan, &'a InterfacePlan)> + 'a {
        self.links.iter().filter_map(move |l| {
            if l.a.node == node {
                Some((&l.a, &l.b))
            } else if l.b.node == node {
                Some((&l.b, &l.a))
            } else {
                None
            }
        })
    }

    /// Hosts that can take part in static ARP: those with a wired address
    pub fn wired_hosts(&self) -> impl Iterator<Item = &HostPlan> {
        self.hosts.iter().filter(|h| h.default_interface.is_some())
    }

    pub fn shaped_interface_count(&self) -> usize {
        self.links.iter().filter(|l| l.shaping.is_some()).count() * 2
    }
}
