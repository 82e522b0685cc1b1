//! Virtual Ethernet (veth) interface management
//!
//! Pairs are created in the root namespace over rtnetlink, optionally given
//! a fixed MAC, and then moved into the namespaces of the nodes they join.
//! Configuration inside a namespace happens after the move, through `ip`.

use crate::netns::{Manager as NetNsManager, NetNsError};
use crate::plan::MacAddr;
use futures::TryStreamExt;
use netlink_packet_route::link::LinkAttribute;
use rtnetlink::{new_connection, Handle};
use std::collections::HashMap;
use thiserror::Error;
use tokio::time::{sleep, Duration};
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum VethError {
    #[error("I/O error: {0}")]
    Io(std::io::Error),

    #[error("Netlink connection failed: {0}")]
    Connection(rtnetlink::Error),

    #[error("Interface '{0}' not found")]
    NotFound(String),

    #[error("Interface '{0}' already exists")]
    AlreadyExists(String),

    #[error("Failed to create veth pair: {0}")]
    CreateFailed(rtnetlink::Error),

    #[error("Failed to delete interface: {0}")]
    DeleteFailed(rtnetlink::Error),

    #[error("Failed to move interface to namespace: {0}")]
    MoveFailed(rtnetlink::Error),

    #[error("Failed to set MAC address: {0}")]
    SetMacFailed(rtnetlink::Error),

    #[error("Namespace error: {0}")]
    NetNs(#[from] NetNsError),

    #[error("Invalid interface name: {0}")]
    InvalidName(String),
}

/// Information about one end of a veth pair
#[derive(Clone, Debug)]
pub struct VethInfo {
    pub name: String,
    pub index: u32,
    pub peer_name: String,
    pub mtu: u32,
    pub mac: Option<MacAddr>,
    pub namespace: Option<String>,
}

#[derive(Clone, Debug)]
pub struct VethPair {
    pub left: VethInfo,
    pub right: VethInfo,
}

impl VethPair {
    fn end_mut(&mut self, name: &str) -> Option<&mut VethInfo> {
        if self.left.name == name {
            Some(&mut self.left)
        } else if self.right.name == name {
            Some(&mut self.right)
        } else {
            None
        }
    }
}

/// Veth pair manager
pub struct PairManager {
    /// Netlink handle for the root namespace
    handle: Handle,
    /// Tracked pairs, keyed by both end names
    pairs: HashMap<String, VethPair>,
}

impl PairManager {
    pub async fn new() -> Result<Self, VethError> {
        let (connection, handle, _) = new_connection().map_err(VethError::Io)?;

        tokio::spawn(connection);

        Ok(Self {
            handle,
            pairs: HashMap::new(),
        })
    }

    /// Create a veth pair with the given names
    pub async fn create_pair(&mut self, left_name: &str, right_name: &str) -> Result<VethPair, VethError> {
        if self.pairs.contains_key(left_name) || self.pairs.contains_key(right_name) {
            return Err(VethError::AlreadyExists(format!("{}/{}", left_name, right_name)));
        }
        for name in [left_name, right_name] {
            if !is_valid_interface_name(name) {
                return Err(VethError::InvalidName(name.to_string()));
            }
        }

        debug!("Creating veth pair: {} <-> {}", left_name, right_name);

        self.handle
            .link()
            .add()
            .veth(left_name.to_string(), right_name.to_string())
            .execute()
            .await
            .map_err(VethError::CreateFailed)?;

        // Give the kernel a moment to publish both ends
        sleep(Duration::from_millis(20)).await;

        let left_info = self.get_interface_info(left_name).await?;
        let right_info = self.get_interface_info(right_name).await?;

        let pair = VethPair {
            left: VethInfo {
                name: left_name.to_string(),
                index: left_info.index,
                peer_name: right_name.to_string(),
                mtu: left_info.mtu,
                mac: left_info.mac,
                namespace: None,
            },
            right: VethInfo {
                name: right_name.to_string(),
                index: right_info.index,
                peer_name: left_name.to_string(),
                mtu: right_info.mtu,
                mac: right_info.mac,
                namespace: None,
            },
        };

        self.pairs.insert(left_name.to_string(), pair.clone());
        self.pairs.insert(right_name.to_string(), pair.clone());

        info!("Created veth pair: {} <-> {}", left_name, right_name);
        Ok(pair)
    }

    /// Set the MAC of an interface that is still in the root namespace
    pub async fn set_mac(&mut self, interface_name: &str, mac: MacAddr) -> Result<(), VethError> {
        debug!("Setting MAC {} on {}", mac, interface_name);

        let index = self.get_interface_info(interface_name).await?.index;
        self.handle
            .link()
            .set(index)
            .address(mac.octets().to_vec())
            .execute()
            .await
            .map_err(VethError::SetMacFailed)?;

        self.update(interface_name, |end| end.mac = Some(mac));
        Ok(())
    }

    /// Move an interface to a network namespace
    pub async fn move_to_namespace(
        &mut self,
        interface_name: &str,
        target_ns: &str,
        ns_manager: &NetNsManager,
    ) -> Result<(), VethError> {
        debug!("Moving interface {} to namespace {}", interface_name, target_ns);

        let interface_index = self.get_interface_info(interface_name).await?.index;
        let ns_fd = ns_manager.get_namespace_fd(target_ns)?;

        self.handle
            .link()
            .set(interface_index)
            .setns_by_fd(ns_fd)
            .execute()
            .await
            .map_err(VethError::MoveFailed)?;

        let ns = target_ns.to_string();
        self.update(interface_name, |end| end.namespace = Some(ns.clone()));

        info!("Moved interface {} to namespace {}", interface_name, target_ns);
        Ok(())
    }

    /// Delete a pair whose ends are both still in the root namespace
    pub async fn delete_pair(&mut self, interface_name: &str) -> Result<(), VethError> {
        let pair = self
            .pairs
            .remove(interface_name)
            .ok_or_else(|| VethError::NotFound(interface_name.to_string()))?;
        self.pairs.remove(&pair.left.name);
        self.pairs.remove(&pair.right.name);

        debug!("Deleting veth pair: {} <-> {}", pair.left.name, pair.right.name);

        // Deleting one end removes both
        let interface_index = self.get_interface_info(interface_name).await?.index;
        self.handle
            .link()
            .del(interface_index)
            .execute()
            .await
            .map_err(VethError::DeleteFailed)?;

        info!("Deleted veth pair: {} <-> {}", pair.left.name, pair.right.name);
        Ok(())
    }

    /// Delete a root-namespace interface by name if it exists.
    ///
    /// Returns whether anything was deleted. Ends already moved into a
    /// namespace are not visible here and go away with their namespace.
    pub async fn delete_if_exists(&mut self, interface_name: &str) -> Result<bool, VethError> {
        if let Some(pair) = self.pairs.get(interface_name) {
            let (left, right) = (pair.left.name.clone(), pair.right.name.clone());
            self.pairs.remove(&left);
            self.pairs.remove(&right);
        }

        match self.get_interface_info(interface_name).await {
            Ok(info) => {
                self.handle
                    .link()
                    .del(info.index)
                    .execute()
                    .await
                    .map_err(VethError::DeleteFailed)?;
                debug!("Deleted leftover interface {}", interface_name);
                Ok(true)
            }
            Err(VethError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Drop tracking for every pair; used once their namespaces are gone
    pub fn forget_all(&mut self) {
        self.pairs.clear();
    }

    fn update(&mut self, name: &str, f: impl Fn(&mut VethInfo)) {
        let Some(pair) = self.pairs.get(name) else {
            return;
        };
        let keys = [pair.left.name.clone(), pair.right.name.clone()];
        for key in keys {
            if let Some(end) = self.pairs.get_mut(&key).and_then(|p| p.end_mut(name)) {
                f(end);
            }
        }
    }

    async fn get_interface_info(&self, name: &str) -> Result<InterfaceInfo, VethError> {
        let mut links = self
            .handle
            .link()
            .get()
            .match_name(name.to_string())
            .execute();

        match links.try_next().await {
            Ok(Some(link)) => {
                let mut info = InterfaceInfo {
                    index: link.header.index,
                    mtu: 1500,
                    mac: None,
                };
                for attr in &link.attributes {
                    match attr {
                        LinkAttribute::Mtu(mtu) => info.mtu = *mtu,
                        LinkAttribute::Address(bytes) if bytes.len() == 6 => {
                            let mut octets = [0u8; 6];
                            octets.copy_from_slice(bytes);
                            info.mac = Some(MacAddr(octets));
                        }
                        _ => {}
                    }
                }
                Ok(info)
            }
            Ok(None) => Err(VethError::NotFound(name.to_string())),
            // The kernel answers a by-name lookup for a missing link with ENODEV
            Err(rtnetlink::Error::NetlinkError(msg)) if msg.code.map(|c| c.get()) == Some(-19) => {
                Err(VethError::NotFound(name.to_string()))
            }
            Err(e) => Err(VethError::Connection(e)),
        }
    }
}

#[derive(Clone, Debug)]
struct InterfaceInfo {
    index: u32,
    mtu: u32,
    mac: Option<MacAddr>,
}

/// Linux interface names: at most 15 bytes (IFNAMSIZ - 1), no '/', ':' or
/// whitespace
pub fn is_valid_interface_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 15
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        && !name.starts_with('-')
}
