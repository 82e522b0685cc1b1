//! Network namespace management
//!
//! This module provides functionality to create, delete, and run commands in
//! Linux network namespaces using the `/var/run/netns/<name>` convention, so
//! the namespaces are visible to `ip netns` while the network is up.

use nix::mount::{mount, umount2, MntFlags, MsFlags};
use nix::sched::CloneFlags;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};
use std::process::Output;
use thiserror::Error;
use tokio::fs;
use tokio::process::Command;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum NetNsError {
    #[error("Failed to create netns directory: {0}")]
    CreateDir(std::io::Error),

    #[error("Failed to create netns file: {0}")]
    CreateFile(std::io::Error),

    #[error("Failed to remove netns file: {0}")]
    RemoveFile(std::io::Error),

    #[error("Failed to mount namespace: {0}")]
    Mount(nix::Error),

    #[error("Failed to open namespace file: {0}")]
    OpenNs(std::io::Error),

    #[error("Failed to run command in namespace '{ns}': {source}")]
    Spawn {
        ns: String,
        source: std::io::Error,
    },

    #[error("Namespace '{0}' not found")]
    NotFound(String),

    #[error("Namespace '{0}' already exists")]
    AlreadyExists(String),

    #[error("Insufficient permissions (CAP_NET_ADMIN required)")]
    Permission,
}

/// Network namespace manager
pub struct Manager {
    /// Map of namespace name to an open handle on its bind mount
    namespaces: HashMap<String, File>,
    /// Base directory for namespace files
    base_dir: PathBuf,
}

impl Manager {
    /// Create a namespace manager rooted at `base_dir`
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self, NetNsError> {
        let base_dir = base_dir.into();

        std::fs::create_dir_all(&base_dir).map_err(NetNsError::CreateDir)?;

        Ok(Self {
            namespaces: HashMap::new(),
            base_dir,
        })
    }

    /// Force cleanup of all stale namespaces with given prefix
    pub async fn force_cleanup_stale_namespaces(&mut self, prefix: &str) -> Result<usize, NetNsError> {
        let mut cleaned_count = 0;

        if let Ok(mut entries) = fs::read_dir(&self.base_dir).await {
            while let Ok(Some(entry)) = entries.next_entry().await {
                if let Ok(name) = entry.file_name().into_string() {
                    if name.starts_with(prefix) {
                        debug!("Force cleaning stale namespace: {}", name);
                        if let Ok(()) = self.force_delete_namespace(&name).await {
                            cleaned_count += 1;
                        }
                    }
                }
            }
        }

        Ok(cleaned_count)
    }

    /// Force delete a namespace even if not in our tracking
    pub async fn force_delete_namespace(&mut self, name: &str) -> Result<(), NetNsError> {
        let ns_path = self.base_dir.join(name);

        debug!("Force deleting namespace: {}", name);
        self.namespaces.remove(name);

        if !ns_path.exists() {
            return Ok(());
        }

        // Busy mounts get a few lazy-unmount attempts before we give up
        for attempt in 1..=3 {
            match umount2(&ns_path, MntFlags::MNT_DETACH) {
                Ok(()) => break,
                Err(e) if attempt < 3 => {
                    debug!("Unmount attempt {} failed for {}: {}, retrying", attempt, name, e);
                    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
                }
                Err(e) => warn!("Failed to unmount namespace {} after {} attempts: {}", name, attempt, e),
            }
        }

        match fs::remove_file(&ns_path).await {
            Ok(()) => {
                info!("Force deleted namespace: {}", name);
                Ok(())
            }
            Err(e) => {
                // Last resort: let iproute2 try
                let status = Command::new("ip")
                    .args(["netns", "del", name])
                    .env("IP_NETNS_DIR", &self.base_dir)
                    .status()
                    .await;
                match status {
                    Ok(s) if s.success() => {
                        info!("Force deleted namespace with ip netns: {}", name);
                        Ok(())
                    }
                    _ => Err(NetNsError::RemoveFile(e)),
                }
            }
        }
    }

    /// Create a new network namespace
    pub async fn create_namespace(&mut self, name: &str) -> Result<(), NetNsError> {
        if self.namespaces.contains_key(name) {
            return Err(NetNsError::AlreadyExists(name.to_string()));
        }

        let ns_path = self.base_dir.join(name);

        if ns_path.exists() {
            warn!("Cleaning up stale namespace file: {}", name);
            if let Err(e) = self.force_delete_namespace(name).await {
                warn!("Failed to clean up stale namespace {}: {}", name, e);
                return Err(NetNsError::AlreadyExists(name.to_string()));
            }
        }

        debug!("Creating namespace: {}", name);

        fs::File::create(&ns_path)
            .await
            .map_err(NetNsError::CreateFile)?;

        // unshare() moves the calling thread for good, so do it on a
        // throwaway thread and pin the result with a bind mount.
        let result = tokio::task::spawn_blocking({
            let ns_path = ns_path.clone();
            move || -> Result<(), NetNsError> {
                std::thread::spawn(move || -> Result<(), NetNsError> {
                    nix::sched::unshare(CloneFlags::CLONE_NEWNET).map_err(|_| NetNsError::Permission)?;
                    mount(
                        Some("/proc/thread-self/ns/net"),
                        &ns_path,
                        None::<&str>,
                        MsFlags::MS_BIND,
                        None::<&str>,
                    )
                    .map_err(NetNsError::Mount)
                })
                .join()
                .unwrap_or(Err(NetNsError::Permission))
            }
        })
        .await
        .map_err(|e| NetNsError::CreateFile(std::io::Error::new(std::io::ErrorKind::Other, e)))?;

        if let Err(e) = result {
            let _ = fs::remove_file(&ns_path).await;
            return Err(e);
        }

        let file = OpenOptions::new()
            .read(true)
            .open(&ns_path)
            .map_err(NetNsError::OpenNs)?;

        self.namespaces.insert(name.to_string(), file);
        info!("Created namespace: {}", name);

        Ok(())
    }

    /// Delete a network namespace
    pub async fn delete_namespace(&mut self, name: &str) -> Result<(), NetNsError> {
        let ns_path = self.base_dir.join(name);

        self.namespaces.remove(name);
        if !ns_path.exists() {
            return Ok(());
        }

        debug!("Deleting namespace: {}", name);

        match self.try_graceful_delete(&ns_path).await {
            Ok(()) => {
                info!("Deleted namespace: {}", name);
                Ok(())
            }
            Err(_) => {
                warn!("Graceful delete failed for {}, attempting force delete", name);
                self.force_delete_namespace(name).await
            }
        }
    }

    async fn try_graceful_delete(&self, ns_path: &Path) -> Result<(), NetNsError> {
        umount2(ns_path, MntFlags::MNT_DETACH).map_err(NetNsError::Mount)?;
        fs::remove_file(ns_path)
            .await
            .map_err(NetNsError::RemoveFile)?;
        Ok(())
    }

    /// Run `program args...` inside a namespace via `ip netns exec`
    pub async fn exec(&self, name: &str, program: &str, args: &[&str]) -> Result<Output, NetNsError> {
        if !self.namespaces.contains_key(name) {
            return Err(NetNsError::NotFound(name.to_string()));
        }

        debug!("[{}] {} {}", name, program, args.join(" "));

        Command::new("ip")
            .args(["netns", "exec", name, program])
            .args(args)
            .env("IP_NETNS_DIR", &self.base_dir)
            .output()
            .await
            .map_err(|source| NetNsError::Spawn {
                ns: name.to_string(),
                source,
            })
    }

    /// Get the file descriptor for a namespace
    pub fn get_namespace_fd(&self, name: &str) -> Result<RawFd, NetNsError> {
        let file = self
            .namespaces
            .get(name)
            .ok_or_else(|| NetNsError::NotFound(name.to_string()))?;
        Ok(file.as_raw_fd())
    }

    pub fn namespace_exists(&self, name: &str) -> bool {
        self.namespaces.contains_key(name)
    }
}

impl Drop for Manager {
    fn drop(&mut self) {
        // Synchronous best effort; no runtime is guaranteed here
        for name in self.namespaces.keys() {
            let ns_path = self.base_dir.join(name);
            let _ = umount2(&ns_path, MntFlags::MNT_DETACH);
            if std::fs::remove_file(&ns_path).is_err() {
                warn!("Leaked namespace file {}", ns_path.display());
            }
        }
        self.namespaces.clear();
    }
}
