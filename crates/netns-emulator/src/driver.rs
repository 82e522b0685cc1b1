//! Emulation lifecycle
//!
//! [`Emulation`] owns a backend and at most one running network. `start`
//! plans the topology and hands the plan to the backend node by node and
//! link by link; any failure rolls back what was created and surfaces the
//! original error. `stop` releases everything.

use crate::backend::{Backend, BackendError, CommandOutput};
use crate::plan::{HostPlan, NetOptions, NetworkPlan, PlanError};
use crate::shell::ShellError;
use thiserror::Error;
use topology::Topology;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum EmulationError {
    #[error("Plan error: {0}")]
    Plan(#[from] PlanError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Shell error: {0}")]
    Shell(#[from] ShellError),

    #[error("A network is already running; stop it first")]
    AlreadyRunning,

    #[error("No network is running")]
    NotRunning,

    #[error("Node '{0}' is not part of the running topology")]
    UnknownNode(String),
}

/// The network currently held by the backend
#[derive(Clone, Debug)]
pub struct RunningNetwork {
    pub topology: Topology,
    pub plan: NetworkPlan,
    pub options: NetOptions,
}

pub struct Emulation<B> {
    backend: B,
    running: Option<RunningNetwork>,
}

impl<B: Backend> Emulation<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            running: None,
        }
    }

    /// Bring `topology` up on the backend
    pub async fn start(&mut self, topology: &Topology, options: &NetOptions) -> Result<(), EmulationError> {
        if self.running.is_some() {
            return Err(EmulationError::AlreadyRunning);
        }

        let plan = NetworkPlan::new(topology, options)?;
        info!(
            "Starting {} on {} backend: {} nodes, {} links",
            plan.name,
            self.backend.name(),
            plan.nodes.len(),
            plan.links.len()
        );

        if let Err(e) = self.bring_up(&plan, options).await {
            warn!("Start failed, rolling back: {}", e);
            if let Err(teardown_err) = self.backend.teardown().await {
                warn!("Rollback incomplete: {}", teardown_err);
            }
            return Err(e.into());
        }

        self.running = Some(RunningNetwork {
            topology: topology.clone(),
            plan,
            options: options.clone(),
        });
        info!("Network {} is up", topology.name());
        Ok(())
    }

    async fn bring_up(&mut self, plan: &NetworkPlan, options: &NetOptions) -> Result<(), BackendError> {
        for node in &plan.nodes {
            self.backend.create_node(node).await?;
        }
        for link in &plan.links {
            self.backend.create_link(link).await?;
        }

        if options.auto_static_arp {
            let wired: Vec<HostPlan> = plan.wired_hosts().cloned().collect();
            for host in &wired {
                self.backend.add_static_arp(host, &wired).await?;
            }
            debug!("Static ARP installed on {} hosts", wired.len());
        }
        Ok(())
    }

    /// Tear the running network down
    pub async fn stop(&mut self) -> Result<(), EmulationError> {
        let network = self.running.take().ok_or(EmulationError::NotRunning)?;
        info!("Stopping {}", network.topology.name());

        self.backend.teardown().await?;

        let left = self.backend.resources();
        if !left.is_empty() {
            warn!("Backend still holds resources after teardown: {:?}", left);
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn network(&self) -> Option<&RunningNetwork> {
        self.running.as_ref()
    }

    /// Run a shell command inside a node of the running network
    pub async fn exec(&self, node: &str, command: &str) -> Result<CommandOutput, EmulationError> {
        let network = self.running.as_ref().ok_or(EmulationError::NotRunning)?;
        if !network.topology.contains(node) {
            return Err(EmulationError::UnknownNode(node.to_string()));
        }
        Ok(self.backend.exec(node, command).await?)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }
}
