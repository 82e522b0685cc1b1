//! Emulated networks on Linux network namespaces
//!
//! This crate brings a [`topology::Topology`] up as a live network: one
//! namespace per node, a veth pair per link, a bridge inside every switch,
//! and `htb` + `netem` qdiscs shaping each link end. A [`plan::NetworkPlan`]
//! fixes names and addresses up front; a [`backend::Backend`] materializes
//! it; [`driver::Emulation`] owns the lifecycle; [`shell::Shell`] lets an
//! operator poke at the running network.
//!
//! Creating namespaces needs CAP_NET_ADMIN. [`memory::MemoryBackend`] runs the
//! same lifecycle without privileges.

pub mod backend;
pub mod driver;
pub mod host;
pub mod input;
pub mod memory;
pub mod netns;
pub mod plan;
pub mod qdisc;
pub mod session;
pub mod shell;
pub mod veth;

// Re-export commonly used types
pub use backend::{Backend, BackendError, CommandOutput, ResourceCount};
pub use driver::{Emulation, EmulationError, RunningNetwork};
pub use host::{NetnsBackend, NetnsConfig};
pub use input::ChannelReader;
pub use memory::MemoryBackend;
pub use plan::{LinkClass, MacAddr, NetOptions, NetworkPlan, PlanError};
pub use session::{run_session, run_session_until};
pub use shell::{CommandLoop, Shell, ShellError};
