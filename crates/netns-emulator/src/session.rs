//! Start, hand over to a command loop, stop

use crate::backend::Backend;
use crate::driver::{Emulation, EmulationError};
use crate::plan::NetOptions;
use crate::shell::CommandLoop;
use std::future::Future;
use topology::Topology;
use tracing::{info, warn};

/// Bring `topology` up, run `command_loop` until it returns or Ctrl-C
/// arrives, then tear the network down.
pub async fn run_session<B, L>(
    emulation: &mut Emulation<B>,
    topology: &Topology,
    options: &NetOptions,
    command_loop: &mut L,
) -> Result<(), EmulationError>
where
    B: Backend,
    L: CommandLoop,
{
    let interrupted = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Interrupted, shutting down"),
            Err(e) => {
                warn!("Cannot listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    run_session_until(emulation, topology, options, command_loop, interrupted).await
}

/// Like [`run_session`], with `shutdown` in place of Ctrl-C.
///
/// The network is stopped whenever it was started. The first error wins:
/// start, then the loop, then stop.
pub async fn run_session_until<B, L, F>(
    emulation: &mut Emulation<B>,
    topology: &Topology,
    options: &NetOptions,
    command_loop: &mut L,
    shutdown: F,
) -> Result<(), EmulationError>
where
    B: Backend,
    L: CommandLoop,
    F: Future<Output = ()>,
{
    emulation.start(topology, options).await?;

    let outcome = tokio::select! {
        result = command_loop.run(emulation) => result.map_err(EmulationError::from),
        () = shutdown => Ok(()),
    };

    let stopped = emulation.stop().await;
    if let (Err(loop_err), Err(stop_err)) = (&outcome, &stopped) {
        warn!("Stop failed after loop error {}: {}", loop_err, stop_err);
    }

    outcome?;
    stopped
}
