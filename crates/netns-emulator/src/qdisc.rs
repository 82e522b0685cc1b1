//! Traffic control (qdisc) management
//!
//! Shapes one link end the way a traffic-controlled link does: an `htb`
//! class caps the bandwidth and a `netem` qdisc underneath adds delay,
//! jitter, loss and the queue limit. Commands run through `tc` inside the
//! owning namespace.

use crate::netns::{Manager as NetNsManager, NetNsError};
use thiserror::Error;
use topology::LinkConfig;
use tracing::{debug, info, warn};

/// Highest bandwidth htb is asked to enforce, in Mbit/s
pub const BANDWIDTH_MAX_MBPS: f64 = 1000.0;

#[derive(Error, Debug)]
pub enum QdiscError {
    #[error("Namespace error: {0}")]
    NetNs(#[from] NetNsError),

    #[error("tc failed in ns {ns} on {iface}: {stderr}")]
    Tc {
        ns: String,
        iface: String,
        stderr: String,
    },
}

/// Build the `tc` argument lists that shape `iface` according to `config`.
///
/// Bandwidth outside (0, 1000] Mbit/s is not enforced; netem then sits at
/// the root on its own.
pub fn shaping_commands(iface: &str, config: &LinkConfig) -> Vec<Vec<String>> {
    let mut cmds = Vec::new();
    let netem = netem_args(config);

    let rate_limited = config.bandwidth_mbps > 0.0 && config.bandwidth_mbps <= BANDWIDTH_MAX_MBPS;
    if !rate_limited {
        warn!(
            "Bandwidth {} Mbit/s on {} is outside the supported range 0..{}; not limiting rate",
            config.bandwidth_mbps, iface, BANDWIDTH_MAX_MBPS
        );
    }

    let netem_parent: &[&str] = if rate_limited {
        cmds.push(args(&[
            "qdisc", "replace", "dev", iface, "root", "handle", "5:0", "htb", "default", "1",
        ]));
        let rate = format!("{}Mbit", config.bandwidth_mbps);
        cmds.push(args(&[
            "class", "replace", "dev", iface, "parent", "5:0", "classid", "5:1", "htb", "rate",
            &rate, "burst", "15k",
        ]));
        &["parent", "5:1"]
    } else {
        &["root"]
    };

    if !netem.is_empty() {
        let mut cmd = args(&["qdisc", "replace", "dev", iface]);
        cmd.extend(netem_parent.iter().map(|s| s.to_string()));
        cmd.extend(args(&["handle", "10:", "netem"]));
        cmd.extend(netem);
        cmds.push(cmd);
    }

    cmds
}

fn netem_args(config: &LinkConfig) -> Vec<String> {
    let mut out = Vec::new();

    let jitter = config.jitter.filter(|j| !j.is_zero());
    if !config.delay.is_zero() || jitter.is_some() {
        out.push("delay".to_string());
        out.push(config.delay.to_string());
        if let Some(j) = jitter {
            out.push(j.to_string());
        }
    }
    if let Some(loss) = config.loss_pct.filter(|l| *l > 0.0) {
        out.push("loss".to_string());
        out.push(format!("{}%", loss));
    }
    if let Some(limit) = config.max_queue_size {
        out.push("limit".to_string());
        out.push(limit.to_string());
    }

    out
}

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

/// Qdisc manager for traffic control operations
#[derive(Debug, Default)]
pub struct QdiscManager;

impl QdiscManager {
    pub fn new() -> Self {
        Self
    }

    /// Shape an interface inside a namespace.
    ///
    /// Returns the number of tc commands applied; zero means the config
    /// asked for nothing tc could enforce.
    pub async fn apply(
        &self,
        netns: &NetNsManager,
        ns_name: &str,
        iface_name: &str,
        config: &LinkConfig,
    ) -> Result<usize, QdiscError> {
        let cmds = shaping_commands(iface_name, config);

        for cmd in &cmds {
            let argv: Vec<&str> = cmd.iter().map(String::as_str).collect();
            let output = netns.exec(ns_name, "tc", &argv).await?;
            if !output.status.success() {
                return Err(QdiscError::Tc {
                    ns: ns_name.to_string(),
                    iface: iface_name.to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                });
            }
        }

        info!(
            "Shaped {} in ns {} ({} Mbit/s, {})",
            iface_name, ns_name, config.bandwidth_mbps, config.delay
        );
        Ok(cmds.len())
    }

    /// Remove the root qdisc from an interface (best-effort).
    ///
    /// A missing qdisc or interface is logged and ignored.
    pub async fn remove_all(&self, netns: &NetNsManager, ns_name: &str, iface_name: &str) {
        match netns
            .exec(ns_name, "tc", &["qdisc", "del", "dev", iface_name, "root"])
            .await
        {
            Ok(output) if output.status.success() => {
                debug!("Removed qdisc in ns {} on {}", ns_name, iface_name);
            }
            Ok(output) => {
                debug!(
                    "No qdisc removed in ns {} on {}: {}",
                    ns_name,
                    iface_name,
                    String::from_utf8_lossy(&output.stderr).trim()
                );
            }
            Err(e) => {
                warn!("Error executing tc qdisc del in ns {} on {}: {}", ns_name, iface_name, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use topology::Delay;

    fn joined(cmds: &[Vec<String>]) -> Vec<String> {
        cmds.iter().map(|c| c.join(" ")).collect()
    }

    #[test]
    fn test_bandwidth_and_delay() {
        let cfg = LinkConfig::new(512.0, Delay::from_millis(5));
        assert_eq!(
            joined(&shaping_commands("h1-eth0", &cfg)),
            vec![
                "qdisc replace dev h1-eth0 root handle 5:0 htb default 1",
                "class replace dev h1-eth0 parent 5:0 classid 5:1 htb rate 512Mbit burst 15k",
                "qdisc replace dev h1-eth0 parent 5:1 handle 10: netem delay 5ms",
            ]
        );
    }

    #[test]
    fn test_optional_netem_parameters() {
        let cfg = LinkConfig::new(0.5, Delay::from_millis(60))
            .with_jitter(Delay::from_micros(1500))
            .with_loss(2.5)
            .with_max_queue_size(100);
        let cmds = joined(&shaping_commands("s2-eth1", &cfg));

        assert_eq!(cmds[1], "class replace dev s2-eth1 parent 5:0 classid 5:1 htb rate 0.5Mbit burst 15k");
        assert_eq!(
            cmds[2],
            "qdisc replace dev s2-eth1 parent 5:1 handle 10: netem delay 60ms 1500us loss 2.5% limit 100"
        );
    }

    #[test]
    fn test_zero_delay_skips_netem() {
        let cfg = LinkConfig::new(10.0, Delay::ZERO);
        let cmds = shaping_commands("h1-eth0", &cfg);
        assert_eq!(cmds.len(), 2);
        assert!(cmds.iter().all(|c| !c.contains(&"netem".to_string())));
    }

    #[test]
    fn test_out_of_range_bandwidth_keeps_delay_only() {
        let cfg = LinkConfig::new(10_000.0, Delay::from_millis(10));
        assert_eq!(
            joined(&shaping_commands("s1-eth3", &cfg)),
            vec!["qdisc replace dev s1-eth3 root handle 10: netem delay 10ms"]
        );

        let cfg = LinkConfig::new(10_000.0, Delay::ZERO);
        assert!(shaping_commands("s1-eth3", &cfg).is_empty());
    }
}
