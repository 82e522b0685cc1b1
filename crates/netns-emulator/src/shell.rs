//! Interactive command shell
//!
//! The shell is handed to a session as a [`CommandLoop`], so anything that
//! can drive a running network (a scripted test, a batch file, a different
//! front end) can take its place.

use crate::backend::Backend;
use crate::driver::{Emulation, EmulationError, RunningNetwork};
use crate::input::ChannelReader;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, Stdout};
use topology::NodeRole;
use tracing::{debug, warn};

pub const PROMPT: &str = "topolab> ";

const HELP: &str = "\
Documented commands:
  help              show this list
  nodes             list nodes
  links             list links with their shaping
  net               list each node's interfaces and their peers
  dump              show host addresses and switch ports
  pingall           ping between every pair of hosts
  <node> <cmd...>   run a shell command in a node; host names expand to addresses
  exit, quit        leave the shell and stop the network
";

#[derive(Error, Debug)]
pub enum ShellError {
    #[error("Shell I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Drives a running emulation until it decides to stop
#[allow(async_fn_in_trait)]
pub trait CommandLoop {
    async fn run<B: Backend>(&mut self, emulation: &mut Emulation<B>) -> Result<(), ShellError>;
}

/// Line-oriented shell over any async reader and writer
pub struct Shell<R, W> {
    reader: R,
    writer: W,
}

impl Shell<ChannelReader, Stdout> {
    /// Shell on the process's stdin and stdout
    pub fn stdio() -> Result<Self, ShellError> {
        Ok(Shell::new(ChannelReader::stdin()?, tokio::io::stdout()))
    }
}

impl<R, W> Shell<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    async fn write(&mut self, text: &str) -> Result<(), ShellError> {
        self.writer.write_all(text.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Handle one non-empty line; false means leave the loop
    async fn dispatch<B: Backend>(&mut self, emulation: &Emulation<B>, line: &str) -> Result<bool, ShellError> {
        let Some(network) = emulation.network() else {
            self.write("*** No network is running\n").await?;
            return Ok(false);
        };

        let (first, rest) = match line.split_once(char::is_whitespace) {
            Some((first, rest)) => (first, rest.trim()),
            None => (line, ""),
        };

        let output = match first {
            "exit" | "quit" => return Ok(false),
            "help" => HELP.to_string(),
            "nodes" => render_nodes(network),
            "links" => render_links(network),
            "net" => render_net(network),
            "dump" => render_dump(network),
            "pingall" => pingall(emulation, network).await,
            node if network.topology.contains(node) => {
                if rest.is_empty() {
                    format!("*** Enter a command for node: {} <cmd>\n", node)
                } else {
                    run_in_node(emulation, network, node, rest).await
                }
            }
            _ => format!("*** Unknown command: {}\n", line),
        };

        self.write(&output).await?;
        Ok(true)
    }
}

impl<R, W> CommandLoop for Shell<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    async fn run<B: Backend>(&mut self, emulation: &mut Emulation<B>) -> Result<(), ShellError> {
        loop {
            self.write(PROMPT).await?;

            let mut line = String::new();
            if self.reader.read_line(&mut line).await? == 0 {
                // EOF
                self.write("\n").await?;
                break;
            }

            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            debug!("shell: {}", line);

            if !self.dispatch(emulation, line).await? {
                break;
            }
        }
        Ok(())
    }
}

fn render_nodes(network: &RunningNetwork) -> String {
    let ids: Vec<&str> = network.plan.nodes.iter().map(|n| n.id.as_str()).collect();
    format!("available nodes are: \n{}\n", ids.join(" "))
}

fn render_links(network: &RunningNetwork) -> String {
    let mut out = String::new();
    for link in &network.plan.links {
        let shaping = match &link.shaping {
            Some(cfg) => format!("{} Mbit, {}", cfg.bandwidth_mbps, cfg.delay),
            None => "unshaped".to_string(),
        };
        out.push_str(&format!("{}<->{} ({})\n", link.a.name, link.b.name, shaping));
    }
    out
}

fn render_net(network: &RunningNetwork) -> String {
    let mut out = String::new();
    for node in &network.plan.nodes {
        out.push_str(&node.id);
        for (local, peer) in network.plan.interfaces_of(&node.id) {
            out.push_str(&format!(" {}:{}", local.name, peer.name));
        }
        out.push('\n');
    }
    out
}

fn render_dump(network: &RunningNetwork) -> String {
    let mut out = String::new();
    for node in &network.plan.nodes {
        match node.role {
            NodeRole::Host => {
                let Some(host) = network.plan.host(&node.id) else {
                    continue;
                };
                let mut line = match &host.default_interface {
                    Some(intf) => format!("<Host {}: {}:{}", host.id, intf, host.address.ip()),
                    None => format!("<Host {}: unconnected {}", host.id, host.address.ip()),
                };
                if let Some(mac) = host.mac {
                    line.push_str(&format!(" mac={}", mac));
                }
                out.push_str(&line);
                out.push_str(">\n");
            }
            NodeRole::Switch => {
                let ports: Vec<&str> = network
                    .plan
                    .interfaces_of(&node.id)
                    .map(|(local, _)| local.name.as_str())
                    .collect();
                out.push_str(&format!("<Switch {}: {}>\n", node.id, ports.join(",")));
            }
        }
    }
    out
}

/// Ping every ordered pair of hosts once
async fn pingall<B: Backend>(emulation: &Emulation<B>, network: &RunningNetwork) -> String {
    let hosts = &network.plan.hosts;
    let mut out = String::from("*** Ping: testing ping reachability\n");
    let (mut sent, mut received) = (0u32, 0u32);

    for src in hosts {
        out.push_str(&format!("{} ->", src.id));
        for dst in hosts.iter().filter(|h| h.id != src.id) {
            let command = format!("ping -c1 -W1 {}", dst.address.ip());
            let reached = match emulation.exec(&src.id, &command).await {
                Ok(output) => output.success(),
                Err(e) => {
                    warn!("ping from {} to {} failed: {}", src.id, dst.id, e);
                    false
                }
            };
            sent += 1;
            if reached {
                received += 1;
                out.push_str(&format!(" {}", dst.id));
            } else {
                out.push_str(" X");
            }
        }
        out.push('\n');
    }

    let dropped = if sent > 0 {
        100 * (sent - received) / sent
    } else {
        0
    };
    out.push_str(&format!(
        "*** Results: {}% dropped ({}/{} received)\n",
        dropped, received, sent
    ));
    out
}

/// Replace words naming a host with that host's address
fn expand_hosts(network: &RunningNetwork, command: &str) -> String {
    command
        .split_whitespace()
        .map(|word| match network.plan.host(word) {
            Some(host) => host.address.ip().to_string(),
            None => word.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

async fn run_in_node<B: Backend>(
    emulation: &Emulation<B>,
    network: &RunningNetwork,
    node: &str,
    command: &str,
) -> String {
    let command = expand_hosts(network, command);
    match emulation.exec(node, &command).await {
        Ok(output) => {
            let mut out = output.stdout;
            out.push_str(&output.stderr);
            out
        }
        Err(EmulationError::Backend(e)) => format!("*** Error in {}: {}\n", node, e),
        Err(e) => format!("*** Error: {}\n", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use crate::plan::NetOptions;
    use topology::{presets, Delay, Topology};

    async fn running(topo: &Topology) -> Emulation<MemoryBackend> {
        let mut emulation = Emulation::new(MemoryBackend::new());
        let options = NetOptions {
            auto_set_macs: true,
            auto_static_arp: true,
            ..NetOptions::default()
        };
        emulation.start(topo, &options).await.unwrap();
        emulation
    }

    async fn script(emulation: &mut Emulation<MemoryBackend>, input: &str) -> String {
        let mut output = Vec::new();
        let mut shell = Shell::new(input.as_bytes(), &mut output);
        shell.run(emulation).await.unwrap();
        String::from_utf8(output).unwrap()
    }

    #[tokio::test]
    async fn test_nodes_and_exit() {
        let mut emulation = running(&presets::sample().unwrap()).await;
        let out = script(&mut emulation, "nodes\nexit\nnodes\n").await;

        assert!(out.starts_with(PROMPT));
        assert!(out.contains("available nodes are: \nh1 h2 h3 h4 s1 s2\n"));
        // Nothing after exit runs
        assert_eq!(out.matches("available nodes").count(), 1);
    }

    #[tokio::test]
    async fn test_net_links_and_dump() {
        let mut emulation = running(&presets::sample().unwrap()).await;
        let out = script(&mut emulation, "net\nlinks\ndump\n").await;

        assert!(out.contains("h1 h1-eth0:s1-eth1\n"));
        assert!(out.contains("s1 s1-eth1:h1-eth0 s1-eth2:h2-eth0 s1-eth3:s2-eth3\n"));
        assert!(out.contains("h3-eth0<->s2-eth1 (50 Mbit, 60ms)\n"));
        assert!(out.contains("<Host h1: h1-eth0:10.0.0.1 mac=00:00:00:00:00:01>\n"));
        assert!(out.contains("<Switch s2: s2-eth1,s2-eth2,s2-eth3>\n"));
    }

    #[tokio::test]
    async fn test_pingall_connected() {
        let mut emulation = running(&presets::sample().unwrap()).await;
        let out = script(&mut emulation, "pingall\n").await;

        assert!(out.contains("h1 -> h2 h3 h4\n"));
        assert!(out.contains("*** Results: 0% dropped (12/12 received)\n"));
    }

    #[tokio::test]
    async fn test_pingall_partitioned() {
        let mut b = Topology::builder("split");
        b.add_host("h1").unwrap();
        b.add_host("h2").unwrap();
        b.add_switch("s1").unwrap();
        b.add_switch("s2").unwrap();
        b.add_link("h1", "s1", 1.0, Delay::ZERO).unwrap();
        b.add_link("h2", "s2", 1.0, Delay::ZERO).unwrap();
        let mut emulation = running(&b.build()).await;

        let out = script(&mut emulation, "pingall\n").await;
        assert!(out.contains("h1 -> X\n"));
        assert!(out.contains("*** Results: 100% dropped (0/2 received)\n"));
    }

    #[tokio::test]
    async fn test_node_command_expands_hosts() {
        let mut emulation = running(&presets::sample().unwrap()).await;
        let out = script(&mut emulation, "h1 ping -c1 h3\nh2\n").await;

        assert!(out.contains("PING 10.0.0.3"));
        assert!(out.contains("1 received"));
        assert!(out.contains("*** Enter a command for node: h2 <cmd>"));
    }

    #[tokio::test]
    async fn test_unknown_and_blank_lines() {
        let mut emulation = running(&presets::sample().unwrap()).await;
        let out = script(&mut emulation, "\n   \nfrobnicate now\nhelp\n").await;

        assert!(out.contains("*** Unknown command: frobnicate now\n"));
        assert!(out.contains("pingall"));
        // Prompt per line read, plus one before EOF
        assert_eq!(out.matches(PROMPT).count(), 5);
    }

    #[test]
    fn test_expand_hosts_leaves_other_words() {
        let network = RunningNetwork {
            topology: presets::sample().unwrap(),
            plan: crate::plan::NetworkPlan::new(&presets::sample().unwrap(), &NetOptions::default()).unwrap(),
            options: NetOptions::default(),
        };
        assert_eq!(
            expand_hosts(&network, "iperf -c h4  -t 5"),
            "iperf -c 10.0.0.4 -t 5"
        );
        assert_eq!(expand_hosts(&network, "ping s1"), "ping s1");
    }
}
