//! CLI command implementations
//!
//! Rendering is kept in plain functions returning strings so the output can
//! be unit tested without spawning the binary.

use anyhow::{bail, Context, Result};
use ipnetwork::Ipv4Network;
use netns_emulator::{
    run_session, Backend, Emulation, LinkClass, MemoryBackend, NetOptions, NetnsBackend, NetnsConfig,
    NetworkPlan, Shell,
};
use std::fmt::Write as _;
use std::path::Path;
use topology::{presets, LinkConfig, Topology};
use tracing::{info, warn};

/// Arguments of the `up` command after flag inversion
#[derive(Clone, Debug)]
pub struct UpArgs {
    pub topology: String,
    pub plain: bool,
    pub auto_macs: bool,
    pub static_arp: bool,
    pub ip_base: Ipv4Network,
    pub dry_run: bool,
    pub prefix: String,
}

/// Implementation of the 'list' command
pub fn cmd_list() -> Result<()> {
    println!("Built-in topologies:");
    for preset in presets::all() {
        println!("  {:<16} - {}", preset.name, preset.description);
    }
    Ok(())
}

/// Implementation of the 'show' command
pub fn cmd_show(topology: &str) -> Result<()> {
    let topo = resolve_topology(topology)?;
    print!("{}", render_summary(&topo));
    Ok(())
}

/// Implementation of the 'export' command
pub fn cmd_export(topology: &str, output: Option<&Path>) -> Result<()> {
    let topo = resolve_topology(topology)?;
    let json = topo.to_json_pretty()?;

    match output {
        Some(path) => {
            std::fs::write(path, json + "\n")
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Wrote {} to {}", topo.name(), path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

/// Implementation of the 'plan' command
pub fn cmd_plan(topology: &str, json: bool, ip_base: Ipv4Network) -> Result<()> {
    let topo = resolve_topology(topology)?;
    let options = NetOptions {
        auto_set_macs: true,
        auto_static_arp: true,
        ip_base: ip_base.ip(),
        prefix_len: ip_base.prefix(),
        ..NetOptions::default()
    };
    let plan = NetworkPlan::new(&topo, &options)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        print!("{}", render_plan(&plan));
    }
    Ok(())
}

/// Implementation of the 'up' command
pub async fn cmd_up(args: UpArgs) -> Result<()> {
    let topo = resolve_topology(&args.topology)?;
    let options = up_options(&args);

    if args.dry_run {
        info!("Dry run: using the in-memory backend");
        return session(MemoryBackend::new(), &topo, &options).await;
    }

    let backend = NetnsBackend::new(NetnsConfig {
        prefix: args.prefix.clone(),
        ..NetnsConfig::default()
    })
    .await
    .context("Failed to initialize the netns backend (requires root or CAP_NET_ADMIN)")?;
    session(backend, &topo, &options).await
}

async fn session<B: Backend>(backend: B, topo: &Topology, options: &NetOptions) -> Result<()> {
    let mut emulation = Emulation::new(backend);
    let mut shell = Shell::stdio().context("Failed to open the shell on stdin")?;

    run_session(&mut emulation, topo, options, &mut shell)
        .await
        .with_context(|| format!("Session on {} failed", topo.name()))?;

    info!("Network {} shut down", topo.name());
    Ok(())
}

fn up_options(args: &UpArgs) -> NetOptions {
    let mut static_arp = args.static_arp;
    if static_arp && !args.auto_macs {
        warn!("Static ARP needs automatic MACs; skipping it");
        static_arp = false;
    }

    NetOptions {
        link_class: if args.plain {
            LinkClass::Plain
        } else {
            LinkClass::Shaped
        },
        auto_set_macs: args.auto_macs,
        auto_static_arp: static_arp,
        ip_base: args.ip_base.ip(),
        prefix_len: args.ip_base.prefix(),
    }
}

/// Resolve a built-in topology name, falling back to a JSON file path
fn resolve_topology(arg: &str) -> Result<Topology> {
    if let Some(preset) = presets::find(arg) {
        return preset
            .build()
            .with_context(|| format!("Built-in topology {} is invalid", arg));
    }

    let path = Path::new(arg);
    if path.exists() {
        return Topology::load(path).with_context(|| format!("Failed to load topology from {}", arg));
    }

    let names: Vec<&str> = presets::all().iter().map(|p| p.name).collect();
    bail!(
        "Unknown topology '{}': not a built-in ({}) or an existing file",
        arg,
        names.join(", ")
    );
}

fn describe_link(config: &LinkConfig) -> String {
    let mut text = format!("{} Mbit/s {}", config.bandwidth_mbps, config.delay);
    if let Some(jitter) = config.jitter {
        let _ = write!(text, " jitter {}", jitter);
    }
    if let Some(loss) = config.loss_pct {
        let _ = write!(text, " loss {}%", loss);
    }
    if let Some(limit) = config.max_queue_size {
        let _ = write!(text, " queue {}", limit);
    }
    text
}

fn render_summary(topo: &Topology) -> String {
    let hosts: Vec<&str> = topo.hosts().map(|n| n.id.as_str()).collect();
    let switches: Vec<&str> = topo.switches().map(|n| n.id.as_str()).collect();

    let mut out = String::new();
    let _ = writeln!(out, "Topology: {}", topo.name());
    let _ = writeln!(out, "  hosts ({}): {}", hosts.len(), hosts.join(" "));
    let _ = writeln!(out, "  switches ({}): {}", switches.len(), switches.join(" "));
    let _ = writeln!(out, "Links ({}):", topo.links().len());
    for link in topo.links() {
        let _ = writeln!(out, "  {} <-> {}  {}", link.a, link.b, describe_link(&link.config));
    }
    out
}

fn render_plan(plan: &NetworkPlan) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Plan: {}", plan.name);
    let _ = writeln!(out, "Hosts:");
    for host in &plan.hosts {
        let mac = host.mac.map(|m| m.to_string()).unwrap_or_else(|| "-".to_string());
        let intf = host.default_interface.as_deref().unwrap_or("-");
        let _ = writeln!(out, "  {:<8} {:<18} {:<17} {}", host.id, host.address.to_string(), mac, intf);
    }
    let _ = writeln!(out, "Links:");
    for link in &plan.links {
        let shaping = link
            .shaping
            .as_ref()
            .map(describe_link)
            .unwrap_or_else(|| "unshaped".to_string());
        let _ = writeln!(out, "  {} <-> {}  {}", link.a.name, link.b.name, shaping);
    }
    out
}
