//! Network topology emulation CLI tool
//!
//! Lists and inspects topologies, exports them as JSON, prints their
//! materialization plan, and brings them up with an interactive shell.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{cmd_export, cmd_list, cmd_plan, cmd_show, cmd_up, UpArgs};
use ipnetwork::Ipv4Network;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List built-in topologies
    List,

    /// Summarize a topology's nodes and links
    Show {
        /// Built-in topology name or JSON file path
        topology: String,
    },

    /// Write a topology as JSON
    Export {
        /// Built-in topology name or JSON file path
        topology: String,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show interface names, addresses and shaping for a topology
    Plan {
        /// Built-in topology name or JSON file path
        topology: String,

        /// Print the plan as JSON
        #[arg(long)]
        json: bool,

        /// IPv4 network hosts are numbered from
        #[arg(long, default_value = "10.0.0.0/8")]
        ip_base: Ipv4Network,
    },

    /// Bring a topology up and open the command shell
    Up {
        /// Built-in topology name or JSON file path
        topology: String,

        /// Create unshaped links
        #[arg(long)]
        plain: bool,

        /// Let the kernel pick host MAC addresses
        #[arg(long)]
        no_auto_macs: bool,

        /// Skip static ARP entries
        #[arg(long)]
        no_static_arp: bool,

        /// IPv4 network hosts are numbered from
        #[arg(long, default_value = "10.0.0.0/8")]
        ip_base: Ipv4Network,

        /// Run against the in-memory backend (no privileges needed)
        #[arg(long)]
        dry_run: bool,

        /// Namespace name prefix
        #[arg(long, default_value = "tl-")]
        prefix: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing; stdout belongs to the shell
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::List => {
            cmd_list()?;
        }
        Commands::Show { topology } => {
            cmd_show(&topology)?;
        }
        Commands::Export { topology, output } => {
            cmd_export(&topology, output.as_deref())?;
        }
        Commands::Plan {
            topology,
            json,
            ip_base,
        } => {
            cmd_plan(&topology, json, ip_base)?;
        }
        Commands::Up {
            topology,
            plain,
            no_auto_macs,
            no_static_arp,
            ip_base,
            dry_run,
            prefix,
        } => {
            cmd_up(UpArgs {
                topology,
                plain,
                auto_macs: !no_auto_macs,
                static_arp: !no_static_arp,
                ip_base,
                dry_run,
                prefix,
            })
            .await?;
        }
    }

    Ok(())
}
