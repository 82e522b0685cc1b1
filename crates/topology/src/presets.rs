//! Built-in topologies
//!
//! The hub-and-spoke and sample networks used for the CDN load-balancing
//! exercises, reachable by name from the command line.

use crate::delay::Delay;
use crate::topology::Topology;
use crate::TopologyError;

/// A named topology constructor
#[derive(Clone, Copy, Debug)]
pub struct Preset {
    pub name: &'static str,
    pub description: &'static str,
    build: fn() -> Result<Topology, TopologyError>,
}

impl Preset {
    pub fn build(&self) -> Result<Topology, TopologyError> {
        (self.build)()
    }
}

const PRESETS: &[Preset] = &[
    Preset {
        name: "hub_and_spoke",
        description: "Ten hosts on one switch, 512 down to 1 Mbit/s, 5ms each",
        build: hub_and_spoke,
    },
    Preset {
        name: "sample",
        description: "Four hosts across two switches with a 60ms far host",
        build: sample,
    },
];

/// All built-in topologies
pub fn all() -> &'static [Preset] {
    PRESETS
}

pub fn find(name: &str) -> Option<&'static Preset> {
    PRESETS.iter().find(|p| p.name == name)
}

/// Hosts h1..h10 on switch s1, each with 5ms of delay and half the
/// bandwidth of the previous host, from 512 Mbit/s down to 1 Mbit/s.
pub fn hub_and_spoke() -> Result<Topology, TopologyError> {
    const BANDWIDTHS: [f64; 10] = [512.0, 256.0, 128.0, 64.0, 32.0, 16.0, 8.0, 4.0, 2.0, 1.0];

    let mut b = Topology::builder("hub_and_spoke");
    for i in 1..=BANDWIDTHS.len() {
        b.add_host(format!("h{}", i))?;
    }
    b.add_switch("s1")?;

    for (i, bw) in BANDWIDTHS.iter().enumerate() {
        b.add_link(&format!("h{}", i + 1), "s1", *bw, Delay::from_millis(5))?;
    }
    Ok(b.build())
}

/// Two switches joined by a 40 Mbit/s trunk; h3 sits 60ms away.
pub fn sample() -> Result<Topology, TopologyError> {
    let mut b = Topology::builder("sample");
    for host in ["h1", "h2", "h3", "h4"] {
        b.add_host(host)?;
    }
    b.add_switch("s1")?;
    b.add_switch("s2")?;

    b.add_link("h1", "s1", 10.0, Delay::from_millis(10))?;
    b.add_link("h2", "s1", 20.0, Delay::from_millis(10))?;
    b.add_link("h3", "s2", 50.0, Delay::from_millis(60))?;
    b.add_link("h4", "s2", 30.0, Delay::from_millis(10))?;
    b.add_link("s1", "s2", 40.0, Delay::from_millis(10))?;
    Ok(b.build())
}
