//! Builder for constructing Topology values
//!
//! Every call checks membership and identifier rules as it goes, so a
//! builder can only ever hold a valid graph and `build` cannot fail.

use crate::delay::Delay;
use crate::link::{Link, LinkConfig};
use crate::node::{is_valid_node_id, Node, NodeRole};
use crate::topology::Topology;
use crate::TopologyError;
use std::collections::HashMap;

/// Incrementally declares nodes and links
#[derive(Debug, Default)]
pub struct TopologyBuilder {
    name: String,
    nodes: Vec<Node>,
    index: HashMap<String, usize>,
    links: Vec<Link>,
}

impl TopologyBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn add_host(&mut self, id: impl Into<String>) -> Result<Node, TopologyError> {
        self.add_node(id.into(), NodeRole::Host)
    }

    pub fn add_switch(&mut self, id: impl Into<String>) -> Result<Node, TopologyError> {
        self.add_node(id.into(), NodeRole::Switch)
    }

    /// Connect two declared nodes with a bandwidth (Mbit/s) and delay
    pub fn add_link(
        &mut self,
        a: &str,
        b: &str,
        bandwidth_mbps: f64,
        delay: Delay,
    ) -> Result<Link, TopologyError> {
        self.add_link_with(a, b, LinkConfig::new(bandwidth_mbps, delay))
    }

    /// Connect two declared nodes with a full shaping configuration
    pub fn add_link_with(
        &mut self,
        a: &str,
        b: &str,
        config: LinkConfig,
    ) -> Result<Link, TopologyError> {
        for endpoint in [a, b] {
            if !self.index.contains_key(endpoint) {
                return Err(TopologyError::UnknownNode(endpoint.to_string()));
            }
        }
        if a == b {
            return Err(TopologyError::SelfLoop(a.to_string()));
        }
        validate_config(a, b, &config)?;

        let link = Link {
            a: a.to_string(),
            b: b.to_string(),
            config,
        };
        self.links.push(link.clone());
        Ok(link)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn build(self) -> Topology {
        Topology::from_parts(self.name, self.nodes, self.index, self.links)
    }

    fn add_node(&mut self, id: String, role: NodeRole) -> Result<Node, TopologyError> {
        if !is_valid_node_id(&id) {
            return Err(TopologyError::InvalidNodeId(id));
        }
        if self.index.contains_key(&id) {
            return Err(TopologyError::DuplicateNode(id));
        }

        let node = Node { id, role };
        self.index.insert(node.id.clone(), self.nodes.len());
        self.nodes.push(node.clone());
        Ok(node)
    }
}

fn validate_config(a: &str, b: &str, config: &LinkConfig) -> Result<(), TopologyError> {
    let link = || format!("{}-{}", a, b);

    if !config.bandwidth_mbps.is_finite() || config.bandwidth_mbps <= 0.0 {
        return Err(TopologyError::InvalidBandwidth {
            link: link(),
            bandwidth: config.bandwidth_mbps,
        });
    }
    if let Some(loss) = config.loss_pct {
        if !(0.0..=100.0).contains(&loss) {
            return Err(TopologyError::InvalidLoss { link: link(), loss });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_happy_path() {
        let mut builder = TopologyBuilder::new("pair");
        let h1 = builder.add_host("h1").unwrap();
        let s1 = builder.add_switch("s1").unwrap();
        assert_eq!(h1.role, NodeRole::Host);
        assert_eq!(s1.role, NodeRole::Switch);

        let link = builder
            .add_link("h1", "s1", 10.0, Delay::from_millis(10))
            .unwrap();
        assert_eq!(link.a, "h1");
        assert_eq!(link.b, "s1");

        let topo = builder.build();
        assert_eq!(topo.name(), "pair");
        assert_eq!(topo.nodes().len(), 2);
        assert_eq!(topo.links().len(), 1);
    }

    #[test]
    fn test_unknown_endpoint_rejected() {
        let mut builder = TopologyBuilder::new("t");
        builder.add_host("h1").unwrap();

        let err = builder
            .add_link("h1", "s9", 10.0, Delay::from_millis(1))
            .unwrap_err();
        assert_eq!(err, TopologyError::UnknownNode("s9".to_string()));

        let err = builder
            .add_link("h0", "h1", 10.0, Delay::from_millis(1))
            .unwrap_err();
        assert_eq!(err, TopologyError::UnknownNode("h0".to_string()));

        assert!(builder.build().links().is_empty());
    }

    #[test]
    fn test_duplicate_id_rejected_across_roles() {
        let mut builder = TopologyBuilder::new("t");
        builder.add_host("x1").unwrap();

        assert_eq!(
            builder.add_host("x1").unwrap_err(),
            TopologyError::DuplicateNode("x1".to_string())
        );
        assert_eq!(
            builder.add_switch("x1").unwrap_err(),
            TopologyError::DuplicateNode("x1".to_string())
        );
        assert_eq!(builder.build().nodes().len(), 1);
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        let mut builder = TopologyBuilder::new("t");
        builder.add_host("h1").unwrap();
        builder.add_switch("s1").unwrap();

        assert!(matches!(
            builder.add_link("h1", "s1", 0.0, Delay::from_millis(1)),
            Err(TopologyError::InvalidBandwidth { .. })
        ));
        assert!(matches!(
            builder.add_link("h1", "s1", f64::NAN, Delay::from_millis(1)),
            Err(TopologyError::InvalidBandwidth { .. })
        ));
        assert!(matches!(
            builder.add_link_with(
                "h1",
                "s1",
                LinkConfig::new(1.0, Delay::ZERO).with_loss(120.0)
            ),
            Err(TopologyError::InvalidLoss { .. })
        ));
        assert_eq!(
            builder
                .add_link("s1", "s1", 1.0, Delay::ZERO)
                .unwrap_err(),
            TopologyError::SelfLoop("s1".to_string())
        );
        assert!(matches!(
            builder.add_host("bad id"),
            Err(TopologyError::InvalidNodeId(_))
        ));
    }

    #[test]
    fn test_parallel_links_allowed() {
        let mut builder = TopologyBuilder::new("t");
        builder.add_switch("s1").unwrap();
        builder.add_switch("s2").unwrap();
        builder.add_link("s1", "s2", 40.0, Delay::from_millis(10)).unwrap();
        builder.add_link("s2", "s1", 40.0, Delay::from_millis(10)).unwrap();

        assert_eq!(builder.build().links().len(), 2);
    }
}
