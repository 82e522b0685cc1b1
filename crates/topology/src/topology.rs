//! The immutable topology graph and its serialized form

use crate::builder::TopologyBuilder;
use crate::link::Link;
use crate::node::{Node, NodeRole};
use crate::{LoadError, TopologyError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Complete graph description of a network to emulate
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(try_from = "TopologyDocument", into = "TopologyDocument")]
pub struct Topology {
    name: String,
    nodes: Vec<Node>,
    index: HashMap<String, usize>,
    links: Vec<Link>,
}

impl PartialEq for Topology {
    fn eq(&self, other: &Self) -> bool {
        // index is derived from nodes
        self.name == other.name && self.nodes == other.nodes && self.links == other.links
    }
}

impl Topology {
    pub(crate) fn from_parts(
        name: String,
        nodes: Vec<Node>,
        index: HashMap<String, usize>,
        links: Vec<Link>,
    ) -> Self {
        Self {
            name,
            nodes,
            index,
            links,
        }
    }

    pub fn builder(name: impl Into<String>) -> TopologyBuilder {
        TopologyBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// All nodes in declaration order
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn hosts(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.is_host())
    }

    pub fn switches(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.is_switch())
    }

    /// All links in declaration order
    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn links_of<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Link> + 'a {
        self.links.iter().filter(move |l| l.touches(id))
    }

    /// Directly connected nodes, in link order, one entry per link
    pub fn neighbors<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.links.iter().filter_map(move |l| l.peer_of(id))
    }

    pub fn to_json_pretty(&self) -> Result<String, LoadError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, LoadError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read a topology from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| LoadError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }
}

/// On-disk form; loading replays it through the builder
#[derive(Clone, Debug, Serialize, Deserialize)]
struct TopologyDocument {
    #[serde(default)]
    name: String,
    nodes: Vec<Node>,
    #[serde(default)]
    links: Vec<Link>,
}

impl TryFrom<TopologyDocument> for Topology {
    type Error = TopologyError;

    fn try_from(doc: TopologyDocument) -> Result<Self, Self::Error> {
        let mut builder = TopologyBuilder::new(doc.name);
        for node in doc.nodes {
            match node.role {
                NodeRole::Host => builder.add_host(node.id)?,
                NodeRole::Switch => builder.add_switch(node.id)?,
            };
        }
        for link in doc.links {
            builder.add_link_with(&link.a, &link.b, link.config)?;
        }
        Ok(builder.build())
    }
}

impl From<Topology> for TopologyDocument {
    fn from(topo: Topology) -> Self {
        Self {
            name: topo.name,
            nodes: topo.nodes,
            links: topo.links,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Delay;

    fn triangle() -> Topology {
        let mut b = Topology::builder("triangle");
        b.add_host("h1").unwrap();
        b.add_host("h2").unwrap();
        b.add_switch("s1").unwrap();
        b.add_link("h1", "s1", 10.0, Delay::from_millis(1)).unwrap();
        b.add_link("h2", "s1", 20.0, Delay::from_millis(2)).unwrap();
        b.build()
    }

    #[test]
    fn test_queries() {
        let topo = triangle();

        assert_eq!(topo.hosts().count(), 2);
        assert_eq!(topo.switches().count(), 1);
        assert_eq!(topo.node("s1").map(|n| n.role), Some(NodeRole::Switch));
        assert!(topo.node("s2").is_none());
        assert_eq!(topo.links_of("s1").count(), 2);
        assert_eq!(topo.neighbors("s1").collect::<Vec<_>>(), vec!["h1", "h2"]);
        assert_eq!(topo.neighbors("h2").collect::<Vec<_>>(), vec!["s1"]);
    }

    #[test]
    fn test_invalid_document_rejected() {
        let err = Topology::from_json(
            r#"{"name":"x","nodes":[{"id":"h1","role":"host"}],"links":[{"a":"h1","b":"s1","bandwidth_mbps":1,"delay":"1ms"}]}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("s1"), "{}", err);

        let err = Topology::from_json(
            r#"{"nodes":[{"id":"h1","role":"host"},{"id":"h1","role":"switch"}]}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("h1"), "{}", err);
    }

    #[test]
    fn test_json_round_trip() {
        let topo = triangle();
        let json = topo.to_json_pretty().unwrap();
        assert_eq!(Topology::from_json(&json).unwrap(), topo);
    }
}
