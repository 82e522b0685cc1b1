//! Links between nodes and their shaping parameters
//!
//! A link is undirected on the wire but keeps the order its endpoints were
//! declared in, since interface numbering follows declaration order.

use crate::delay::Delay;
use serde::{Deserialize, Serialize};

/// Shaping parameters applied to both ends of a link
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Bandwidth limit in Mbit/s
    pub bandwidth_mbps: f64,
    /// One-way propagation delay
    pub delay: Delay,
    /// Delay variation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jitter: Option<Delay>,
    /// Random loss, 0-100
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loss_pct: Option<f32>,
    /// Queue limit in packets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_queue_size: Option<u32>,
}

impl LinkConfig {
    pub fn new(bandwidth_mbps: f64, delay: Delay) -> Self {
        Self {
            bandwidth_mbps,
            delay,
            jitter: None,
            loss_pct: None,
            max_queue_size: None,
        }
    }

    pub fn with_jitter(mut self, jitter: Delay) -> Self {
        self.jitter = Some(jitter);
        self
    }

    pub fn with_loss(mut self, loss_pct: f32) -> Self {
        self.loss_pct = Some(loss_pct);
        self
    }

    pub fn with_max_queue_size(mut self, packets: u32) -> Self {
        self.max_queue_size = Some(packets);
        self
    }
}

/// An edge between two declared nodes
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub a: String,
    pub b: String,
    #[serde(flatten)]
    pub config: LinkConfig,
}

impl Link {
    pub fn bandwidth_mbps(&self) -> f64 {
        self.config.bandwidth_mbps
    }

    pub fn delay(&self) -> Delay {
        self.config.delay
    }

    /// True if `id` is one of the endpoints
    pub fn touches(&self, id: &str) -> bool {
        self.a == id || self.b == id
    }

    /// The endpoint opposite `id`, if `id` is an endpoint
    pub fn peer_of(&self, id: &str) -> Option<&str> {
        if self.a == id {
            Some(&self.b)
        } else if self.b == id {
            Some(&self.a)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_lookup() {
        let link = Link {
            a: "h1".to_string(),
            b: "s1".to_string(),
            config: LinkConfig::new(10.0, Delay::from_millis(10)),
        };

        assert!(link.touches("h1"));
        assert!(!link.touches("h2"));
        assert_eq!(link.peer_of("h1"), Some("s1"));
        assert_eq!(link.peer_of("s1"), Some("h1"));
        assert_eq!(link.peer_of("s2"), None);
    }

    #[test]
    fn test_optional_fields_are_omitted() {
        let link = Link {
            a: "h1".to_string(),
            b: "s1".to_string(),
            config: LinkConfig::new(512.0, Delay::from_millis(5)),
        };

        let json = serde_json::to_value(&link).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"a": "h1", "b": "s1", "bandwidth_mbps": 512.0, "delay": "5ms"})
        );
    }

    #[test]
    fn test_optional_fields_parse() {
        let link: Link = serde_json::from_str(
            r#"{"a":"h1","b":"s1","bandwidth_mbps":20,"delay":"10ms","jitter":"2ms","loss_pct":1.5,"max_queue_size":100}"#,
        )
        .unwrap();

        assert_eq!(link.config.jitter, Some(Delay::from_millis(2)));
        assert_eq!(link.config.loss_pct, Some(1.5));
        assert_eq!(link.config.max_queue_size, Some(100));
        assert_eq!(link.bandwidth_mbps(), 20.0);
    }
}
