//! Consistent-hash ring mapping user ids to routing nodes.
//!
//! Each node is laid out as `weight * spots_per_weight` points hashed from
//! `"<node>-<replica>"`. A key belongs to the first point at or after its own
//! hash, wrapping around to the first point. Adding or removing a node only
//! moves the keys adjacent to that node's points.

use crate::error::{ring_empty_error, Error};
use log::*;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Points placed on the ring per unit of node weight.
pub const BASE_SPOTS: u32 = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Spot {
    hash: u32,
    node: usize,
}

/// Collects nodes before the ring is baked.
#[derive(Debug, Clone)]
pub struct RingBuilder {
    spots_per_weight: u32,
    nodes: BTreeMap<String, u32>,
}

impl RingBuilder {
    pub fn new(spots_per_weight: u32) -> Self {
        Self {
            spots_per_weight,
            nodes: BTreeMap::new(),
        }
    }

    /// Register `node` with `weight`; registering the same node again
    /// replaces its weight.
    pub fn add_node(mut self, node: impl Into<String>, weight: u32) -> Self {
        self.nodes.insert(node.into(), weight);
        self
    }

    /// Lay out and sort every point. The result is read-only.
    pub fn bake(self) -> Ring {
        let mut nodes = Vec::with_capacity(self.nodes.len());
        let mut spots = Vec::new();

        for (name, weight) in self.nodes {
            if weight == 0 {
                warn!("Skipping ring node {name} with zero weight");
                continue;
            }
            let index = nodes.len();
            let replicas = weight.saturating_mul(self.spots_per_weight);
            spots.extend((1..=replicas).map(|replica| Spot {
                hash: hash(format!("{name}-{replica}").as_bytes()),
                node: index,
            }));
            nodes.push(name);
        }
        spots.sort_unstable();

        debug!("Baked hash ring: {} nodes, {} points", nodes.len(), spots.len());
        Ring { nodes, spots }
    }
}

impl Default for RingBuilder {
    fn default() -> Self {
        Self::new(BASE_SPOTS)
    }
}

/// A baked, immutable hash ring. Safe to share across tasks.
#[derive(Debug, Clone)]
pub struct Ring {
    nodes: Vec<String>,
    spots: Vec<Spot>,
}

impl Ring {
    /// Build a ring from `(node, weight)` pairs using [`BASE_SPOTS`] points
    /// per unit of weight. Iteration order of `nodes` does not matter.
    pub fn build<I, S>(nodes: I) -> Ring
    where
        I: IntoIterator<Item = (S, u32)>,
        S: Into<String>,
    {
        nodes
            .into_iter()
            .fold(RingBuilder::default(), |builder, (node, weight)| {
                builder.add_node(node, weight)
            })
            .bake()
    }

    /// Node owning `key`.
    pub fn lookup(&self, key: &str) -> Result<&str, Error> {
        let target = hash(key.as_bytes());
        let index = self.spots.partition_point(|spot| spot.hash < target);
        let spot = self
            .spots
            .get(index)
            .or_else(|| self.spots.first())
            .ok_or_else(ring_empty_error)?;
        Ok(&self.nodes[spot.node])
    }

    /// Node owning `user_id`, keyed by its decimal string.
    pub fn lookup_user(&self, user_id: i64) -> Result<&str, Error> {
        self.lookup(&user_id.to_string())
    }

    /// Registered node names in sorted order.
    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    pub fn is_empty(&self) -> bool {
        self.spots.is_empty()
    }
}

fn hash(data: &[u8]) -> u32 {
    let digest = Sha256::digest(data);
    u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]])
}
