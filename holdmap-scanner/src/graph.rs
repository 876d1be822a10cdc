//! In-memory ownership graph.
//!
//! Nodes are addressed by the string key derived from their [`Identity`];
//! petgraph indices never leave this module, so callers can keep mutating
//! the store while walking it recursively.

use crate::error::{CrawlError, Result};
use crate::identity::Identity;
use crate::source::Attributes;
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpansionState {
    /// Relations never requested.
    Unexpanded,
    /// Relations fetched; neighbors may have stopped at the depth limit.
    PartiallyExpanded,
    /// Reached at the depth limit, so relations were never requested.
    FullyBlockedByDepth,
}

impl ExpansionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpansionState::Unexpanded => "unexpanded",
            ExpansionState::PartiallyExpanded => "partially_expanded",
            ExpansionState::FullyBlockedByDepth => "fully_blocked_by_depth",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    Ownership,
}

impl RelationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationKind::Ownership => "ownership",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub key: String,
    pub identity: Identity,
    pub display_name: Option<String>,
    pub depth: usize,
    pub attributes: Attributes,
    pub expansion_state: ExpansionState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub relation_kind: RelationKind,
    pub qualification_code: String,
    pub entry_date: Option<String>,
}

/// Outcome of [`GraphStore::upsert_node`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Created,
    /// The node was already present; values recorded before this visit.
    Existing {
        previous_depth: usize,
        previous_state: ExpansionState,
    },
}

impl Upsert {
    pub fn is_new(&self) -> bool {
        matches!(self, Upsert::Created)
    }
}

#[derive(Debug, Default)]
pub struct GraphStore {
    graph: DiGraph<Node, Edge>,
    index: HashMap<String, NodeIndex>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn get_node(&self, key: &str) -> Option<&Node> {
        self.index.get(key).map(|&idx| &self.graph[idx])
    }

    fn node_mut(&mut self, key: &str) -> Result<&mut Node> {
        let idx = *self
            .index
            .get(key)
            .ok_or_else(|| CrawlError::MissingNode(key.to_string()))?;
        Ok(&mut self.graph[idx])
    }

    /// Insert the node if absent, otherwise lower its depth to `depth` when
    /// that is shallower.
    pub fn upsert_node(&mut self, identity: &Identity, depth: usize) -> Upsert {
        let key = identity.key();

        if let Some(&idx) = self.index.get(&key) {
            let node = &mut self.graph[idx];
            let previous = Upsert::Existing {
                previous_depth: node.depth,
                previous_state: node.expansion_state,
            };
            node.depth = node.depth.min(depth);
            return previous;
        }

        let display_name = match identity {
            Identity::LegalEntity { .. } => None,
            Identity::NaturalPerson { name, .. } => Some(name.clone()),
        };
        let idx = self.graph.add_node(Node {
            key: key.clone(),
            identity: identity.clone(),
            display_name,
            depth,
            attributes: Attributes::new(),
            expansion_state: ExpansionState::Unexpanded,
        });
        self.index.insert(key, idx);
        Upsert::Created
    }

    /// Merge `attributes` into the node's attribute map.
    pub fn set_attributes(&mut self, key: &str, attributes: Attributes) -> Result<()> {
        self.node_mut(key)?.attributes.extend(attributes);
        Ok(())
    }

    pub fn set_display_name(&mut self, key: &str, name: Option<String>) -> Result<()> {
        self.node_mut(key)?.display_name = name;
        Ok(())
    }

    pub fn set_expansion_state(&mut self, key: &str, state: ExpansionState) -> Result<()> {
        self.node_mut(key)?.expansion_state = state;
        Ok(())
    }

    /// Add an ownership edge. Returns `false` when the same relation (same
    /// endpoints and qualification) is already present.
    pub fn add_edge(
        &mut self,
        owner: &str,
        owned: &str,
        qualification_code: &str,
        entry_date: Option<&str>,
    ) -> Result<bool> {
        let source = *self
            .index
            .get(owner)
            .ok_or_else(|| CrawlError::MissingNode(owner.to_string()))?;
        let target = *self
            .index
            .get(owned)
            .ok_or_else(|| CrawlError::MissingNode(owned.to_string()))?;

        let exists = self
            .graph
            .edges_connecting(source, target)
            .any(|edge| edge.weight().qualification_code == qualification_code);
        if exists {
            return Ok(false);
        }

        self.graph.add_edge(
            source,
            target,
            Edge {
                relation_kind: RelationKind::Ownership,
                qualification_code: qualification_code.to_string(),
                entry_date: entry_date.map(str::to_string),
            },
        );
        Ok(true)
    }

    /// Owners of `key` already in the graph.
    pub fn predecessors_of(&self, key: &str) -> Vec<String> {
        self.neighbors(key, Direction::Incoming)
    }

    /// Companies owned by `key` already in the graph.
    pub fn successors_of(&self, key: &str) -> Vec<String> {
        self.neighbors(key, Direction::Outgoing)
    }

    fn neighbors(&self, key: &str, direction: Direction) -> Vec<String> {
        let Some(&idx) = self.index.get(key) else {
            return Vec::new();
        };

        // Parallel edges (one per qualification) share a neighbor
        let mut keys: Vec<String> = Vec::new();
        for neighbor in self.graph.neighbors_directed(idx, direction) {
            let neighbor_key = &self.graph[neighbor].key;
            if !keys.contains(neighbor_key) {
                keys.push(neighbor_key.clone());
            }
        }
        // petgraph walks adjacency lists newest-first
        keys.reverse();
        keys
    }

    pub fn iter_nodes(&self) -> impl Iterator<Item = &Node> {
        self.graph.node_weights()
    }

    /// Edges as (owner key, owned key, edge) in insertion order.
    pub fn iter_edges(&self) -> impl Iterator<Item = (&str, &str, &Edge)> {
        self.graph.edge_references().map(|edge| {
            (
                self.graph[edge.source()].key.as_str(),
                self.graph[edge.target()].key.as_str(),
                edge.weight(),
            )
        })
    }

    /// Export view of every node with its full attribute map.
    pub fn nodes(&self) -> Vec<(String, Attributes)> {
        self.iter_nodes()
            .map(|node| (node.key.clone(), node_attributes(node)))
            .collect()
    }

    /// Export view of every edge with its full attribute map.
    pub fn edges(&self) -> Vec<(String, String, Attributes)> {
        self.iter_edges()
            .map(|(source, target, edge)| {
                (source.to_string(), target.to_string(), edge_attributes(edge))
            })
            .collect()
    }
}

/// Flatten a node into the attribute map exporters consume. Registry columns
/// come first; derived fields overwrite clashing names.
pub fn node_attributes(node: &Node) -> Attributes {
    let mut attributes = node.attributes.clone();
    attributes.insert("kind".to_string(), Value::from(node.identity.kind_str()));
    attributes.insert(
        "partner_type".to_string(),
        Value::from(node.identity.partner_type()),
    );
    attributes.insert(
        "name".to_string(),
        node.display_name.clone().map(Value::from).unwrap_or(Value::Null),
    );
    attributes.insert("depth".to_string(), Value::from(node.depth as u64));
    attributes.insert(
        "expansion_state".to_string(),
        Value::from(node.expansion_state.as_str()),
    );
    attributes
}

pub fn edge_attributes(edge: &Edge) -> Attributes {
    let mut attributes = Attributes::new();
    attributes.insert("kind".to_string(), Value::from(edge.relation_kind.as_str()));
    attributes.insert(
        "qualification_code".to_string(),
        Value::from(edge.qualification_code.as_str()),
    );
    attributes.insert(
        "entry_date".to_string(),
        edge.entry_date.clone().map(Value::from).unwrap_or(Value::Null),
    );
    attributes
}
