use std::collections::HashSet;

use crate::path::{PathSegment, ResourcePath};
use crate::types::ResourceTreeNodeDef;

/// The id that matches any resource id at its tree position. Always
/// lower priority than an exact-id sibling.
pub const WILDCARD: &str = "*";

/// Handle to a node in a [`ResourceTree`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
struct Node {
    /// `None` only for the synthetic root of a multi-root forest; such a
    /// node is never itself a match target.
    resource_type: Option<String>,
    resource_id: String,
    children: Vec<NodeId>,
}

/// A hierarchy of typed, id'd nodes describing an allowed or required
/// resource hierarchy.
///
/// Nodes live in a flat arena and reference children by index; the tree
/// is built once from rule definitions and read-only afterward.
#[derive(Debug, Clone)]
pub struct ResourceTree {
    nodes: Vec<Node>,
    root: NodeId,
}

impl ResourceTree {
    /// Build a tree from the definition nodes of a rule.
    ///
    /// A single top-level node becomes the root; zero or several become
    /// children of a synthetic typeless root.
    #[must_use]
    pub fn from_defs(defs: &[ResourceTreeNodeDef]) -> Self {
        let mut nodes = Vec::new();
        let top_level = Self::build_nodes(defs, &mut nodes);
        let root = if top_level.len() == 1 {
            top_level[0]
        } else {
            let id = NodeId(nodes.len());
            nodes.push(Node {
                resource_type: None,
                resource_id: WILDCARD.to_owned(),
                children: top_level,
            });
            id
        };
        Self { nodes, root }
    }

    fn build_nodes(defs: &[ResourceTreeNodeDef], nodes: &mut Vec<Node>) -> Vec<NodeId> {
        let mut ids = Vec::with_capacity(defs.len());
        for def in defs {
            let children = Self::build_nodes(&def.children, nodes);
            let id = NodeId(nodes.len());
            nodes.push(Node {
                resource_type: Some(def.resource_type.clone()),
                resource_id: def.resource_id.clone(),
                children,
            });
            ids.push(id);
        }
        ids
    }

    /// Match a resource's full name against this tree.
    ///
    /// The resolved path is reversed to root-first order and leading
    /// segments of inapplicable types are stripped, stopping at the first
    /// applicable type. Returns the final matching node, or `None` when
    /// the resource has no matchable path or no node accepts it.
    #[must_use]
    pub fn match_resource(
        &self,
        full_name: &str,
        applicable_types: &HashSet<String>,
    ) -> Option<NodeId> {
        let path = ResourcePath::parse(full_name);
        let root_first = path.root_first();
        let start = root_first
            .iter()
            .position(|segment| applicable_types.contains(&segment.resource_type))
            .unwrap_or(root_first.len());
        let tuples = &root_first[start..];
        if tuples.is_empty() {
            return None;
        }
        self.match_node(self.root, tuples)
    }

    fn match_node(&self, id: NodeId, tuples: &[&PathSegment]) -> Option<NodeId> {
        let node = &self.nodes[id.0];
        let Some(resource_type) = &node.resource_type else {
            // Synthetic root: delegate without consuming any of the path.
            return self.match_children(id, tuples);
        };
        for (i, segment) in tuples.iter().enumerate() {
            let id_match =
                node.resource_id == WILDCARD || segment.resource_id == node.resource_id;
            if &segment.resource_type == resource_type && id_match {
                let rest = &tuples[i + 1..];
                if rest.is_empty() {
                    return Some(id);
                }
                if node.children.is_empty() {
                    // A matched leaf cannot have descendants matched
                    // against it.
                    return None;
                }
                return self.match_children(id, rest);
            }
        }
        None
    }

    fn match_children(&self, id: NodeId, tuples: &[&PathSegment]) -> Option<NodeId> {
        let mut wildcard_match = None;
        for &child in &self.nodes[id.0].children {
            if let Some(found) = self.match_node(child, tuples) {
                if self.nodes[found.0].resource_id != WILDCARD {
                    return Some(found);
                }
                if wildcard_match.is_none() {
                    wildcard_match = Some(found);
                }
            }
        }
        wildcard_match
    }

    /// All concrete (typed, non-wildcard) nodes, in build order. The
    /// required-but-missing pass reports any of these that no scanned
    /// resource matched.
    #[must_use]
    pub fn concrete_nodes(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.resource_type.is_some() && node.resource_id != WILDCARD)
            .map(|(i, _)| NodeId(i))
            .collect()
    }

    /// The node's resource type; `None` for the synthetic root.
    #[must_use]
    pub fn resource_type(&self, id: NodeId) -> Option<&str> {
        self.nodes[id.0].resource_type.as_deref()
    }

    #[must_use]
    pub fn resource_id(&self, id: NodeId) -> &str {
        &self.nodes[id.0].resource_id
    }

    #[must_use]
    pub fn is_wildcard(&self, id: NodeId) -> bool {
        self.nodes[id.0].resource_id == WILDCARD
    }

    /// Total node count, synthetic root included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
