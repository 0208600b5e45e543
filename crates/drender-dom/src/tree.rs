//! DOM Tree (arena-based allocation)

use crate::{Node, NodeId};

/// Arena-based DOM tree
///
/// Nodes are never freed; detached nodes simply lose their parent link.
#[derive(Debug, Default)]
pub struct DomTree {
    nodes: Vec<Node>,
}

impl DomTree {
    /// Create a new tree holding only the document node
    pub fn new() -> Self {
        Self { nodes: vec![Node::document()] }
    }

    /// Get a node by ID
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    /// Get a mutable node by ID
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.index())
    }

    /// Move a node into the arena
    pub fn push(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    /// Number of nodes in the tree
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if tree is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Root (document) node
    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_tree_has_document() {
        let tree = DomTree::new();
        assert_eq!(tree.len(), 1);
        assert!(matches!(tree.get(NodeId::ROOT).map(|n| &n.data), Some(crate::NodeData::Document)));
    }

    #[test]
    fn test_push_returns_sequential_ids() {
        let mut tree = DomTree::new();
        let a = tree.push(Node::element("div"));
        let b = tree.push(Node::text("hi"));
        assert_eq!(a, NodeId(1));
        assert_eq!(b, NodeId(2));
        assert!(tree.get(b).unwrap().is_text());
    }
}
