//! d-render DOM - Document Object Model
//!
//! Arena-based DOM tree used as the live document of the d-render runtime.
//!
//! Features:
//! - Element/text/comment/fragment nodes addressed by [`NodeId`]
//! - Attributes, class list, inline style and element properties
//! - Inert `<template>` content fragments
//! - Event listener slots (handlers live in the runtime)
//! - Mutation records for child-list and attribute changes

mod node;
mod tree;
mod document;
mod attributes;
mod classlist;
mod observer;
mod events;
mod selector;
mod serialize;
mod error;

pub use node::{Node, NodeData, ElementData};
pub use tree::DomTree;
pub use document::Document;
pub use attributes::{Attr, NamedNodeMap};
pub use classlist::DOMTokenList;
pub use observer::{MutationRecord, MutationType, MutationObserverInit, MutationLog};
pub use events::{Event, ListenerId};
pub use selector::{Selector, SimpleSelector};
pub use error::{DomError, DomResult};

/// Node identifier (index into arena)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    /// Document root node ID
    pub const ROOT: NodeId = NodeId(0);

    /// Sentinel for "no node"
    pub const NONE: NodeId = NodeId(u32::MAX);

    /// Check if this ID points at a node
    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::NONE
    }

    /// Arena index
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub(crate) fn some(self) -> Option<NodeId> {
        if self.is_valid() { Some(self) } else { None }
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}
