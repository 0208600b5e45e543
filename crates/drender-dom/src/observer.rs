//! Mutation Observer
//!
//! The document keeps a single log of mutation records while observation is
//! on. Records are only produced for targets attached to the document.

use crate::NodeId;

/// Mutation observer options
#[derive(Debug, Clone, Default)]
pub struct MutationObserverInit {
    pub child_list: bool,
    pub attributes: bool,
    pub attribute_old_value: bool,
    pub attribute_filter: Option<Vec<String>>,
}

impl MutationObserverInit {
    /// Child-list + attributes with old values, the shape the runtime uses
    pub fn everything() -> Self {
        Self {
            child_list: true,
            attributes: true,
            attribute_old_value: true,
            attribute_filter: None,
        }
    }
}

/// Mutation record
#[derive(Debug, Clone, PartialEq)]
pub struct MutationRecord {
    pub mutation_type: MutationType,
    pub target: NodeId,
    pub added_nodes: Vec<NodeId>,
    pub removed_nodes: Vec<NodeId>,
    pub attribute_name: Option<String>,
    pub old_value: Option<String>,
}

impl MutationRecord {
    pub fn child_list(target: NodeId, added: Vec<NodeId>, removed: Vec<NodeId>) -> Self {
        Self {
            mutation_type: MutationType::ChildList,
            target,
            added_nodes: added,
            removed_nodes: removed,
            attribute_name: None,
            old_value: None,
        }
    }

    pub fn attributes(target: NodeId, name: &str, old_value: Option<String>) -> Self {
        Self {
            mutation_type: MutationType::Attributes,
            target,
            added_nodes: Vec::new(),
            removed_nodes: Vec::new(),
            attribute_name: Some(name.to_string()),
            old_value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationType {
    Attributes,
    ChildList,
}

/// Pending mutation records for the whole document
#[derive(Debug, Default)]
pub struct MutationLog {
    options: Option<MutationObserverInit>,
    records: Vec<MutationRecord>,
}

impl MutationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, options: MutationObserverInit) {
        self.options = Some(options);
    }

    /// Stop observing and drop anything not yet taken
    pub fn disconnect(&mut self) {
        self.options = None;
        self.records.clear();
    }

    pub fn is_observing(&self) -> bool {
        self.options.is_some()
    }

    pub fn has_records(&self) -> bool {
        !self.records.is_empty()
    }

    pub fn take_records(&mut self) -> Vec<MutationRecord> {
        std::mem::take(&mut self.records)
    }

    pub(crate) fn wants_child_list(&self) -> bool {
        self.options.as_ref().is_some_and(|o| o.child_list)
    }

    pub(crate) fn wants_attribute(&self, name: &str) -> bool {
        match &self.options {
            Some(o) if o.attributes => o.attribute_filter
                .as_ref()
                .is_none_or(|filter| filter.iter().any(|f| f == name)),
            _ => false,
        }
    }

    pub(crate) fn push(&mut self, mut record: MutationRecord) {
        if record.mutation_type == MutationType::Attributes
            && !self.options.as_ref().is_some_and(|o| o.attribute_old_value)
        {
            record.old_value = None;
        }
        self.records.push(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mutation_log_observe() {
        let mut log = MutationLog::new();
        assert!(!log.wants_child_list());

        log.observe(MutationObserverInit::everything());
        assert!(log.is_observing());
        assert!(log.wants_attribute("d-text"));

        log.push(MutationRecord::attributes(NodeId(1), "d-text", Some("a".into())));
        assert!(log.has_records());
        let records = log.take_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].old_value.as_deref(), Some("a"));
        assert!(!log.has_records());

        log.disconnect();
        assert!(!log.is_observing());
    }

    #[test]
    fn test_attribute_filter_and_old_value() {
        let mut log = MutationLog::new();
        log.observe(MutationObserverInit {
            attributes: true,
            attribute_filter: Some(vec!["d-state".into()]),
            ..Default::default()
        });
        assert!(log.wants_attribute("d-state"));
        assert!(!log.wants_attribute("class"));

        log.push(MutationRecord::attributes(NodeId(1), "d-state", Some("{}".into())));
        assert_eq!(log.take_records()[0].old_value, None);
    }
}
