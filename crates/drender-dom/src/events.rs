//! DOM Events
//!
//! Event objects and listener handles. The document only stores which
//! listener ids are attached to a node; the handlers themselves live with
//! whoever registered them.

use crate::NodeId;

/// Handle of a registered listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

/// DOM event
#[derive(Debug, Clone)]
pub struct Event {
    pub event_type: String,
    pub target: NodeId,
    pub current_target: Option<NodeId>,
    /// Key name for keyboard events
    pub key: Option<String>,
    /// Arbitrary payload (CustomEvent.detail)
    pub detail: serde_json::Value,
    pub bubbles: bool,
    pub cancelable: bool,
    default_prevented: bool,
    propagation_stopped: bool,
}

impl Event {
    /// Create a bubbling, cancelable event
    pub fn new(event_type: &str, target: NodeId) -> Self {
        Self {
            event_type: event_type.to_string(),
            target,
            current_target: None,
            key: None,
            detail: serde_json::Value::Null,
            bubbles: true,
            cancelable: true,
            default_prevented: false,
            propagation_stopped: false,
        }
    }

    /// Keyboard event carrying a key name
    pub fn keyboard(event_type: &str, target: NodeId, key: &str) -> Self {
        Self {
            key: Some(key.to_string()),
            ..Self::new(event_type, target)
        }
    }

    /// Non-bubbling notification event
    pub fn notification(event_type: &str, target: NodeId) -> Self {
        Self {
            bubbles: false,
            cancelable: false,
            ..Self::new(event_type, target)
        }
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = detail;
        self
    }

    pub fn prevent_default(&mut self) {
        if self.cancelable {
            self.default_prevented = true;
        }
    }

    pub fn stop_propagation(&mut self) {
        self.propagation_stopped = true;
    }

    pub fn default_prevented(&self) -> bool {
        self.default_prevented
    }

    pub fn propagation_stopped(&self) -> bool {
        self.propagation_stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prevent_default_requires_cancelable() {
        let mut event = Event::notification("ready", NodeId(1));
        event.prevent_default();
        assert!(!event.default_prevented());

        let mut event = Event::new("click", NodeId(1));
        event.prevent_default();
        event.stop_propagation();
        assert!(event.default_prevented());
        assert!(event.propagation_stopped());
    }

    #[test]
    fn test_keyboard_event() {
        let event = Event::keyboard("keyup", NodeId(3), "Enter");
        assert_eq!(event.key.as_deref(), Some("Enter"));
        assert!(event.bubbles);
    }
}
