//! DOMTokenList (classList)
//!
//! Space-separated token list backing the `class` attribute.

/// DOMTokenList for managing space-separated tokens (e.g., classList)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DOMTokenList {
    tokens: Vec<String>,
}

impl DOMTokenList {
    /// Create empty token list
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from space-separated string, dropping duplicates
    pub fn from_string(s: &str) -> Self {
        let mut list = Self::new();
        for token in s.split_whitespace() {
            list.add(token);
        }
        list
    }

    /// Get number of tokens
    pub fn length(&self) -> usize {
        self.tokens.len()
    }

    /// Check if token exists
    pub fn contains(&self, token: &str) -> bool {
        self.tokens.iter().any(|t| t == token)
    }

    /// Add a token, returns false if it was already present
    pub fn add(&mut self, token: &str) -> bool {
        if token.is_empty() || self.contains(token) {
            return false;
        }
        self.tokens.push(token.to_string());
        true
    }

    /// Remove a token, returns false if it was absent
    pub fn remove(&mut self, token: &str) -> bool {
        let before = self.tokens.len();
        self.tokens.retain(|t| t != token);
        before != self.tokens.len()
    }

    /// Toggle token, returns new state
    pub fn toggle(&mut self, token: &str, force: Option<bool>) -> bool {
        match force {
            Some(true) => {
                self.add(token);
                true
            }
            Some(false) => {
                self.remove(token);
                false
            }
            None => {
                if self.contains(token) {
                    self.remove(token);
                    false
                } else {
                    self.add(token);
                    true
                }
            }
        }
    }

    /// Get value as string
    pub fn value(&self) -> String {
        self.tokens.join(" ")
    }

    /// Iterate over tokens
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().map(|s| s.as_str())
    }
}

impl std::fmt::Display for DOMTokenList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_string_dedupes() {
        let list = DOMTokenList::from_string("  btn  active btn ");
        assert_eq!(list.length(), 2);
        assert_eq!(list.value(), "btn active");
    }

    #[test]
    fn test_toggle_force() {
        let mut list = DOMTokenList::from_string("a");
        assert!(list.toggle("b", Some(true)));
        assert!(list.toggle("b", Some(true)));
        assert_eq!(list.value(), "a b");
        assert!(!list.toggle("a", Some(false)));
        assert_eq!(list.value(), "b");
        assert!(!list.toggle("b", None));
        assert_eq!(list.length(), 0);
    }

    #[test]
    fn test_add_remove_report_change() {
        let mut list = DOMTokenList::new();
        assert!(list.add("x"));
        assert!(!list.add("x"));
        assert!(list.remove("x"));
        assert!(!list.remove("x"));
    }
}
