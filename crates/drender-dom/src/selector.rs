//! Simple selectors
//!
//! Comma-separated lists of compound selectors such as
//! `input[type="checkbox"]`, `.item.active` or `[d-state], [d-component]`.
//! Combinators are not supported.

use crate::{DomError, DomResult, ElementData};

/// Simple selector types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimpleSelector {
    Tag(String),
    Class(String),
    Id(String),
    Attr { name: String, value: Option<String> },
    Universal,
}

impl SimpleSelector {
    pub fn matches(&self, element: &ElementData) -> bool {
        match self {
            Self::Universal => true,
            Self::Tag(tag) => element.tag.eq_ignore_ascii_case(tag),
            Self::Id(id) => element.get_attr("id") == Some(id.as_str()),
            Self::Class(class) => element.get_attr("class")
                .is_some_and(|c| c.split_whitespace().any(|t| t == class)),
            Self::Attr { name, value: None } => element.attrs.has_attribute(name),
            Self::Attr { name, value: Some(v) } => element.get_attr(name) == Some(v.as_str()),
        }
    }
}

/// Parsed selector list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    alternatives: Vec<Vec<SimpleSelector>>,
}

impl Selector {
    pub fn parse(source: &str) -> DomResult<Self> {
        let mut alternatives = Vec::new();
        for part in source.split(',') {
            let compound = parse_compound(part.trim())
                .ok_or_else(|| DomError::InvalidSelector(source.to_string()))?;
            alternatives.push(compound);
        }
        Ok(Self { alternatives })
    }

    /// Selector matching elements that carry any of the given attributes
    pub fn any_attribute(names: &[&str]) -> Self {
        Self {
            alternatives: names.iter()
                .map(|n| vec![SimpleSelector::Attr { name: n.to_string(), value: None }])
                .collect(),
        }
    }

    pub fn matches(&self, element: &ElementData) -> bool {
        self.alternatives.iter()
            .any(|compound| compound.iter().all(|s| s.matches(element)))
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

fn parse_compound(s: &str) -> Option<Vec<SimpleSelector>> {
    if s.is_empty() {
        return None;
    }
    let mut out = Vec::new();
    let mut rest = s;

    let tag_len = rest.find(|c: char| !is_ident_char(c)).unwrap_or(rest.len());
    if tag_len > 0 {
        out.push(SimpleSelector::Tag(rest[..tag_len].to_ascii_lowercase()));
        rest = &rest[tag_len..];
    } else if let Some(r) = rest.strip_prefix('*') {
        out.push(SimpleSelector::Universal);
        rest = r;
    }

    while !rest.is_empty() {
        let mut chars = rest.chars();
        let marker = chars.next()?;
        let tail = chars.as_str();
        match marker {
            '#' | '.' => {
                let len = tail.find(|c: char| !is_ident_char(c)).unwrap_or(tail.len());
                if len == 0 {
                    return None;
                }
                let name = tail[..len].to_string();
                out.push(if marker == '#' { SimpleSelector::Id(name) } else { SimpleSelector::Class(name) });
                rest = &tail[len..];
            }
            '[' => {
                let close = tail.find(']')?;
                let inner = &tail[..close];
                let selector = match inner.split_once('=') {
                    Some((name, value)) => {
                        let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
                        SimpleSelector::Attr { name: name.trim().to_string(), value: Some(value.to_string()) }
                    }
                    None => SimpleSelector::Attr { name: inner.trim().to_string(), value: None },
                };
                out.push(selector);
                rest = &tail[close + 1..];
            }
            _ => return None,
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(tag: &str, attrs: &[(&str, &str)]) -> ElementData {
        let mut e = ElementData::new(tag);
        for (k, v) in attrs {
            e.attrs.set_attribute(k, v);
        }
        e
    }

    #[test]
    fn test_parse_compound() {
        let sel = Selector::parse("input[type=\"checkbox\"]").unwrap();
        assert!(sel.matches(&element("input", &[("type", "checkbox")])));
        assert!(!sel.matches(&element("input", &[("type", "radio")])));
    }

    #[test]
    fn test_selector_list() {
        let sel = Selector::parse("[d-state], [d-component]").unwrap();
        assert!(sel.matches(&element("div", &[("d-component", "Row")])));
        assert!(sel.matches(&element("div", &[("d-state", "{}")])));
        assert!(!sel.matches(&element("div", &[])));
    }

    #[test]
    fn test_class_and_id() {
        let sel = Selector::parse("li.item#first").unwrap();
        assert!(sel.matches(&element("li", &[("class", "item active"), ("id", "first")])));
        assert!(!sel.matches(&element("li", &[("class", "items"), ("id", "first")])));
    }

    #[test]
    fn test_invalid_selector() {
        assert!(Selector::parse("div > p").is_err());
        assert!(Selector::parse("").is_err());
        assert!(Selector::parse("[unclosed").is_err());
    }
}
