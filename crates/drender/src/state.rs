//! State maps and merging

use serde_json::{Map, Value as Json};

/// Component state: a JSON object with insertion-ordered keys
pub type State = Map<String, Json>;

/// Merge `source` into `target`. Nested objects merge key by key, every
/// other value replaces what was there.
pub fn deep_merge(mut target: State, source: State) -> State {
    merge_into(&mut target, source);
    target
}

fn merge_into(target: &mut State, source: State) {
    for (key, value) in source {
        match (target.get_mut(&key), value) {
            (Some(Json::Object(existing)), Json::Object(incoming)) => merge_into(existing, incoming),
            (_, value) => {
                target.insert(key, value);
            }
        }
    }
}

/// `TodoList` -> `todo-list`, `ShadowComponent` -> `shadow-component`
pub fn kebab_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            if prev_lower {
                out.push('-');
            }
            out.push(c.to_ascii_lowercase());
            prev_lower = false;
        } else if c == '_' || c == ' ' {
            out.push('-');
            prev_lower = false;
        } else {
            out.push(c);
            prev_lower = c.is_ascii_alphanumeric();
        }
    }
    out
}

/// Object-shaped JSON as a state map
pub fn as_state(json: Json) -> Option<State> {
    match json {
        Json::Object(map) => Some(map),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state(json: Json) -> State {
        as_state(json).unwrap()
    }

    #[test]
    fn test_deep_merge_nested_objects() {
        let merged = deep_merge(
            state(json!({"user": {"name": "a", "age": 1}, "tags": [1, 2]})),
            state(json!({"user": {"age": 2}, "tags": [3]})),
        );
        assert_eq!(Json::Object(merged), json!({"user": {"name": "a", "age": 2}, "tags": [3]}));
    }

    #[test]
    fn test_deep_merge_replaces_non_objects() {
        let merged = deep_merge(state(json!({"a": {"b": 1}})), state(json!({"a": 5})));
        assert_eq!(Json::Object(merged), json!({"a": 5}));
    }

    #[test]
    fn test_kebab_case() {
        assert_eq!(kebab_case("TodoList"), "todo-list");
        assert_eq!(kebab_case("ShadowComponent"), "shadow-component");
        assert_eq!(kebab_case("search"), "search");
        assert_eq!(kebab_case("HTMLView"), "htmlview");
    }
}
