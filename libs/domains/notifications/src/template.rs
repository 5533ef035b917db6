//! Body template rendering.
//!
//! A template is any JSON tree. Strings of the exact form `{$.event.<field>}`
//! are placeholders and are replaced by `data[<field>]` with its original
//! JSON type. Nothing else is interpolated.

use serde_json::{Map, Value};

const PLACEHOLDER_PREFIX: &str = "{$.event.";
const PLACEHOLDER_SUFFIX: &str = "}";

/// Render `template` against an event's `data`.
///
/// Object keys and array order are preserved; numbers, booleans and null pass
/// through. A placeholder naming a field missing from `data` stays as the
/// literal placeholder string.
pub fn render(template: &Value, data: &Map<String, Value>) -> Value {
    match template {
        Value::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(key, value)| (key.clone(), render(value, data)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(|item| render(item, data)).collect()),
        Value::String(s) => resolve(s, data),
        other => other.clone(),
    }
}

fn resolve(s: &str, data: &Map<String, Value>) -> Value {
    placeholder_field(s)
        .and_then(|field| data.get(field))
        .cloned()
        .unwrap_or_else(|| Value::String(s.to_string()))
}

/// Field named by a placeholder string, if `s` is one.
///
/// The field must be a single non-empty segment: `{$.event}`,
/// `{$.event.a.b}` and `{$.other.a}` are not placeholders.
pub fn placeholder_field(s: &str) -> Option<&str> {
    let field = s
        .strip_prefix(PLACEHOLDER_PREFIX)?
        .strip_suffix(PLACEHOLDER_SUFFIX)?;

    if field.is_empty() || field.contains('.') {
        return None;
    }
    Some(field)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("test data must be an object"),
        }
    }

    #[test]
    fn test_placeholder_grammar() {
        assert_eq!(placeholder_field("{$.event.user_id}"), Some("user_id"));
        assert_eq!(placeholder_field("{$.event.x}"), Some("x"));

        assert_eq!(placeholder_field("{$.event}"), None);
        assert_eq!(placeholder_field("{$.event.}"), None);
        assert_eq!(placeholder_field("{$.event.a.b}"), None);
        assert_eq!(placeholder_field("{$.user.id}"), None);
        assert_eq!(placeholder_field("$.event.id"), None);
        assert_eq!(placeholder_field("{$.event.id"), None);
        assert_eq!(placeholder_field("id: {$.event.id}"), None);
        assert_eq!(placeholder_field(" {$.event.id}"), None);
        assert_eq!(placeholder_field(""), None);
    }

    #[test]
    fn test_render_replaces_placeholder_keeping_other_values() {
        let rendered = render(
            &json!({"id": "{$.event.user_id}", "n": 5}),
            &data(json!({"user_id": "42"})),
        );
        assert_eq!(rendered, json!({"id": "42", "n": 5}));
    }

    #[test]
    fn test_render_preserves_value_types() {
        let rendered = render(
            &json!({"age": "{$.event.age}", "tags": "{$.event.tags}", "meta": "{$.event.meta}", "ok": "{$.event.ok}"}),
            &data(json!({"age": 30, "tags": ["a", "b"], "meta": {"k": null}, "ok": false})),
        );
        assert_eq!(
            rendered,
            json!({"age": 30, "tags": ["a", "b"], "meta": {"k": null}, "ok": false})
        );
    }

    #[test]
    fn test_render_missing_field_is_literal() {
        let rendered = render(&json!("{$.event.missing}"), &Map::new());
        assert_eq!(rendered, json!("{$.event.missing}"));
    }

    #[test]
    fn test_render_nested_structures() {
        let template = json!({"a": ["x", "{$.event.f}"], "b": {"c": "{$.event.f}"}});
        let rendered = render(&template, &data(json!({"f": 7})));
        assert_eq!(rendered, json!({"a": ["x", 7], "b": {"c": 7}}));
    }

    #[test]
    fn test_render_does_not_resolve_invalid_paths() {
        let template = json!(["{$.event}", "{$.event.a.b}", "{$.data.a}", "hello {$.event.a}"]);
        let rendered = render(&template, &data(json!({"a": 1, "event": 2})));
        assert_eq!(rendered, template);
    }

    #[test]
    fn test_render_scalars_pass_through() {
        let d = data(json!({"x": 1}));
        assert_eq!(render(&json!(null), &d), json!(null));
        assert_eq!(render(&json!(1.5), &d), json!(1.5));
        assert_eq!(render(&json!(true), &d), json!(true));
        assert_eq!(render(&json!("plain"), &d), json!("plain"));
        assert_eq!(render(&json!([]), &d), json!([]));
    }

    #[test]
    fn test_render_preserves_key_order() {
        let template = json!({"z": 1, "a": "{$.event.v}", "m": 3});
        let rendered = render(&template, &data(json!({"v": 2})));
        let keys: Vec<&String> = rendered.as_object().unwrap().keys().collect();
        let expected: Vec<&String> = template.as_object().unwrap().keys().collect();
        assert_eq!(keys, expected);
    }
}
