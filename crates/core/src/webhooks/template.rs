//! `${pactbroker.<name>}` placeholder substitution.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::verifications::encode_segment;

const OPEN: &str = "${pactbroker.";

/// Replace every `${pactbroker.<name>}` in `template` with `vars[name]`.
///
/// Unknown names are left in place.
pub fn render(template: &str, vars: &BTreeMap<String, String>) -> String {
    render_with(template, vars, |_, value| value.to_string())
}

/// [`render`] for a URL. Values are percent-encoded as path segments,
/// except URL-valued variables (names ending in `Url`), which are inserted
/// as they are.
pub fn render_url(template: &str, vars: &BTreeMap<String, String>) -> String {
    render_with(template, vars, |name, value| {
        if name.ends_with("Url") {
            value.to_string()
        } else {
            encode_segment(value)
        }
    })
}

fn render_with(
    template: &str,
    vars: &BTreeMap<String, String>,
    substitute: impl Fn(&str, &str) -> String,
) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find(OPEN) {
        out.push_str(&rest[..start]);
        let after = &rest[start + OPEN.len()..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let name = &after[..end];
        match vars.get(name) {
            Some(value) => out.push_str(&substitute(name, value)),
            None => out.push_str(&rest[start..start + OPEN.len() + end + 1]),
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}

/// Render every string (keys excluded) inside a JSON value.
pub fn render_value(value: &Value, vars: &BTreeMap<String, String>) -> Value {
    match value {
        Value::String(s) => Value::String(render(s, vars)),
        Value::Array(items) => Value::Array(items.iter().map(|v| render_value(v, vars)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), render_value(v, vars)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// `consumer_version_number` -> `consumerVersionNumber`.
pub(crate) fn camel_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper = false;
    for c in key.chars() {
        if c == '_' {
            upper = !out.is_empty();
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}
