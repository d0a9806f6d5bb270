//! Template instantiation helpers
//!
//! Templates are immutable; every entity works on its own clone. Point role
//! tokens inside template strings are replaced in one left-to-right pass
//! that always takes the longest role at the current position, so a role
//! that is a prefix of another (`ZoneAirFlow`, `ZoneAirFlowSetpoint`) can
//! never split the longer token, and replacement text is never re-scanned.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

/// Role token → resolved point name
#[derive(Debug, Clone)]
pub struct Substitution {
    /// Longest token first
    tokens: Vec<(String, String)>,
}

impl Substitution {
    pub fn new(mapping: &BTreeMap<String, String>) -> Self {
        let mut tokens: Vec<(String, String)> = mapping
            .iter()
            .filter(|(token, _)| !token.is_empty())
            .map(|(token, name)| (token.clone(), name.clone()))
            .collect();
        tokens.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
        Self { tokens }
    }

    pub fn apply(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;

        'scan: while let Some(ch) = rest.chars().next() {
            for (token, name) in &self.tokens {
                if let Some(after) = rest.strip_prefix(token.as_str()) {
                    out.push_str(name);
                    rest = after;
                    continue 'scan;
                }
            }
            out.push(ch);
            rest = &rest[ch.len_utf8()..];
        }
        out
    }

    /// Substitute inside every string of a value tree. Object keys are left
    /// untouched.
    pub fn apply_value(&self, value: &mut Value) {
        match value {
            Value::String(text) => *text = self.apply(text),
            Value::Array(items) => items.iter_mut().for_each(|item| self.apply_value(item)),
            Value::Object(map) => map.values_mut().for_each(|item| self.apply_value(item)),
            _ => {}
        }
    }
}

/// Clone of a template object; anything else starts from an empty object
pub fn instantiate(template: &Value) -> Map<String, Value> {
    match template {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    }
}

/// Top-level keys of `overlay` replace those of `base`
pub fn overlay(base: &mut Map<String, Value>, overlay: &Value) {
    if let Value::Object(entries) = overlay {
        for (key, value) in entries {
            base.insert(key.clone(), value.clone());
        }
    }
}

/// Remove an object member for editing; non-objects are replaced
pub fn take_object(map: &mut Map<String, Value>, key: &str) -> Map<String, Value> {
    match map.remove(key) {
        Some(Value::Object(inner)) => inner,
        _ => Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn substitution(pairs: &[(&str, &str)]) -> Substitution {
        let mapping: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Substitution::new(&mapping)
    }

    #[test]
    fn test_longest_token_wins() {
        let subst = substitution(&[
            ("ZoneAirFlow", "ZnAirFlow"),
            ("ZoneAirFlowSetpoint", "ZnAirFlowSp"),
        ]);
        assert_eq!(
            subst.apply("ZoneAirFlowSetpoint - ZoneAirFlow"),
            "ZnAirFlowSp - ZnAirFlow"
        );
        assert_eq!(
            subst.apply("ZoneAirFlowZoneAirFlowSetpoint"),
            "ZnAirFlowZnAirFlowSp"
        );
    }

    #[test]
    fn test_replacement_text_is_not_rescanned() {
        let subst = substitution(&[("ZoneTemp", "ZoneTempSp"), ("ZoneTempSp", "WRONG")]);
        assert_eq!(subst.apply("ZoneTemp > 3"), "ZoneTempSp > 3");
    }

    #[test]
    fn test_unicode_passthrough() {
        let subst = substitution(&[("Flow", "F")]);
        assert_eq!(subst.apply("Δ Flow °"), "Δ F °");
    }

    #[test]
    fn test_apply_value_recurses() {
        let subst = substitution(&[("ZoneTemp", "ZnT")]);
        let mut value = json!({
            "operation": "1/ZoneTemp",
            "operation_args": {"always": ["ZoneTemp"], "nc": ["x"]},
            "ZoneTemp": 3
        });
        subst.apply_value(&mut value);
        assert_eq!(
            value,
            json!({
                "operation": "1/ZnT",
                "operation_args": {"always": ["ZnT"], "nc": ["x"]},
                "ZoneTemp": 3
            })
        );
    }

    #[test]
    fn test_instances_are_independent() {
        let template = json!({"arguments": {"point_mapping": {}}});
        let mut first = instantiate(&template);
        first.insert("device".into(), json!("ahu1"));
        let second = instantiate(&template);
        assert!(second.get("device").is_none());
        assert_eq!(template, json!({"arguments": {"point_mapping": {}}}));
    }

    #[test]
    fn test_overlay_and_take_object() {
        let mut base = instantiate(&json!({"a": 1, "b": {"c": 2}}));
        overlay(&mut base, &json!({"b": 3, "d": 4}));
        assert_eq!(Value::Object(base.clone()), json!({"a": 1, "b": 3, "d": 4}));

        let taken = take_object(&mut base, "b");
        assert!(taken.is_empty());
        assert!(base.get("b").is_none());
    }
}
