//! Payload filter - Qdrant filter JSON
//!
//! The remote client sends the filter through unmodified. The local store
//! evaluates this subset itself:
//! - clauses: `must`, `should`, `must_not`, `min_should`
//! - conditions: `{key, match: {value | any | except | text}}`,
//!   `{key, range: {gt, gte, lt, lte}}`, `{is_empty: {key}}`,
//!   `{is_null: {key}}`, `{has_id: [...]}`, nested filters
//!
//! Keys are dotted payload paths (`metadata.type`); array fields match when
//! any element matches.

use serde::Serialize;
use serde_json::{Map, Value};

use super::Payload;
use crate::error::{NotesError, Result};

const CLAUSES: [&str; 4] = ["must", "should", "must_not", "min_should"];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Filter(Value);

impl Filter {
    /// Accept a filter object whose every clause and condition has a known shape
    pub fn from_json(value: Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| NotesError::invalid("query_filter must be a JSON object"))?;
        check_filter(obj)?;
        Ok(Self(value))
    }

    pub fn as_json(&self) -> &Value {
        &self.0
    }

    /// Evaluate against one point
    pub fn matches(&self, id: &str, payload: &Payload) -> Result<bool> {
        match &self.0 {
            Value::Object(obj) => eval_filter(obj, id, payload),
            _ => Err(NotesError::invalid("query_filter must be a JSON object")),
        }
    }
}

fn check_filter(filter: &Map<String, Value>) -> Result<()> {
    if let Some(unknown) = filter.keys().find(|k| !CLAUSES.contains(&k.as_str())) {
        return Err(NotesError::invalid(format!(
            "unknown filter clause '{}': expected one of {}",
            unknown,
            CLAUSES.join(", ")
        )));
    }

    for clause in ["must", "should", "must_not"] {
        if let Some(value) = filter.get(clause) {
            for cond in conditions(value) {
                check_condition(cond)?;
            }
        }
    }

    if let Some(min_should) = filter.get("min_should") {
        min_should
            .get("min_count")
            .and_then(Value::as_u64)
            .ok_or_else(|| NotesError::invalid("min_should requires an integer min_count"))?;
        for cond in min_should.get("conditions").map(conditions).unwrap_or_default() {
            check_condition(cond)?;
        }
    }

    Ok(())
}

fn check_condition(cond: &Value) -> Result<()> {
    let obj = cond
        .as_object()
        .ok_or_else(|| NotesError::invalid(format!("filter condition must be an object: {}", cond)))?;

    if obj.keys().any(|k| CLAUSES.contains(&k.as_str())) {
        return check_filter(obj);
    }

    if let Some(ids) = obj.get("has_id") {
        let ids = ids
            .as_array()
            .ok_or_else(|| NotesError::invalid("has_id must be a list of ids"))?;
        if ids.iter().any(|v| id_string(v).is_none()) {
            return Err(NotesError::invalid("has_id entries must be strings or integers"));
        }
        return Ok(());
    }

    if let Some(inner) = obj.get("is_empty").or_else(|| obj.get("is_null")) {
        return condition_key(inner).map(|_| ());
    }

    condition_key(cond)?;
    if let Some(m) = obj.get("match") {
        return check_match(m);
    }
    if let Some(range) = obj.get("range") {
        return range_bounds(range).map(|_| ());
    }

    Err(NotesError::invalid(format!("unsupported filter condition: {}", cond)))
}

fn check_match(m: &Value) -> Result<()> {
    if m.get("value").is_some() {
        return Ok(());
    }
    for list in ["any", "except"] {
        if let Some(values) = m.get(list) {
            return match values {
                Value::Array(_) => Ok(()),
                _ => Err(NotesError::invalid(format!("match.{} must be a list", list))),
            };
        }
    }
    if m.get("text").map_or(false, Value::is_string) {
        return Ok(());
    }
    Err(NotesError::invalid(format!("unsupported match condition: {}", m)))
}

fn eval_filter(filter: &Map<String, Value>, id: &str, payload: &Payload) -> Result<bool> {
    if let Some(must) = filter.get("must") {
        for cond in conditions(must) {
            if !eval_condition(cond, id, payload)? {
                return Ok(false);
            }
        }
    }

    if let Some(must_not) = filter.get("must_not") {
        for cond in conditions(must_not) {
            if eval_condition(cond, id, payload)? {
                return Ok(false);
            }
        }
    }

    if let Some(should) = filter.get("should") {
        let should = conditions(should);
        if !should.is_empty() {
            let mut any = false;
            for cond in should {
                if eval_condition(cond, id, payload)? {
                    any = true;
                    break;
                }
            }
            if !any {
                return Ok(false);
            }
        }
    }

    if let Some(min_should) = filter.get("min_should") {
        let min_count = min_should
            .get("min_count")
            .and_then(Value::as_u64)
            .ok_or_else(|| NotesError::invalid("min_should requires an integer min_count"))?;
        let mut hits = 0u64;
        for cond in min_should.get("conditions").map(conditions).unwrap_or_default() {
            if eval_condition(cond, id, payload)? {
                hits += 1;
            }
        }
        if hits < min_count {
            return Ok(false);
        }
    }

    Ok(true)
}

/// Clause value: a single condition or a list of them
fn conditions(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

fn eval_condition(cond: &Value, id: &str, payload: &Payload) -> Result<bool> {
    let obj = cond
        .as_object()
        .ok_or_else(|| NotesError::invalid(format!("filter condition must be an object: {}", cond)))?;

    if obj.keys().any(|k| CLAUSES.contains(&k.as_str())) {
        return eval_filter(obj, id, payload);
    }

    if let Some(ids) = obj.get("has_id") {
        let ids = ids
            .as_array()
            .ok_or_else(|| NotesError::invalid("has_id must be a list of ids"))?;
        return Ok(ids.iter().any(|v| id_string(v).as_deref() == Some(id)));
    }

    if let Some(inner) = obj.get("is_empty") {
        let key = condition_key(inner)?;
        let values = values_at(payload, key);
        return Ok(values.iter().all(|v| v.is_null()));
    }

    if let Some(inner) = obj.get("is_null") {
        let key = condition_key(inner)?;
        return Ok(raw_value_at(payload, key).map(Value::is_null).unwrap_or(false));
    }

    let key = condition_key(cond)?;
    let values = values_at(payload, key);

    if let Some(m) = obj.get("match") {
        return eval_match(m, &values);
    }

    if let Some(range) = obj.get("range") {
        return eval_range(range, &values);
    }

    Err(NotesError::invalid(format!("unsupported filter condition: {}", cond)))
}

fn condition_key(obj: &Value) -> Result<&str> {
    obj.get("key")
        .and_then(Value::as_str)
        .ok_or_else(|| NotesError::invalid(format!("filter condition missing 'key': {}", obj)))
}

fn eval_match(m: &Value, values: &[&Value]) -> Result<bool> {
    if let Some(expected) = m.get("value") {
        return Ok(values.iter().any(|v| *v == expected));
    }

    if let Some(any) = m.get("any") {
        let any = any
            .as_array()
            .ok_or_else(|| NotesError::invalid("match.any must be a list"))?;
        return Ok(values.iter().any(|v| any.contains(*v)));
    }

    if let Some(except) = m.get("except") {
        let except = except
            .as_array()
            .ok_or_else(|| NotesError::invalid("match.except must be a list"))?;
        return Ok(!values.is_empty() && values.iter().all(|v| !except.contains(*v)));
    }

    if let Some(text) = m.get("text").and_then(Value::as_str) {
        let needle = text.to_lowercase();
        return Ok(values
            .iter()
            .filter_map(|v| v.as_str())
            .any(|s| s.to_lowercase().contains(&needle)));
    }

    Err(NotesError::invalid(format!("unsupported match condition: {}", m)))
}

type Bounds = (Option<f64>, Option<f64>, Option<f64>, Option<f64>);

/// `(gt, gte, lt, lte)`
fn range_bounds(range: &Value) -> Result<Bounds> {
    if !range.is_object() {
        return Err(NotesError::invalid(format!("range must be an object: {}", range)));
    }
    let bound = |name: &str| -> Result<Option<f64>> {
        match range.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => v
                .as_f64()
                .map(Some)
                .ok_or_else(|| NotesError::invalid(format!("range.{} must be a number", name))),
        }
    };
    Ok((bound("gt")?, bound("gte")?, bound("lt")?, bound("lte")?))
}

fn eval_range(range: &Value, values: &[&Value]) -> Result<bool> {
    let (gt, gte, lt, lte) = range_bounds(range)?;

    Ok(values.iter().filter_map(|v| v.as_f64()).any(|x| {
        gt.map_or(true, |b| x > b)
            && gte.map_or(true, |b| x >= b)
            && lt.map_or(true, |b| x < b)
            && lte.map_or(true, |b| x <= b)
    }))
}

/// Value at a dotted path, without array flattening
fn raw_value_at<'a>(payload: &'a Payload, key: &str) -> Option<&'a Value> {
    let mut parts = key.split('.').map(|p| p.trim_end_matches("[]"));
    let mut current = payload.get(parts.next()?)?;
    for part in parts {
        current = current.get(part)?;
    }
    Some(current)
}

/// Leaf values at a dotted path; arrays along the path fan out
fn values_at<'a>(payload: &'a Payload, key: &str) -> Vec<&'a Value> {
    let mut current: Vec<&Value> = Vec::new();
    let mut parts = key.split('.').map(|p| p.trim_end_matches("[]"));

    if let Some(first) = parts.next() {
        if let Some(v) = payload.get(first) {
            current.push(v);
        }
    }

    for part in parts {
        current = current
            .into_iter()
            .flat_map(|v| match v {
                Value::Array(items) => items
                    .iter()
                    .filter_map(|i| i.get(part))
                    .collect::<Vec<_>>(),
                other => other.get(part).into_iter().collect::<Vec<_>>(),
            })
            .collect();
    }

    current
        .into_iter()
        .flat_map(|v| match v {
            Value::Array(items) => items.iter().collect::<Vec<_>>(),
            other => vec![other],
        })
        .collect()
}

fn id_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload() -> Payload {
        json!({
            "document": "cargo build --release",
            "metadata": {
                "type": "cli",
                "tags": ["rust", "build"],
                "language": "bash",
                "stars": 4
            }
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    fn check(filter: Value) -> bool {
        Filter::from_json(filter).unwrap().matches("p1", &payload()).unwrap()
    }

    #[test]
    fn test_match_value_and_array_fields() {
        assert!(check(json!({"must": [{"key": "metadata.type", "match": {"value": "cli"}}]})));
        assert!(!check(json!({"must": [{"key": "metadata.type", "match": {"value": "api"}}]})));
        assert!(check(json!({"must": {"key": "metadata.tags", "match": {"value": "rust"}}})));
        assert!(check(json!({"must": {"key": "metadata.tags[]", "match": {"value": "build"}}})));
    }

    #[test]
    fn test_match_any_except_text() {
        assert!(check(json!({"must": [{"key": "metadata.type", "match": {"any": ["api", "cli"]}}]})));
        assert!(!check(json!({"must": [{"key": "metadata.type", "match": {"except": ["cli"]}}]})));
        assert!(check(json!({"must": [{"key": "metadata.language", "match": {"except": ["python"]}}]})));
        assert!(check(json!({"must": [{"key": "document", "match": {"text": "RELEASE"}}]})));
    }

    #[test]
    fn test_range() {
        assert!(check(json!({"must": [{"key": "metadata.stars", "range": {"gte": 4, "lt": 5}}]})));
        assert!(!check(json!({"must": [{"key": "metadata.stars", "range": {"gt": 4}}]})));
    }

    #[test]
    fn test_should_and_must_not() {
        assert!(check(json!({
            "should": [
                {"key": "metadata.type", "match": {"value": "api"}},
                {"key": "metadata.tags", "match": {"value": "rust"}}
            ]
        })));
        assert!(!check(json!({"must_not": [{"key": "metadata.language", "match": {"value": "bash"}}]})));
    }

    #[test]
    fn test_has_id_and_is_empty() {
        assert!(check(json!({"must": [{"has_id": ["p0", "p1"]}]})));
        assert!(!check(json!({"must": [{"has_id": [7]}]})));
        assert!(check(json!({"must": [{"is_empty": {"key": "metadata.source"}}]})));
        assert!(!check(json!({"must": [{"is_empty": {"key": "metadata.tags"}}]})));
    }

    #[test]
    fn test_nested_and_min_should() {
        assert!(check(json!({
            "must": [{"must_not": [{"key": "metadata.type", "match": {"value": "api"}}]}]
        })));
        assert!(!check(json!({
            "min_should": {
                "conditions": [
                    {"key": "metadata.type", "match": {"value": "cli"}},
                    {"key": "metadata.language", "match": {"value": "rust"}}
                ],
                "min_count": 2
            }
        })));
    }

    #[test]
    fn test_rejects_malformed_filters() {
        assert!(Filter::from_json(json!(["must"])).is_err());
        assert_eq!(
            Filter::from_json(json!({"where": {}})).unwrap_err().kind(),
            "InvalidArgument"
        );

    }

    #[test]
    fn test_rejects_bad_conditions_at_parse_time() {
        for bad in [
            json!({"must": [{"bogus": 1}]}),
            json!({"must": [{"key": "metadata.type", "geo_radius": {}}]}),
            json!({"should": {"match": {"value": "cli"}}}),
            json!({"must_not": [{"key": "metadata.type", "match": {"any": "cli"}}]}),
            json!({"must": [{"key": "metadata.stars", "range": {"gt": "four"}}]}),
            json!({"must": [{"must": [{"key": "metadata.type", "match": {"fuzzy": "c"}}]}]}),
            json!({"min_should": {"conditions": [], "min_count": "two"}}),
            json!({"must": [{"has_id": [{"id": 1}]}]}),
            json!({"must": [{"is_empty": {}}]}),
            json!({"must": ["metadata.type"]}),
        ] {
            let err = Filter::from_json(bad.clone()).unwrap_err();
            assert_eq!(err.kind(), "InvalidArgument", "{} should be rejected", bad);
        }

        // A failing first condition must not hide a malformed later one
        assert!(Filter::from_json(json!({
            "must": [
                {"key": "metadata.type", "match": {"value": "api"}},
                {"key": "metadata.type", "wildcard": "*"}
            ]
        }))
        .is_err());
    }
}
