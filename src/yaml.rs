//! Polymorphic YAML access.
//!
//! Manifest keys accept scalar-or-sequence-or-map shapes; these helpers are
//! total functions from that variant to the model and report shape
//! mismatches with the offending key named.

use std::collections::BTreeSet;

use serde_yaml::{Mapping, Value};

use crate::error::{Error, Result};

/// Render a YAML scalar back to its string form.
pub fn scalar_str(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub fn key_present(node: &Value, key: &str) -> bool {
    node.get(key).is_some()
}

/// Read `node[key]` as a scalar. Missing (or null) keys yield `None`;
/// sequences and maps are shape errors.
pub fn get_scalar(node: &Value, key: &str) -> Result<Option<String>> {
    match node.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => scalar_str(v)
            .map(Some)
            .ok_or_else(|| Error::Manifest(format!("'{}' should be a scalar", key))),
    }
}

/// Scalar-or-sequence polymorphism: a scalar is promoted to a
/// single-element sequence.
pub fn string_seq(v: &Value, key: &str) -> Result<Vec<String>> {
    match v {
        Value::Null => Ok(Vec::new()),
        Value::Sequence(items) => items
            .iter()
            .map(|item| {
                scalar_str(item)
                    .ok_or_else(|| Error::Manifest(format!("'{}' should contain scalars", key)))
            })
            .collect(),
        _ => match scalar_str(v) {
            Some(s) => Ok(vec![s]),
            None => Err(Error::Manifest(format!(
                "'{}' should be a scalar or a sequence",
                key
            ))),
        },
    }
}

pub fn get_string_seq(node: &Value, key: &str) -> Result<Vec<String>> {
    match node.get(key) {
        None => Ok(Vec::new()),
        Some(v) => string_seq(v, key),
    }
}

pub fn get_string_set(node: &Value, key: &str) -> Result<BTreeSet<String>> {
    Ok(get_string_seq(node, key)?.into_iter().collect())
}

/// Read `node[key]` as a map; scalars and sequences are shape errors.
pub fn get_map<'a>(node: &'a Value, key: &str) -> Result<Option<&'a Mapping>> {
    match node.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Mapping(m)) => Ok(Some(m)),
        Some(_) => Err(Error::Manifest(format!("'{}' should be a map", key))),
    }
}

/// The three shapes a polymorphic key may take.
pub enum Shape<'a> {
    Missing,
    Scalar(String),
    Sequence(&'a Vec<Value>),
    Map(&'a Mapping),
}

pub fn shape_of<'a>(node: &'a Value, key: &str) -> Result<Shape<'a>> {
    match node.get(key) {
        None | Some(Value::Null) => Ok(Shape::Missing),
        Some(Value::Sequence(s)) => Ok(Shape::Sequence(s)),
        Some(Value::Mapping(m)) => Ok(Shape::Map(m)),
        Some(v) => match scalar_str(v) {
            Some(s) => Ok(Shape::Scalar(s)),
            None => Err(Error::Manifest(format!(
                "'{}' should be a scalar, a sequence, or a map",
                key
            ))),
        },
    }
}

/// Map keys are scalars in every manifest shape.
pub fn key_string(k: &Value, context: &str) -> Result<String> {
    scalar_str(k).ok_or_else(|| Error::Manifest(format!("keys of '{}' should be scalars", context)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(s: &str) -> Value {
        serde_yaml::from_str(s).unwrap()
    }

    #[test]
    fn test_scalar_access() {
        let d = doc("name: boost\ncount: 3\nflag: true\n");
        assert_eq!(get_scalar(&d, "name").unwrap().unwrap(), "boost");
        assert_eq!(get_scalar(&d, "count").unwrap().unwrap(), "3");
        assert_eq!(get_scalar(&d, "flag").unwrap().unwrap(), "true");
        assert!(get_scalar(&d, "missing").unwrap().is_none());

        let d = doc("name:\n  - a\n");
        assert!(get_scalar(&d, "name").is_err());
    }

    #[test]
    fn test_scalar_promoted_to_sequence() {
        let d = doc("files: src/lib.cpp\n");
        assert_eq!(get_string_seq(&d, "files").unwrap(), vec!["src/lib.cpp"]);

        let d = doc("files:\n  - a.cpp\n  - b.cpp\n");
        assert_eq!(get_string_seq(&d, "files").unwrap(), vec!["a.cpp", "b.cpp"]);

        let d = doc("files:\n  a: b\n");
        assert!(string_seq(d.get("files").unwrap(), "files").is_err());
    }

    #[test]
    fn test_map_shape_errors() {
        let d = doc("proxy: somewhere\n");
        assert!(get_map(&d, "proxy").is_err());

        let d = doc("proxy:\n  host: h\n");
        assert!(get_map(&d, "proxy").unwrap().is_some());
        assert!(get_map(&d, "absent").unwrap().is_none());
    }

    #[test]
    fn test_shape_of() {
        let d = doc("a: x\nb:\n  - y\nc:\n  k: v\nd:\n");
        assert!(matches!(shape_of(&d, "a").unwrap(), Shape::Scalar(s) if s == "x"));
        assert!(matches!(shape_of(&d, "b").unwrap(), Shape::Sequence(_)));
        assert!(matches!(shape_of(&d, "c").unwrap(), Shape::Map(_)));
        assert!(matches!(shape_of(&d, "d").unwrap(), Shape::Missing));
        assert!(matches!(shape_of(&d, "e").unwrap(), Shape::Missing));
    }
}
