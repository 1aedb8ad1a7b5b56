//! Payload value model.
//!
//! Every stored payload is a [`Value`]: a closed recursive tree of mappings,
//! sequences and scalars. The text form is plain JSON; the derived serde
//! representation is externally tagged and is only used by the binary
//! fallback codec, because it can also carry byte strings and non-finite
//! floats.

use std::collections::BTreeMap;
use std::ops::ControlFlow;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A stored payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Seq(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

/// A string reachable from a payload, handed to [`Value::walk_strings`] handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leaf<'a> {
    /// A mapping key.
    Key(&'a str),
    /// A string scalar.
    Str(&'a str),
}

impl<'a> Leaf<'a> {
    pub fn as_str(&self) -> &'a str {
        match self {
            Leaf::Key(s) | Leaf::Str(s) => s,
        }
    }
}

impl Value {
    /// Name of the value kind, used as the default long-term `type`.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Seq(_) => "sequence",
            Value::Map(_) => "mapping",
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Look up a field of a mapping payload.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.as_map().and_then(|map| map.get(field))
    }

    /// Whether the value survives a JSON round trip unchanged.
    ///
    /// Byte strings and NaN/infinite floats have no JSON form.
    pub fn is_text_representable(&self) -> bool {
        match self {
            Value::Bytes(_) => false,
            Value::Float(f) => f.is_finite(),
            Value::Seq(items) => items.iter().all(Value::is_text_representable),
            Value::Map(map) => map.values().all(Value::is_text_representable),
            _ => true,
        }
    }

    /// Walk every mapping key and string scalar reachable from this value,
    /// depth first, in mapping-key order.
    ///
    /// The handler can stop the walk early by returning `ControlFlow::Break`.
    pub fn walk_strings<'a, F>(&'a self, handler: &mut F) -> ControlFlow<()>
    where
        F: FnMut(Leaf<'a>) -> ControlFlow<()>,
    {
        match self {
            Value::Str(s) => handler(Leaf::Str(s)),
            Value::Seq(items) => {
                for item in items {
                    item.walk_strings(handler)?;
                }
                ControlFlow::Continue(())
            }
            Value::Map(map) => {
                for (key, value) in map {
                    handler(Leaf::Key(key))?;
                    value.walk_strings(handler)?;
                }
                ControlFlow::Continue(())
            }
            _ => ControlFlow::Continue(()),
        }
    }

    /// Convert from JSON, rejecting integers that do not fit in an `i64`.
    pub fn from_json_exact(json: serde_json::Value) -> Result<Self> {
        match json {
            serde_json::Value::Number(n) if n.is_u64() && n.as_i64().is_none() => Err(Error::validation(
                format!("integer {} is outside the 64-bit signed range", n),
            )),
            serde_json::Value::Array(items) => Ok(Value::Seq(
                items.into_iter().map(Value::from_json_exact).collect::<Result<_>>()?,
            )),
            serde_json::Value::Object(object) => Ok(Value::Map(
                object
                    .into_iter()
                    .map(|(k, v)| Ok((k, Value::from_json_exact(v)?)))
                    .collect::<Result<_>>()?,
            )),
            other => Ok(Value::from(other)),
        }
    }

    /// Convert to JSON, or `None` if the value is not text-representable.
    pub fn to_json(&self) -> Option<serde_json::Value> {
        Some(match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Value::Number(serde_json::Number::from_f64(*f)?),
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::Bytes(_) => return None,
            Value::Seq(items) => serde_json::Value::Array(
                items.iter().map(Value::to_json).collect::<Option<Vec<_>>>()?,
            ),
            Value::Map(map) => {
                let mut object = serde_json::Map::new();
                for (key, value) in map {
                    object.insert(key.clone(), value.to_json()?);
                }
                serde_json::Value::Object(object)
            }
        })
    }
}

/// Integers beyond the `i64` range become floats and may lose precision;
/// [`Value::from_json_exact`] rejects them instead.
impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => Value::Seq(items.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(object) => {
                Value::Map(object.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Value::Bytes(bytes)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Seq(items)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Value::Map(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_conversion_keeps_number_kinds() {
        let value = Value::from(json!({"count": 3, "ratio": 2.0, "tags": ["a", null, true]}));
        assert_eq!(value.get("count"), Some(&Value::Int(3)));
        assert_eq!(value.get("ratio"), Some(&Value::Float(2.0)));
        assert_eq!(Value::from(value.to_json().unwrap()), value);
    }

    #[test]
    fn test_from_json_exact_rejects_wide_integers() {
        let wide = json!({"id": u64::MAX, "nested": [i64::MAX]});
        assert!(Value::from_json_exact(wide.clone()).unwrap_err().is_validation());
        assert!(matches!(Value::from(wide).get("id"), Some(Value::Float(_))));

        let fits = json!({"id": i64::MAX, "neg": i64::MIN, "ratio": 0.5});
        assert_eq!(Value::from_json_exact(fits.clone()).unwrap(), Value::from(fits));
    }

    #[test]
    fn test_text_representable() {
        assert!(Value::from(json!({"a": [1, "x"]})).is_text_representable());
        assert!(!Value::Bytes(vec![1, 2]).is_text_representable());
        assert!(!Value::Seq(vec![Value::Float(f64::INFINITY)]).is_text_representable());
        assert!(Value::Bytes(vec![0]).to_json().is_none());
    }

    #[test]
    fn test_walk_strings_visits_keys_and_leaves() {
        let value = Value::from(json!({"user": {"name": "ada"}, "notes": ["x y", 4]}));
        let mut seen = Vec::new();
        let _ = value.walk_strings(&mut |leaf| {
            seen.push(leaf);
            ControlFlow::Continue(())
        });
        assert_eq!(
            seen,
            vec![
                Leaf::Key("notes"),
                Leaf::Str("x y"),
                Leaf::Key("user"),
                Leaf::Key("name"),
                Leaf::Str("ada"),
            ]
        );
    }

    #[test]
    fn test_walk_strings_stops_early() {
        let value = Value::from(json!(["first", "second", "third"]));
        let mut count = 0;
        let flow = value.walk_strings(&mut |_| {
            count += 1;
            if count == 2 { ControlFlow::Break(()) } else { ControlFlow::Continue(()) }
        });
        assert!(flow.is_break());
        assert_eq!(count, 2);
    }
}
