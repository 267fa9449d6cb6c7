// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::error::EvalError;
use crate::number::Number;
use crate::Rc;

use core::cmp::Ordering;
use core::fmt;
use std::ops;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use indexmap::IndexMap;
use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

/// Attribute map. Keys are unique; iteration follows insertion order, which is
/// used for display only and never for equality.
pub type Map = IndexMap<Rc<str>, Value>;

/// A dynamically-typed configuration value.
///
/// `Undefined` is not a configuration value: it is the signal produced by
/// member or index access on something that does not exist. It is kept apart
/// from `Null` so that `has()` and `try()` can tell an explicit `null`
/// attribute from a missing one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(Number),
    String(Rc<str>),
    Array(Rc<Vec<Value>>),
    Object(Rc<Map>),

    // Indicate that a value is absent
    Undefined,
}

impl Value {
    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
            Value::Undefined => 6,
        }
    }
}

/// Values of different kinds are ordered null < bool < number < string <
/// list < map < absent. Maps compare by their entries in key order, so the
/// ordering agrees with the insertion-order-insensitive equality.
impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Number(a), Value::Number(b)) => a.cmp(b),
            (Value::String(a), Value::String(b)) => a.as_bytes().cmp(b.as_bytes()),
            (Value::Array(a), Value::Array(b)) => a.iter().cmp(b.iter()),
            (Value::Object(a), Value::Object(b)) => {
                let mut a: Vec<_> = a.iter().collect();
                let mut b: Vec<_> = b.iter().collect();
                a.sort_by(|x, y| x.0.cmp(y.0));
                b.sort_by(|x, y| x.0.cmp(y.0));
                a.cmp(&b)
            }
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::String(s) => serializer.serialize_str(s.as_ref()),
            Value::Number(n) => n.serialize(serializer),
            Value::Array(a) => a.serialize(serializer),
            Value::Object(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (k, v) in fields.iter() {
                    map.serialize_entry(k.as_ref(), v)?;
                }
                map.end()
            }

            // display absent as a special string
            Value::Undefined => serializer.serialize_str("<absent>"),
        }
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a value")
    }

    fn visit_unit<E>(self) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Value::Null)
    }

    fn visit_none<E>(self) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Value::Null)
    }

    fn visit_some<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(ValueVisitor)
    }

    fn visit_bool<E>(self, v: bool) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Value::Bool(v))
    }

    fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Value::from(v))
    }

    fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Value::from(v))
    }

    fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Value::from(v))
    }

    fn visit_str<E>(self, s: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Value::from(s))
    }

    fn visit_string<E>(self, s: String) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Value::from(s))
    }

    fn visit_seq<V>(self, mut visitor: V) -> Result<Self::Value, V::Error>
    where
        V: SeqAccess<'de>,
    {
        let mut arr = vec![];
        while let Some(v) = visitor.next_element()? {
            arr.push(v);
        }
        Ok(Value::from(arr))
    }

    fn visit_map<V>(self, mut visitor: V) -> Result<Self::Value, V::Error>
    where
        V: MapAccess<'de>,
    {
        let mut map = Map::new();
        while let Some((key, value)) = visitor.next_entry::<String, Value>()? {
            map.insert(key.into(), value);
        }
        Ok(Value::from(map))
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> Result<Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(ValueVisitor)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(s) => write!(f, "{s}"),
            Err(_e) => Err(fmt::Error),
        }
    }
}

impl Value {
    pub fn new_array() -> Value {
        Value::from(vec![])
    }

    pub fn from_json_str(json: &str) -> Result<Value> {
        Ok(serde_json::from_str(json)?)
    }

    #[cfg(feature = "yaml")]
    pub fn from_yaml_str(yaml: &str) -> Result<Value> {
        Ok(serde_yaml::from_str(yaml)?)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s.into())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(Number::from(n))
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::Number(Number::from(n))
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(Number::from(n))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(Number::from(n))
    }
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        Value::Number(n)
    }
}

impl From<Vec<Value>> for Value {
    fn from(a: Vec<Value>) -> Self {
        Value::Array(Rc::new(a))
    }
}

impl From<Map> for Value {
    fn from(m: Map) -> Self {
        Value::Object(Rc::new(m))
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Only `Bool(true)` is true. Non-empty strings, non-zero numbers and
    /// non-empty collections are not.
    pub fn is_true(&self) -> bool {
        matches!(self, Value::Bool(true))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "list",
            Value::Object(_) => "map",
            Value::Undefined => "absent",
        }
    }

    pub fn as_bool(&self) -> Result<&bool> {
        match self {
            Value::Bool(b) => Ok(b),
            _ => Err(anyhow!("not a bool")),
        }
    }

    pub fn as_string(&self) -> Result<&Rc<str>> {
        match self {
            Value::String(s) => Ok(s),
            _ => Err(anyhow!("not a string")),
        }
    }

    pub fn as_number(&self) -> Result<&Number> {
        match self {
            Value::Number(n) => Ok(n),
            _ => Err(anyhow!("not a number")),
        }
    }

    pub fn as_array(&self) -> Result<&Vec<Value>> {
        match self {
            Value::Array(a) => Ok(a),
            _ => Err(anyhow!("not a list")),
        }
    }

    pub fn as_object(&self) -> Result<&Map> {
        match self {
            Value::Object(m) => Ok(m),
            _ => Err(anyhow!("not a map")),
        }
    }

    /// Member access. Missing keys, and access on anything but a map, yield
    /// `Undefined` rather than an error.
    pub fn get(&self, key: &str) -> &Value {
        match self {
            Value::Object(m) => m.get(key).unwrap_or(&Value::Undefined),
            _ => &Value::Undefined,
        }
    }

    /// Whether `key` names a present member. A member explicitly set to
    /// `null` is present.
    pub fn has(&self, key: &Value) -> bool {
        !self[key].is_undefined()
    }
}

fn coercion_error(from: &Value, to: &'static str, detail: impl Into<String>) -> EvalError {
    EvalError::TypeCoercion {
        from: from.type_name().to_string(),
        to,
        detail: detail.into(),
    }
}

// Explicit conversions. These follow the configuration language's automatic
// conversion rules: numbers and bools convert to strings, strings convert
// back when they spell a number or bool, and nothing converts to or from a
// collection except another collection of the same kind.
impl Value {
    pub fn coerce_to_string(&self) -> Result<Rc<str>, EvalError> {
        match self {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.format_decimal().into()),
            Value::Bool(b) => Ok(b.to_string().into()),
            Value::Null => Err(coercion_error(self, "string", "null value")),
            Value::Undefined => Err(coercion_error(self, "string", "value is absent")),
            Value::Array(_) | Value::Object(_) => Err(coercion_error(
                self,
                "string",
                "string required, but a collection was given",
            )),
        }
    }

    pub fn coerce_to_number(&self) -> Result<Number, EvalError> {
        match self {
            Value::Number(n) => Ok(n.clone()),
            Value::String(s) => Number::from_str(s)
                .map_err(|_| coercion_error(self, "number", format!("`{s}` is not a number"))),
            _ => Err(coercion_error(self, "number", "number required")),
        }
    }

    pub fn coerce_to_bool(&self) -> Result<bool, EvalError> {
        match self {
            Value::Bool(b) => Ok(*b),
            Value::String(s) if s.as_ref() == "true" => Ok(true),
            Value::String(s) if s.as_ref() == "false" => Ok(false),
            Value::String(s) => Err(coercion_error(
                self,
                "bool",
                format!("`{s}` is not `true` or `false`"),
            )),
            _ => Err(coercion_error(self, "bool", "bool required")),
        }
    }

    pub fn coerce_to_list(&self) -> Result<Rc<Vec<Value>>, EvalError> {
        match self {
            Value::Array(a) => Ok(a.clone()),
            _ => Err(coercion_error(self, "list", "list or tuple required")),
        }
    }

    pub fn coerce_to_map(&self) -> Result<Rc<Map>, EvalError> {
        match self {
            Value::Object(m) => Ok(m.clone()),
            _ => Err(coercion_error(self, "map", "map or object required")),
        }
    }
}

impl ops::Index<usize> for Value {
    type Output = Value;

    fn index(&self, index: usize) -> &Self::Output {
        match self {
            Value::Array(a) if index < a.len() => &a[index],
            _ => &Value::Undefined,
        }
    }
}

impl ops::Index<&str> for Value {
    type Output = Value;

    fn index(&self, key: &str) -> &Self::Output {
        self.get(key)
    }
}

impl ops::Index<&Value> for Value {
    type Output = Value;

    fn index(&self, key: &Value) -> &Self::Output {
        match (self, key) {
            (Value::Object(o), Value::String(k)) => o.get(k.as_ref()).unwrap_or(&Value::Undefined),
            (Value::Object(o), Value::Number(n)) => o
                .get(n.format_decimal().as_str())
                .unwrap_or(&Value::Undefined),
            (Value::Array(a), Value::Number(n)) => match n.as_usize() {
                Some(index) if n.is_integer() && index < a.len() => &a[index],
                _ => &Value::Undefined,
            },
            (Value::Array(a), Value::String(s)) => match s.parse::<usize>() {
                Ok(index) if index < a.len() => &a[index],
                _ => &Value::Undefined,
            },
            _ => &Value::Undefined,
        }
    }
}
