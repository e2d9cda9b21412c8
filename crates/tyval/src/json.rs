//! # JSON Encoding
//!
//! The self-describing text encoding of values.
//!
//! ## Invariants
//! - **Checked decoding**: the input's shape is inferable on its own, but the
//!   result is always validated against the wanted type.
//! - **Dynamic wrapper**: a value encoded against `Dynamic` is written as
//!   `{"type": ..., "value": ...}` so the reader can recover its type.
//! - **Known only**: unknown values have no JSON form.

use std::collections::BTreeMap;

use serde_json::Value as Json;

use crate::MAX_RECURSION_DEPTH;
use crate::error::Error;
use crate::error::Path;
use crate::error::Result;
use crate::types::Type;
use crate::value::Number;
use crate::value::Value;
use crate::value::settle_element_type;

/// Encodes `val`, which must conform to `ty`, as JSON.
pub fn marshal(val: &Value, ty: &Type) -> Result<Vec<u8>> {
    if !val.conforms_to(ty) {
        return Err(Error::TypeMismatch {
            path: Path::root(),
            expected: ty.friendly_name(),
            found: val.ty().friendly_name(),
        });
    }
    let json = encode_impl(val, ty, &Path::root(), 0)?;
    serde_json::to_vec(&json).map_err(|e| Error::Write(e.to_string()))
}

fn encode_impl(val: &Value, ty: &Type, path: &Path, depth: usize) -> Result<Json> {
    if depth > MAX_RECURSION_DEPTH {
        return Err(Error::RecursionLimitExceeded);
    }

    let val_ty = val.ty();
    if ty.is_dynamic() && !val_ty.is_dynamic() {
        let mut wrapper = serde_json::Map::new();
        wrapper.insert("type".into(), val_ty.to_json()?);
        wrapper.insert("value".into(), encode_impl(val, &val_ty, path, depth + 1)?);
        return Ok(Json::Object(wrapper));
    }

    match val {
        Value::Unknown { .. } => Err(Error::UnknownValue(path.clone())),
        Value::Null(_) => Ok(Json::Null),
        Value::Bool(b) => Ok(Json::Bool(*b)),
        Value::Number(n) => number_to_json(*n, path),
        Value::String(s) => Ok(Json::String(s.clone())),
        Value::List { element, items } | Value::Set { element, items } => {
            let want = ty.element_type().unwrap_or(element);
            let mut out = Vec::with_capacity(items.len());
            for (idx, item) in items.iter().enumerate() {
                out.push(encode_impl(item, want, &path.index(idx), depth + 1)?);
            }
            Ok(Json::Array(out))
        }
        Value::Tuple(items) => {
            let mut out = Vec::with_capacity(items.len());
            for (idx, item) in items.iter().enumerate() {
                let want = match ty {
                    Type::Tuple(types) => types.get(idx).cloned().unwrap_or_else(|| item.ty()),
                    _ => item.ty(),
                };
                out.push(encode_impl(item, &want, &path.index(idx), depth + 1)?);
            }
            Ok(Json::Array(out))
        }
        Value::Map { element, entries } => {
            let want = ty.element_type().unwrap_or(element);
            let mut out = serde_json::Map::new();
            for (key, item) in entries {
                out.insert(key.clone(), encode_impl(item, want, &path.key(key), depth + 1)?);
            }
            Ok(Json::Object(out))
        }
        Value::Object(attrs) => {
            let mut out = serde_json::Map::new();
            for (name, item) in attrs {
                let want = match ty {
                    Type::Object(types) => types.get(name).cloned().unwrap_or_else(|| item.ty()),
                    _ => item.ty(),
                };
                out.insert(name.clone(), encode_impl(item, &want, &path.attr(name), depth + 1)?);
            }
            Ok(Json::Object(out))
        }
    }
}

fn number_to_json(n: Number, path: &Path) -> Result<Json> {
    match n {
        Number::Int(i) => Ok(Json::from(i)),
        Number::Float(f) => serde_json::Number::from_f64(f)
            .map(Json::Number)
            .ok_or_else(|| Error::InvalidNumber { path: path.clone(), detail: format!("{} has no JSON form", f) }),
    }
}

/// Decodes JSON bytes into a value of type `ty`.
pub fn unmarshal(bytes: &[u8], ty: &Type) -> Result<Value> {
    let json: Json = serde_json::from_slice(bytes).map_err(|e| Error::Syntax(e.to_string()))?;
    decode_impl(&json, ty, &Path::root(), 0)
}

fn decode_impl(json: &Json, ty: &Type, path: &Path, depth: usize) -> Result<Value> {
    if depth > MAX_RECURSION_DEPTH {
        return Err(Error::RecursionLimitExceeded);
    }

    if json.is_null() {
        return Ok(Value::Null(ty.clone()));
    }

    match ty {
        Type::Bool => match json {
            Json::Bool(b) => Ok(Value::Bool(*b)),
            Json::String(s) if s == "true" => Ok(Value::Bool(true)),
            Json::String(s) if s == "false" => Ok(Value::Bool(false)),
            other => Err(mismatch(path, ty, other)),
        },
        Type::Number => match json {
            Json::Number(n) => number_from_json(n, path).map(Value::Number),
            Json::String(s) => Number::parse(s)
                .map(Value::Number)
                .ok_or_else(|| Error::InvalidNumber { path: path.clone(), detail: format!("{:?} is not a number", s) }),
            other => Err(mismatch(path, ty, other)),
        },
        Type::String => match json {
            Json::String(s) => Ok(Value::String(s.clone())),
            Json::Number(n) => Ok(Value::String(n.to_string())),
            Json::Bool(b) => Ok(Value::String(b.to_string())),
            other => Err(mismatch(path, ty, other)),
        },
        Type::List(element) | Type::Set(element) => {
            let Json::Array(items) = json else {
                return Err(mismatch(path, ty, json));
            };
            let mut vals = Vec::with_capacity(items.len());
            for (idx, item) in items.iter().enumerate() {
                vals.push(decode_impl(item, element, &path.index(idx), depth + 1)?);
            }
            let element = settle_element_type(element, &vals, path)?;
            match ty {
                Type::Set(_) => Ok(Value::set(element, vals)),
                _ => Ok(Value::list(element, vals)),
            }
        }
        Type::Map(element) => {
            let Json::Object(items) = json else {
                return Err(mismatch(path, ty, json));
            };
            let mut entries = BTreeMap::new();
            for (key, item) in items {
                entries.insert(key.clone(), decode_impl(item, element, &path.key(key), depth + 1)?);
            }
            let element = settle_element_type(element, entries.values(), path)?;
            Ok(Value::map(element, entries))
        }
        Type::Object(attr_types) => {
            let Json::Object(items) = json else {
                return Err(mismatch(path, ty, json));
            };
            let mut attrs = BTreeMap::new();
            for (name, item) in items {
                let attr_ty = attr_types
                    .get(name)
                    .ok_or_else(|| Error::UnsupportedAttribute { path: path.clone(), name: name.clone() })?;
                attrs.insert(name.clone(), decode_impl(item, attr_ty, &path.attr(name), depth + 1)?);
            }
            for (name, attr_ty) in attr_types {
                attrs.entry(name.clone()).or_insert_with(|| Value::Null(attr_ty.clone()));
            }
            Ok(Value::Object(attrs))
        }
        Type::Tuple(types) => {
            let Json::Array(items) = json else {
                return Err(mismatch(path, ty, json));
            };
            if items.len() != types.len() {
                return Err(Error::TupleLength { path: path.clone(), expected: types.len(), found: items.len() });
            }
            let mut vals = Vec::with_capacity(items.len());
            for (idx, (item, item_ty)) in items.iter().zip(types).enumerate() {
                vals.push(decode_impl(item, item_ty, &path.index(idx), depth + 1)?);
            }
            Ok(Value::Tuple(vals))
        }
        Type::Dynamic => {
            let Json::Object(wrapper) = json else {
                return Err(mismatch(path, ty, json));
            };
            let (Some(raw_ty), Some(raw_val)) = (wrapper.get("type"), wrapper.get("value")) else {
                return Err(Error::TypeMismatch {
                    path: path.clone(),
                    expected: "object with \"type\" and \"value\"".into(),
                    found: "object".into(),
                });
            };
            let actual = Type::from_json(raw_ty)?;
            decode_impl(raw_val, &actual, path, depth + 1)
        }
        Type::Capsule(_) => Err(Error::UnsupportedType(ty.friendly_name())),
    }
}

fn number_from_json(n: &serde_json::Number, path: &Path) -> Result<Number> {
    if let Some(i) = n.as_i64() {
        return Ok(Number::Int(i));
    }
    if let Some(u) = n.as_u64() {
        return Ok(Number::from_u64(u));
    }
    n.as_f64()
        .and_then(Number::from_f64)
        .ok_or_else(|| Error::InvalidNumber { path: path.clone(), detail: n.to_string() })
}

fn mismatch(path: &Path, want: &Type, found: &Json) -> Error {
    Error::TypeMismatch {
        path: path.clone(),
        expected: want.friendly_name(),
        found: json_kind(found).into(),
    }
}

fn json_kind(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "bool",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}
