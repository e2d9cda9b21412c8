//! # MessagePack Encoding
//!
//! The compact binary encoding of values.
//!
//! ## Invariants
//! - **Typed decoding**: the bytes carry no type information of their own, so
//!   decoding always needs the wanted type and is strict about primitive kinds.
//! - **Dynamic wrapper**: a value encoded against `Dynamic` is written as the
//!   2-array `[bin(type JSON), value]`.
//! - **Unknowns**: extension type 0 marks an unknown value; extension type 12
//!   marks an unknown value with refinements (`{1: false}` means "not null").

use std::collections::BTreeMap;

use rmpv::Value as Mp;

use crate::MAX_RECURSION_DEPTH;
use crate::error::Error;
use crate::error::Path;
use crate::error::Result;
use crate::types::Type;
use crate::value::Number;
use crate::value::Value;
use crate::value::settle_element_type;

const UNKNOWN_EXT: i8 = 0;
const UNKNOWN_REFINED_EXT: i8 = 12;
const REFINEMENT_NULLNESS: i64 = 1;

/// Encodes `val`, which must conform to `ty`, as MessagePack.
pub fn marshal(val: &Value, ty: &Type) -> Result<Vec<u8>> {
    if !val.conforms_to(ty) {
        return Err(Error::TypeMismatch {
            path: Path::root(),
            expected: ty.friendly_name(),
            found: val.ty().friendly_name(),
        });
    }
    let mp = encode_impl(val, ty, &Path::root(), 0)?;
    let mut buf = Vec::new();
    rmpv::encode::write_value(&mut buf, &mp).map_err(|e| Error::Write(e.to_string()))?;
    Ok(buf)
}

fn encode_impl(val: &Value, ty: &Type, path: &Path, depth: usize) -> Result<Mp> {
    if depth > MAX_RECURSION_DEPTH {
        return Err(Error::RecursionLimitExceeded);
    }

    let val_ty = val.ty();
    if ty.is_dynamic() && !val_ty.is_dynamic() {
        let ty_json = val_ty.marshal_json()?;
        let inner = encode_impl(val, &val_ty, path, depth + 1)?;
        return Ok(Mp::Array(vec![Mp::Binary(ty_json), inner]));
    }

    match val {
        Value::Unknown { not_null, .. } => unknown_ext(*not_null),
        Value::Null(_) => Ok(Mp::Nil),
        Value::Bool(b) => Ok(Mp::Boolean(*b)),
        Value::Number(Number::Int(i)) => Ok(Mp::from(*i)),
        Value::Number(Number::Float(f)) => Ok(Mp::F64(*f)),
        Value::String(s) => Ok(Mp::from(s.as_str())),
        Value::List { element, items } | Value::Set { element, items } => {
            let want = ty.element_type().unwrap_or(element);
            let mut out = Vec::with_capacity(items.len());
            for (idx, item) in items.iter().enumerate() {
                out.push(encode_impl(item, want, &path.index(idx), depth + 1)?);
            }
            Ok(Mp::Array(out))
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
            Ok(Mp::Array(out))
        }
        Value::Map { element, entries } => {
            let want = ty.element_type().unwrap_or(element);
            let mut out = Vec::with_capacity(entries.len());
            for (key, item) in entries {
                out.push((Mp::from(key.as_str()), encode_impl(item, want, &path.key(key), depth + 1)?));
            }
            Ok(Mp::Map(out))
        }
        Value::Object(attrs) => {
            let mut out = Vec::with_capacity(attrs.len());
            for (name, item) in attrs {
                let want = match ty {
                    Type::Object(types) => types.get(name).cloned().unwrap_or_else(|| item.ty()),
                    _ => item.ty(),
                };
                out.push((Mp::from(name.as_str()), encode_impl(item, &want, &path.attr(name), depth + 1)?));
            }
            Ok(Mp::Map(out))
        }
    }
}

fn unknown_ext(not_null: bool) -> Result<Mp> {
    if !not_null {
        return Ok(Mp::Ext(UNKNOWN_EXT, vec![0]));
    }
    let refinements = Mp::Map(vec![(Mp::from(REFINEMENT_NULLNESS), Mp::Boolean(false))]);
    let mut payload = Vec::new();
    rmpv::encode::write_value(&mut payload, &refinements).map_err(|e| Error::Write(e.to_string()))?;
    Ok(Mp::Ext(UNKNOWN_REFINED_EXT, payload))
}

/// Decodes MessagePack bytes into a value of type `ty`.
pub fn unmarshal(bytes: &[u8], ty: &Type) -> Result<Value> {
    let mut rest = bytes;
    let mp = rmpv::decode::read_value(&mut rest).map_err(|e| Error::Syntax(e.to_string()))?;
    if !rest.is_empty() {
        return Err(Error::Syntax(format!("{} unexpected trailing bytes", rest.len())));
    }
    decode_impl(&mp, ty, &Path::root(), 0)
}

fn decode_impl(mp: &Mp, ty: &Type, path: &Path, depth: usize) -> Result<Value> {
    if depth > MAX_RECURSION_DEPTH {
        return Err(Error::RecursionLimitExceeded);
    }

    match mp {
        Mp::Ext(code, payload) => return decode_unknown(*code, payload, ty),
        Mp::Nil => return Ok(Value::Null(ty.clone())),
        _ => {}
    }

    match ty {
        Type::Bool => match mp {
            Mp::Boolean(b) => Ok(Value::Bool(*b)),
            other => Err(mismatch(path, ty, other)),
        },
        Type::Number => match mp {
            Mp::Integer(i) => {
                if let Some(v) = i.as_i64() {
                    Ok(Value::Number(Number::Int(v)))
                } else if let Some(v) = i.as_u64() {
                    Ok(Value::Number(Number::from_u64(v)))
                } else {
                    Err(Error::InvalidNumber { path: path.clone(), detail: format!("{:?}", i) })
                }
            }
            Mp::F32(f) => float(f64::from(*f), path),
            Mp::F64(f) => float(*f, path),
            Mp::String(s) => {
                let s = s.as_str().ok_or_else(|| invalid_utf8(path))?;
                Number::parse(s)
                    .map(Value::Number)
                    .ok_or_else(|| Error::InvalidNumber { path: path.clone(), detail: format!("{:?} is not a number", s) })
            }
            other => Err(mismatch(path, ty, other)),
        },
        Type::String => match mp {
            Mp::String(s) => Ok(Value::String(s.as_str().ok_or_else(|| invalid_utf8(path))?.to_string())),
            other => Err(mismatch(path, ty, other)),
        },
        Type::List(element) | Type::Set(element) => {
            let Mp::Array(items) = mp else {
                return Err(mismatch(path, ty, mp));
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
            let Mp::Map(items) = mp else {
                return Err(mismatch(path, ty, mp));
            };
            let mut entries = BTreeMap::new();
            for (key, item) in items {
                let key = map_key(key, path)?;
                let val = decode_impl(item, element, &path.key(key), depth + 1)?;
                entries.insert(key.to_string(), val);
            }
            let element = settle_element_type(element, entries.values(), path)?;
            Ok(Value::map(element, entries))
        }
        Type::Object(attr_types) => {
            let Mp::Map(items) = mp else {
                return Err(mismatch(path, ty, mp));
            };
            let mut attrs = BTreeMap::new();
            for (key, item) in items {
                let name = map_key(key, path)?;
                let attr_ty = attr_types
                    .get(name)
                    .ok_or_else(|| Error::UnsupportedAttribute { path: path.clone(), name: name.to_string() })?;
                attrs.insert(name.to_string(), decode_impl(item, attr_ty, &path.attr(name), depth + 1)?);
            }
            for (name, attr_ty) in attr_types {
                attrs.entry(name.clone()).or_insert_with(|| Value::Null(attr_ty.clone()));
            }
            Ok(Value::Object(attrs))
        }
        Type::Tuple(types) => {
            let Mp::Array(items) = mp else {
                return Err(mismatch(path, ty, mp));
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
            let wrapper = match mp {
                Mp::Array(parts) if parts.len() == 2 => parts,
                other => return Err(mismatch(path, ty, other)),
            };
            let ty_json: &[u8] = match &wrapper[0] {
                Mp::Binary(bytes) => bytes,
                Mp::String(s) => s.as_bytes(),
                other => return Err(mismatch(path, &Type::String, other)),
            };
            let actual = Type::unmarshal_json(ty_json)?;
            decode_impl(&wrapper[1], &actual, path, depth + 1)
        }
        Type::Capsule(_) => Err(Error::UnsupportedType(ty.friendly_name())),
    }
}

fn decode_unknown(code: i8, payload: &[u8], ty: &Type) -> Result<Value> {
    match code {
        UNKNOWN_EXT => Ok(Value::unknown(ty.clone())),
        UNKNOWN_REFINED_EXT => {
            let mut rest = payload;
            let refinements = rmpv::decode::read_value(&mut rest).map_err(|e| Error::Syntax(e.to_string()))?;
            let not_null = match &refinements {
                Mp::Map(entries) => entries.iter().any(|(k, v)| {
                    k.as_i64() == Some(REFINEMENT_NULLNESS) && matches!(v, Mp::Boolean(false))
                }),
                _ => false,
            };
            Ok(Value::Unknown { ty: ty.clone(), not_null })
        }
        other => Err(Error::Syntax(format!("unsupported extension type {}", other))),
    }
}

fn float(f: f64, path: &Path) -> Result<Value> {
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| Error::InvalidNumber { path: path.clone(), detail: "NaN".into() })
}

fn map_key<'a>(key: &'a Mp, path: &Path) -> Result<&'a str> {
    match key {
        Mp::String(s) => s.as_str().ok_or_else(|| invalid_utf8(path)),
        other => Err(Error::TypeMismatch {
            path: path.clone(),
            expected: "string map key".into(),
            found: mp_kind(other).into(),
        }),
    }
}

fn invalid_utf8(path: &Path) -> Error {
    Error::TypeMismatch {
        path: path.clone(),
        expected: "UTF-8 string".into(),
        found: "invalid UTF-8".into(),
    }
}

fn mismatch(path: &Path, want: &Type, found: &Mp) -> Error {
    Error::TypeMismatch {
        path: path.clone(),
        expected: want.friendly_name(),
        found: mp_kind(found).into(),
    }
}

fn mp_kind(mp: &Mp) -> &'static str {
    match mp {
        Mp::Nil => "nil",
        Mp::Boolean(_) => "bool",
        Mp::Integer(_) | Mp::F32(_) | Mp::F64(_) => "number",
        Mp::String(_) => "string",
        Mp::Binary(_) => "binary",
        Mp::Array(_) => "array",
        Mp::Map(_) => "map",
        Mp::Ext(..) => "extension",
    }
}
