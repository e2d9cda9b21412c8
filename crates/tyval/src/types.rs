//! # Types
//!
//! The type algebra and its canonical JSON serialization.
//!
//! ## Invariants
//! - **Canonical form**: `to_json` is the only representation of a type that
//!   crosses the wire. Capsule types have none and fail to serialize.
//! - **Dynamic**: `Type::Dynamic` is a placeholder accepted wherever a type is
//!   wanted; it is never the type of a known value.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value as Json;

use crate::error::Error;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Type {
    Bool,
    Number,
    String,
    /// The type of a value whose concrete type is only known at runtime.
    Dynamic,
    List(Box<Type>),
    Set(Box<Type>),
    Map(Box<Type>),
    Object(BTreeMap<String, Type>),
    Tuple(Vec<Type>),
    /// An opaque in-process type. Values of it never leave the process.
    Capsule(Arc<str>),
}

impl Type {
    pub fn list(element: Type) -> Self {
        Self::List(Box::new(element))
    }

    pub fn set(element: Type) -> Self {
        Self::Set(Box::new(element))
    }

    pub fn map(element: Type) -> Self {
        Self::Map(Box::new(element))
    }

    pub fn object<K: Into<String>>(attrs: impl IntoIterator<Item = (K, Type)>) -> Self {
        Self::Object(attrs.into_iter().map(|(k, t)| (k.into(), t)).collect())
    }

    pub fn tuple(elements: impl IntoIterator<Item = Type>) -> Self {
        Self::Tuple(elements.into_iter().collect())
    }

    pub fn capsule(name: &str) -> Self {
        Self::Capsule(Arc::from(name))
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, Self::Bool | Self::Number | Self::String)
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, Self::Dynamic)
    }

    /// The element type of a list, set or map.
    pub fn element_type(&self) -> Option<&Type> {
        match self {
            Self::List(e) | Self::Set(e) | Self::Map(e) => Some(e),
            _ => None,
        }
    }

    /// Whether a value of type `self` is acceptable where `want` is expected.
    ///
    /// `Dynamic` in `want` matches anything at that position.
    pub fn conforms_to(&self, want: &Type) -> bool {
        match (self, want) {
            (_, Type::Dynamic) => true,
            (Type::List(a), Type::List(b))
            | (Type::Set(a), Type::Set(b))
            | (Type::Map(a), Type::Map(b)) => a.conforms_to(b),
            (Type::Object(a), Type::Object(b)) => {
                a.len() == b.len()
                    && a.iter().all(|(name, ty)| b.get(name).is_some_and(|w| ty.conforms_to(w)))
            }
            (Type::Tuple(a), Type::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(ty, w)| ty.conforms_to(w))
            }
            (a, b) => a == b,
        }
    }

    /// A short human-readable description, used in error messages.
    pub fn friendly_name(&self) -> String {
        match self {
            Self::Bool => "bool".into(),
            Self::Number => "number".into(),
            Self::String => "string".into(),
            Self::Dynamic => "any type".into(),
            Self::List(e) => format!("list of {}", e.friendly_name()),
            Self::Set(e) => format!("set of {}", e.friendly_name()),
            Self::Map(e) => format!("map of {}", e.friendly_name()),
            Self::Object(_) => "object".into(),
            Self::Tuple(_) => "tuple".into(),
            Self::Capsule(name) => name.to_string(),
        }
    }

    // ========================================================================
    //  CANONICAL JSON
    // ========================================================================

    /// Builds the canonical JSON description of this type.
    pub fn to_json(&self) -> Result<Json> {
        Ok(match self {
            Self::Bool => Json::from("bool"),
            Self::Number => Json::from("number"),
            Self::String => Json::from("string"),
            Self::Dynamic => Json::from("dynamic"),
            Self::List(e) => Json::Array(vec!["list".into(), e.to_json()?]),
            Self::Set(e) => Json::Array(vec!["set".into(), e.to_json()?]),
            Self::Map(e) => Json::Array(vec!["map".into(), e.to_json()?]),
            Self::Object(attrs) => {
                let mut obj = serde_json::Map::new();
                for (name, ty) in attrs {
                    obj.insert(name.clone(), ty.to_json()?);
                }
                Json::Array(vec!["object".into(), Json::Object(obj)])
            }
            Self::Tuple(elems) => {
                let elems = elems.iter().map(Type::to_json).collect::<Result<Vec<_>>>()?;
                Json::Array(vec!["tuple".into(), Json::Array(elems)])
            }
            Self::Capsule(_) => return Err(Error::UnsupportedType(self.friendly_name())),
        })
    }

    /// Serializes the canonical JSON description to bytes.
    pub fn marshal_json(&self) -> Result<Vec<u8>> {
        let json = self.to_json()?;
        serde_json::to_vec(&json).map_err(|e| Error::Write(e.to_string()))
    }

    /// Parses a canonical JSON type description.
    pub fn from_json(json: &Json) -> Result<Self> {
        match json {
            Json::String(name) => match name.as_str() {
                "bool" => Ok(Self::Bool),
                "number" => Ok(Self::Number),
                "string" => Ok(Self::String),
                "dynamic" => Ok(Self::Dynamic),
                other => Err(Error::InvalidTypeJson(format!("unknown primitive type {:?}", other))),
            },
            Json::Array(parts) if parts.len() == 2 => {
                let kind = parts[0]
                    .as_str()
                    .ok_or_else(|| Error::InvalidTypeJson("type kind must be a string".into()))?;
                let arg = &parts[1];
                match kind {
                    "list" => Ok(Self::list(Self::from_json(arg)?)),
                    "set" => Ok(Self::set(Self::from_json(arg)?)),
                    "map" => Ok(Self::map(Self::from_json(arg)?)),
                    "object" => {
                        let attrs = arg.as_object().ok_or_else(|| {
                            Error::InvalidTypeJson("object attributes must be a JSON object".into())
                        })?;
                        let mut out = BTreeMap::new();
                        for (name, ty) in attrs {
                            out.insert(name.clone(), Self::from_json(ty)?);
                        }
                        Ok(Self::Object(out))
                    }
                    "tuple" => {
                        let elems = arg.as_array().ok_or_else(|| {
                            Error::InvalidTypeJson("tuple elements must be a JSON array".into())
                        })?;
                        Ok(Self::Tuple(elems.iter().map(Self::from_json).collect::<Result<_>>()?))
                    }
                    other => Err(Error::InvalidTypeJson(format!("unknown type kind {:?}", other))),
                }
            }
            other => Err(Error::InvalidTypeJson(format!("unexpected {}", other))),
        }
    }

    /// Parses a canonical JSON type description from bytes.
    pub fn unmarshal_json(bytes: &[u8]) -> Result<Self> {
        let json: Json = serde_json::from_slice(bytes).map_err(|e| Error::InvalidTypeJson(e.to_string()))?;
        Self::from_json(&json)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.friendly_name())
    }
}
