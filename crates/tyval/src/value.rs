//! # Values
//!
//! Runtime values that always carry their type, including nulls and values
//! that are not yet known.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::Error;
use crate::error::Path;
use crate::error::Result;
use crate::types::Type;

/// A number. Integral values are held exactly; everything else is a float.
///
/// The ordering is canonical rather than numeric: every `Int` sorts before
/// every `Float`, and floats compare by `f64::total_cmp`.
#[derive(Debug, Clone, Copy)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    /// Normalizes a float, turning integral values into `Int`. NaN is rejected.
    pub fn from_f64(v: f64) -> Option<Self> {
        if v.is_nan() {
            return None;
        }
        // 2^63 is exactly representable, i64::MAX is not.
        if v.fract() == 0.0 && v >= i64::MIN as f64 && v < 9_223_372_036_854_775_808.0 {
            Some(Self::Int(v as i64))
        } else {
            Some(Self::Float(v))
        }
    }

    pub fn from_u64(v: u64) -> Self {
        match i64::try_from(v) {
            Ok(i) => Self::Int(i),
            Err(_) => Self::Float(v as f64),
        }
    }

    /// Parses a decimal string as accepted by the JSON and MessagePack decoders.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if let Ok(i) = s.parse::<i64>() {
            return Some(Self::Int(i));
        }
        s.parse::<f64>().ok().and_then(Self::from_f64)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Float(_) => None,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match self {
            Self::Int(i) => *i as f64,
            Self::Float(f) => *f,
        }
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Number {}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Number {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::Float(a), Self::Float(b)) => a.total_cmp(b),
            (Self::Int(_), Self::Float(_)) => Ordering::Less,
            (Self::Float(_), Self::Int(_)) => Ordering::Greater,
        }
    }
}

impl From<i64> for Number {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Number {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<u32> for Number {
    fn from(v: u32) -> Self {
        Self::Int(v.into())
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(v) => write!(f, "{}", v),
        }
    }
}

/// A typed value.
///
/// Values are totally ordered so that sets can be sorted and deduplicated.
/// Sets compare as if their items were sorted.
#[derive(Debug, Clone)]
pub enum Value {
    /// The absence of a value, of a particular type.
    Null(Type),
    /// A value that will only be known later.
    /// `not_null` records a promise that it will not turn out to be null.
    Unknown { ty: Type, not_null: bool },
    Bool(bool),
    Number(Number),
    String(String),
    List { element: Type, items: Vec<Value> },
    /// Items are kept free of duplicates; order carries no meaning.
    /// `Value::set` stores them sorted.
    Set { element: Type, items: Vec<Value> },
    Map { element: Type, entries: BTreeMap<String, Value> },
    Object(BTreeMap<String, Value>),
    Tuple(Vec<Value>),
}

impl Value {
    pub fn null(ty: Type) -> Self {
        Self::Null(ty)
    }

    pub fn unknown(ty: Type) -> Self {
        Self::Unknown { ty, not_null: false }
    }

    pub fn string(s: impl Into<String>) -> Self {
        Self::String(s.into())
    }

    pub fn number(n: impl Into<Number>) -> Self {
        Self::Number(n.into())
    }

    pub fn bool(b: bool) -> Self {
        Self::Bool(b)
    }

    pub fn list(element: Type, items: Vec<Value>) -> Self {
        Self::List { element, items }
    }

    pub fn set(element: Type, mut items: Vec<Value>) -> Self {
        items.sort_unstable();
        items.dedup();
        Self::Set { element, items }
    }

    pub fn map(element: Type, entries: BTreeMap<String, Value>) -> Self {
        Self::Map { element, entries }
    }

    pub fn object<K: Into<String>>(attrs: impl IntoIterator<Item = (K, Value)>) -> Self {
        Self::Object(attrs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn tuple(items: impl IntoIterator<Item = Value>) -> Self {
        Self::Tuple(items.into_iter().collect())
    }

    /// The type of this value.
    pub fn ty(&self) -> Type {
        match self {
            Self::Null(ty) | Self::Unknown { ty, .. } => ty.clone(),
            Self::Bool(_) => Type::Bool,
            Self::Number(_) => Type::Number,
            Self::String(_) => Type::String,
            Self::List { element, .. } => Type::list(element.clone()),
            Self::Set { element, .. } => Type::set(element.clone()),
            Self::Map { element, .. } => Type::map(element.clone()),
            Self::Object(attrs) => Type::Object(attrs.iter().map(|(k, v)| (k.clone(), v.ty())).collect()),
            Self::Tuple(items) => Type::Tuple(items.iter().map(Value::ty).collect()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null(_))
    }

    /// Whether this value itself is known. Nested elements may still be unknown.
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown { .. })
    }

    /// Whether this value and everything nested within it is known.
    pub fn is_wholly_known(&self) -> bool {
        match self {
            Self::Unknown { .. } => false,
            Self::List { items, .. } | Self::Set { items, .. } | Self::Tuple(items) => {
                items.iter().all(Value::is_wholly_known)
            }
            Self::Map { entries, .. } => entries.values().all(Value::is_wholly_known),
            Self::Object(attrs) => attrs.values().all(Value::is_wholly_known),
            _ => true,
        }
    }

    /// Whether this value may be used where `want` is expected.
    ///
    /// A null or unknown of `Dynamic` type stands in for a value of any type.
    pub fn conforms_to(&self, want: &Type) -> bool {
        match self {
            Self::Null(Type::Dynamic) | Self::Unknown { ty: Type::Dynamic, .. } => true,
            _ => self.ty().conforms_to(want),
        }
    }

    /// Records that an unknown value will never be null. Known values are returned unchanged.
    pub fn refine_not_null(self) -> Self {
        match self {
            Self::Unknown { ty, .. } => Self::Unknown { ty, not_null: true },
            other => other,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<Number> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The elements of a list, set or tuple.
    pub fn as_elements(&self) -> Option<&[Value]> {
        match self {
            Self::List { items, .. } | Self::Set { items, .. } | Self::Tuple(items) => Some(items),
            _ => None,
        }
    }
}

impl Value {
    fn rank(&self) -> u8 {
        match self {
            Self::Null(_) => 0,
            Self::Unknown { .. } => 1,
            Self::Bool(_) => 2,
            Self::Number(_) => 3,
            Self::String(_) => 4,
            Self::List { .. } => 5,
            Self::Set { .. } => 6,
            Self::Map { .. } => 7,
            Self::Object(_) => 8,
            Self::Tuple(_) => 9,
        }
    }
}

fn sorted(items: &[Value]) -> Vec<&Value> {
    let mut refs: Vec<&Value> = items.iter().collect();
    refs.sort_unstable();
    refs
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Null(a), Self::Null(b)) => a.cmp(b),
            (Self::Unknown { ty: a, not_null: na }, Self::Unknown { ty: b, not_null: nb }) => {
                a.cmp(b).then(na.cmp(nb))
            }
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Number(a), Self::Number(b)) => a.cmp(b),
            (Self::String(a), Self::String(b)) => a.cmp(b),
            (Self::List { element: ea, items: a }, Self::List { element: eb, items: b }) => {
                ea.cmp(eb).then_with(|| a.cmp(b))
            }
            (Self::Set { element: ea, items: a }, Self::Set { element: eb, items: b }) => ea
                .cmp(eb)
                .then(a.len().cmp(&b.len()))
                .then_with(|| sorted(a).cmp(&sorted(b))),
            (Self::Map { element: ea, entries: a }, Self::Map { element: eb, entries: b }) => {
                ea.cmp(eb).then_with(|| a.cmp(b))
            }
            (Self::Object(a), Self::Object(b)) => a.cmp(b),
            (Self::Tuple(a), Self::Tuple(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        Self::Number(n)
    }
}

/// Settles the element type of a decoded collection.
///
/// A wanted `Dynamic` element type takes the type of the items, which must then agree.
pub(crate) fn settle_element_type<'a>(
    want: &Type,
    items: impl IntoIterator<Item = &'a Value>,
    path: &Path,
) -> Result<Type> {
    if !want.is_dynamic() {
        return Ok(want.clone());
    }
    let mut settled: Option<Type> = None;
    for item in items {
        let ty = item.ty();
        if ty.is_dynamic() {
            continue;
        }
        match &settled {
            None => settled = Some(ty),
            Some(prev) if *prev == ty => {}
            Some(prev) => {
                return Err(Error::TypeMismatch {
                    path: path.clone(),
                    expected: format!("elements of {}", prev.friendly_name()),
                    found: ty.friendly_name(),
                });
            }
        }
    }
    Ok(settled.unwrap_or(Type::Dynamic))
}
