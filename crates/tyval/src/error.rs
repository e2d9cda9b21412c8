//! # Error Definitions
//!
//! Failures raised while converting between values and their encodings.
//! Every error that concerns a nested element carries the `Path` to it.

use std::fmt;

/// One step from a container to a nested element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathStep {
    /// An object attribute.
    Attr(String),
    /// A list, set or tuple position.
    Index(usize),
    /// A map key.
    Key(String),
}

/// The location of a nested element within a value. Empty for the root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Path(Vec<PathStep>);

impl Path {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn attr(&self, name: &str) -> Self {
        self.with(PathStep::Attr(name.to_string()))
    }

    pub fn index(&self, idx: usize) -> Self {
        self.with(PathStep::Index(idx))
    }

    pub fn key(&self, key: &str) -> Self {
        self.with(PathStep::Key(key.to_string()))
    }

    pub fn steps(&self) -> &[PathStep] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    fn with(&self, step: PathStep) -> Self {
        let mut steps = self.0.clone();
        steps.push(step);
        Self(steps)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for step in &self.0 {
            match step {
                PathStep::Attr(name) => write!(f, ".{}", name)?,
                PathStep::Index(idx) => write!(f, "[{}]", idx)?,
                PathStep::Key(key) => write!(f, "[{:?}]", key)?,
            }
        }
        Ok(())
    }
}

/// Encoding and decoding failures.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// The input was not syntactically valid for the encoding.
    Syntax(String),
    /// The encoded element does not have the shape the wanted type requires.
    TypeMismatch { path: Path, expected: String, found: String },
    /// A number could not be represented (NaN, or an unparseable string).
    InvalidNumber { path: Path, detail: String },
    /// An object was given an attribute its type does not declare.
    UnsupportedAttribute { path: Path, name: String },
    /// A tuple had the wrong number of elements.
    TupleLength { path: Path, expected: usize, found: usize },
    /// The encoding has no representation for unknown values.
    UnknownValue(Path),
    /// The type has no wire representation.
    UnsupportedType(String),
    /// A type description could not be parsed.
    InvalidTypeJson(String),
    /// The value is more deeply nested than the codec allows.
    RecursionLimitExceeded,
    /// The underlying writer failed.
    Write(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax(msg) => write!(f, "syntax error: {}", msg),
            Self::TypeMismatch { path, expected, found } => {
                write_path(f, path)?;
                write!(f, "{} required, but found {}", expected, found)
            }
            Self::InvalidNumber { path, detail } => {
                write_path(f, path)?;
                write!(f, "invalid number: {}", detail)
            }
            Self::UnsupportedAttribute { path, name } => {
                write_path(f, path)?;
                write!(f, "unsupported attribute {:?}", name)
            }
            Self::TupleLength { path, expected, found } => {
                write_path(f, path)?;
                write!(f, "tuple of {} elements required, but found {}", expected, found)
            }
            Self::UnknownValue(path) => {
                write_path(f, path)?;
                write!(f, "value is not known")
            }
            Self::UnsupportedType(ty) => write!(f, "type {} cannot be serialized", ty),
            Self::InvalidTypeJson(msg) => write!(f, "invalid type description: {}", msg),
            Self::RecursionLimitExceeded => write!(f, "value nesting exceeds the recursion limit"),
            Self::Write(msg) => write!(f, "write failed: {}", msg),
        }
    }
}

fn write_path(f: &mut fmt::Formatter<'_>, path: &Path) -> fmt::Result {
    if path.is_root() {
        Ok(())
    } else {
        write!(f, "{}: ", path)
    }
}

impl std::error::Error for Error {}

/// A specialized Result type for value encoding operations.
pub type Result<T> = std::result::Result<T, Error>;
