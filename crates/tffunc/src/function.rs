//! # Function Model
//!
//! What a function declares about itself, and the checked way of calling it.
//!
//! ## Invariants
//! - **Checked calls**: `FunctionSpec::call` never runs an implementation with
//!   the wrong number of arguments, a non-conforming argument, a forbidden
//!   null, or a forbidden unknown.
//! - **Honest results**: a result that does not conform to the resolved return
//!   type, or a null where `NotNull` was promised, is reported as an error.

use std::fmt;
use std::sync::Arc;

use tyval::Type;
use tyval::Value;

/// The implementation of a function: receives the checked arguments and the resolved return type.
pub type ImplFn = Arc<dyn Fn(&[Value], &Type) -> Result<Value, FunctionError> + Send + Sync>;

/// Decides a return type from the argument values.
pub type TypeFn = Arc<dyn Fn(&[Value]) -> Result<Type, FunctionError> + Send + Sync>;

// ============================================================================
//  ERRORS
// ============================================================================

/// How an invocation failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunctionError {
    /// The argument at `index` is to blame.
    Arg { index: usize, message: String },
    Other(String),
}

impl FunctionError {
    pub fn arg(index: usize, message: impl Into<String>) -> Self {
        Self::Arg { index, message: message.into() }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// The index of the argument to blame, if any.
    pub fn index(&self) -> Option<usize> {
        match self {
            Self::Arg { index, .. } => Some(*index),
            Self::Other(_) => None,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Arg { message, .. } | Self::Other(message) => message,
        }
    }
}

impl fmt::Display for FunctionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for FunctionError {}

// ============================================================================
//  DECLARATIONS
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub description: String,
    pub ty: Type,
    pub allow_null: bool,
    pub allow_unknown: bool,
    /// Hosts strip marks (such as sensitivity) before calling a provider, so
    /// registration refuses parameters that set this.
    pub allow_marked: bool,
}

impl Parameter {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            ty,
            allow_null: false,
            allow_unknown: false,
            allow_marked: false,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn allow_null(mut self, allow: bool) -> Self {
        self.allow_null = allow;
        self
    }

    pub fn allow_unknown(mut self, allow: bool) -> Self {
        self.allow_unknown = allow;
        self
    }

    pub fn allow_marked(mut self, allow: bool) -> Self {
        self.allow_marked = allow;
        self
    }
}

/// How a function decides its return type.
#[derive(Clone)]
pub enum ReturnType {
    Static(Type),
    Computed(TypeFn),
}

impl ReturnType {
    pub fn computed(f: impl Fn(&[Value]) -> Result<Type, FunctionError> + Send + Sync + 'static) -> Self {
        Self::Computed(Arc::new(f))
    }

    pub fn resolve(&self, args: &[Value]) -> Result<Type, FunctionError> {
        match self {
            Self::Static(ty) => Ok(ty.clone()),
            Self::Computed(f) => f(args),
        }
    }
}

impl fmt::Debug for ReturnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(ty) => f.debug_tuple("Static").field(ty).finish(),
            Self::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// Promises about a function's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refinement {
    /// The result is never null, even while still unknown.
    NotNull,
}

/// A function: its parameters, its return type rule and its implementation.
#[derive(Clone)]
pub struct FunctionSpec {
    pub description: String,
    pub params: Vec<Parameter>,
    pub variadic: Option<Parameter>,
    pub returns: ReturnType,
    pub implementation: ImplFn,
    pub refinement: Option<Refinement>,
}

impl FunctionSpec {
    pub fn new(
        returns: ReturnType,
        implementation: impl Fn(&[Value], &Type) -> Result<Value, FunctionError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            description: String::new(),
            params: Vec::new(),
            variadic: None,
            returns,
            implementation: Arc::new(implementation),
            refinement: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn param(mut self, param: Parameter) -> Self {
        self.params.push(param);
        self
    }

    pub fn variadic(mut self, param: Parameter) -> Self {
        self.variadic = Some(param);
        self
    }

    pub fn refine(mut self, refinement: Refinement) -> Self {
        self.refinement = Some(refinement);
        self
    }

    /// The parameter that receives the argument at `index`.
    pub fn parameter_for(&self, index: usize) -> Option<&Parameter> {
        self.params.get(index).or(self.variadic.as_ref())
    }

    fn promises_not_null(&self) -> bool {
        self.refinement == Some(Refinement::NotNull)
    }

    // ========================================================================
    //  CALL
    // ========================================================================

    /// Calls the implementation after checking `args` against the declared parameters.
    ///
    /// If an argument is unknown where its parameter does not accept unknowns,
    /// the implementation is skipped and the result is an unknown value of the
    /// return type. A computed return type still sees the unknown arguments.
    pub fn call(&self, args: &[Value]) -> Result<Value, FunctionError> {
        if args.len() < self.params.len() {
            return Err(FunctionError::other("not enough arguments"));
        }
        if self.variadic.is_none() && args.len() > self.params.len() {
            return Err(FunctionError::other("too many arguments"));
        }

        let mut defer = false;
        for (index, arg) in args.iter().enumerate() {
            let Some(param) = self.parameter_for(index) else {
                return Err(FunctionError::other("too many arguments"));
            };
            if arg.is_null() && !param.allow_null {
                return Err(FunctionError::arg(index, "argument must not be null"));
            }
            if !arg.conforms_to(&param.ty) {
                return Err(FunctionError::arg(index, format!("{} required", param.ty.friendly_name())));
            }
            if !arg.is_wholly_known() && !param.allow_unknown {
                defer = true;
            }
        }

        let ret_ty = self.returns.resolve(args)?;

        if defer {
            let unknown = Value::unknown(ret_ty);
            return Ok(if self.promises_not_null() { unknown.refine_not_null() } else { unknown });
        }

        let result = (self.implementation)(args, &ret_ty)?;

        if !result.conforms_to(&ret_ty) {
            return Err(FunctionError::other(format!(
                "function returned {}, but its return type is {}",
                result.ty().friendly_name(),
                ret_ty.friendly_name(),
            )));
        }
        if result.is_null() && self.promises_not_null() {
            return Err(FunctionError::other("function returned null despite promising a non-null result"));
        }
        Ok(result)
    }
}

impl fmt::Debug for FunctionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionSpec")
            .field("description", &self.description)
            .field("params", &self.params)
            .field("variadic", &self.variadic)
            .field("returns", &self.returns)
            .field("refinement", &self.refinement)
            .finish_non_exhaustive()
    }
}
