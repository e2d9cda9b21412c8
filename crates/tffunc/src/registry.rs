//! # Function Registry
//!
//! Where functions are registered during setup and looked up while serving.
//!
//! ## Lifecycle
//!
//! A `Provider` is mutable and only exists before serving. `into_registry`
//! freezes it into a `Registry` behind an `Arc`, which is never written again
//! and can be read from any number of concurrent calls without locking.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use funcrpc::Function;
use funcrpc::FunctionMetadata;
use tyval::Type;
use tyval::Value;

use crate::function::FunctionError;
use crate::function::FunctionSpec;
use crate::schema::build_schema;

/// Why a function could not be registered.
#[derive(Debug, Clone, PartialEq)]
pub enum RegistrationError {
    Duplicate(String),
    /// The named parameter sets `allow_marked`.
    MarkedParameter(String),
    /// The named parameter's type has no wire form.
    UnsupportedType { param: String, ty: Type, detail: String },
}

impl fmt::Display for RegistrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Duplicate(name) => write!(f, "function {:?} was already defined", name),
            Self::MarkedParameter(name) => write!(f, "parameter {:?} sets allow_marked, which is forbidden", name),
            Self::UnsupportedType { param, ty, detail } => {
                write!(f, "parameter {:?} has unsupported type {}: {}", param, ty, detail)
            }
        }
    }
}

impl std::error::Error for RegistrationError {}

/// A stored function with its parameter types laid out by position.
#[derive(Debug)]
pub struct RegisteredFunction {
    pub spec: FunctionSpec,
    pub param_types: Vec<Type>,
    pub variadic_type: Option<Type>,
}

impl RegisteredFunction {
    fn new(spec: FunctionSpec) -> Self {
        let param_types = spec.params.iter().map(|p| p.ty.clone()).collect();
        let variadic_type = spec.variadic.as_ref().map(|p| p.ty.clone());
        Self { spec, param_types, variadic_type }
    }

    /// The type the argument at `index` is decoded against.
    pub fn type_for(&self, index: usize) -> Option<&Type> {
        self.param_types.get(index).or(self.variadic_type.as_ref())
    }

    pub fn call(&self, args: &[Value]) -> Result<Value, FunctionError> {
        self.spec.call(args)
    }
}

// ============================================================================
//  SETUP
// ============================================================================

/// A functions-only provider under construction.
#[derive(Debug, Default)]
pub struct Provider {
    funcs: HashMap<String, Arc<RegisteredFunction>>,
    schemas: BTreeMap<String, Function>,
    metas: Vec<FunctionMetadata>,
}

impl Provider {
    /// A provider that offers no functions yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `spec` under `name`.
    ///
    /// # Panics
    /// If `name` is taken, a parameter sets `allow_marked`, or a parameter type
    /// has no wire form. These are programming errors in the provider itself.
    pub fn add_function(&mut self, name: impl Into<String>, spec: FunctionSpec) {
        if let Err(e) = self.try_add_function(name, spec) {
            panic!("{}", e);
        }
    }

    /// Registers `spec` under `name`, reporting rather than panicking on invalid input.
    pub fn try_add_function(&mut self, name: impl Into<String>, spec: FunctionSpec) -> Result<(), RegistrationError> {
        let name = name.into();
        if self.funcs.contains_key(&name) {
            return Err(RegistrationError::Duplicate(name));
        }
        let schema = build_schema(&spec)?;

        self.funcs.insert(name.clone(), Arc::new(RegisteredFunction::new(spec)));
        self.schemas.insert(name.clone(), schema);
        self.metas.push(FunctionMetadata { name });
        Ok(())
    }

    /// A plain callable for the named function, for testing it in isolation.
    ///
    /// # Panics
    /// If no function named `name` is registered.
    pub fn call_stub(&self, name: &str) -> impl Fn(&[Value]) -> Result<Value, FunctionError> + Send + Sync + 'static {
        let Some(func) = self.funcs.get(name).cloned() else {
            panic!("call stub request for undefined function {:?}", name);
        };
        move |args: &[Value]| func.call(args)
    }

    /// Freezes the registered functions for serving.
    pub fn into_registry(self) -> Arc<Registry> {
        Arc::new(Registry {
            funcs: self.funcs,
            schemas: self.schemas,
            metas: self.metas,
        })
    }
}

// ============================================================================
//  SERVING
// ============================================================================

/// The frozen set of functions a provider serves.
#[derive(Debug)]
pub struct Registry {
    funcs: HashMap<String, Arc<RegisteredFunction>>,
    schemas: BTreeMap<String, Function>,
    metas: Vec<FunctionMetadata>,
}

impl Registry {
    pub fn lookup(&self, name: &str) -> Option<&RegisteredFunction> {
        self.funcs.get(name).map(Arc::as_ref)
    }

    /// Wire schemas by function name.
    pub fn schemas(&self) -> &BTreeMap<String, Function> {
        &self.schemas
    }

    /// Metadata records in registration order.
    pub fn metadata(&self) -> &[FunctionMetadata] {
        &self.metas
    }

    pub fn len(&self) -> usize {
        self.funcs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.funcs.is_empty()
    }
}
