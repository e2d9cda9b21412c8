//! # Schema Builder
//!
//! Derives the wire description of a function from its declaration.
//!
//! The declared return type is never advertised: functions may decide it from
//! their arguments, so every schema reports `dynamic` and each call result
//! carries its real type.

use funcrpc::Function;
use funcrpc::FunctionParameter;
use funcrpc::FunctionReturn;
use funcrpc::StringKind;

use crate::function::FunctionSpec;
use crate::function::Parameter;
use crate::registry::RegistrationError;

/// Type JSON of the dynamic pseudo-type.
pub const DYNAMIC_TYPE_JSON: &[u8] = b"\"dynamic\"";

pub fn build_schema(spec: &FunctionSpec) -> Result<Function, RegistrationError> {
    let parameters = spec.params.iter().map(parameter_schema).collect::<Result<Vec<_>, _>>()?;
    let variadic_parameter = spec.variadic.as_ref().map(parameter_schema).transpose()?;

    Ok(Function {
        parameters,
        variadic_parameter,
        return_: FunctionReturn { type_json: DYNAMIC_TYPE_JSON.to_vec() },
        description: spec.description.clone(),
        description_kind: StringKind::Plain,
        ..Default::default()
    })
}

fn parameter_schema(param: &Parameter) -> Result<FunctionParameter, RegistrationError> {
    if param.allow_marked {
        return Err(RegistrationError::MarkedParameter(param.name.clone()));
    }
    let type_json = param.ty.marshal_json().map_err(|e| RegistrationError::UnsupportedType {
        param: param.name.clone(),
        ty: param.ty.clone(),
        detail: e.to_string(),
    })?;

    Ok(FunctionParameter {
        name: param.name.clone(),
        type_json,
        allow_null_value: param.allow_null,
        allow_unknown_values: param.allow_unknown,
        description: param.description.clone(),
        description_kind: StringKind::Plain,
    })
}
