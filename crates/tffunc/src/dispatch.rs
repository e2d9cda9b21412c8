//! # Call Dispatcher
//!
//! Turns one `CallFunction` request into a response: resolve, check arity,
//! decode, invoke, encode.
//!
//! ## Invariants
//! - **Stateless**: nothing is kept between calls.
//! - **Errors are data**: every failure becomes a `FunctionError` in the
//!   response; none of them is a transport failure.
//! - **Positional blame**: decoding and argument failures carry the index of
//!   the argument; name, arity and result failures carry none.

use funcrpc::CallFunctionRequest;
use funcrpc::CallFunctionResponse;
use funcrpc::DynamicValue;
use funcrpc::FunctionError as WireError;
use tracing::debug;
use tyval::Type;
use tyval::Value;

use crate::function::FunctionError;
use crate::registry::RegisteredFunction;
use crate::registry::Registry;

pub fn call_function(registry: &Registry, req: CallFunctionRequest) -> CallFunctionResponse {
    match dispatch(registry, &req) {
        Ok(result) => CallFunctionResponse::success(result),
        Err(error) => {
            debug!(function = %req.name, error = %error.text, argument = ?error.function_argument, "call failed");
            CallFunctionResponse::failure(error)
        }
    }
}

fn dispatch(registry: &Registry, req: &CallFunctionRequest) -> Result<DynamicValue, WireError> {
    let func = registry.lookup(&req.name).ok_or_else(|| {
        unattributed(format!("this provider does not offer a function named {:?}", req.name))
    })?;

    check_arity(func, req.arguments.len())?;

    let args = req
        .arguments
        .iter()
        .enumerate()
        .map(|(index, raw)| decode_argument(func, index, raw))
        .collect::<Result<Vec<_>, _>>()?;
    debug!(function = %req.name, args = args.len(), "arguments decoded");

    let result = func.call(&args).map_err(|e| match e {
        FunctionError::Arg { index, message } => attributed(index, message),
        FunctionError::Other(message) => unattributed(message),
    })?;

    let bytes = tyval::msgpack::marshal(&result, &Type::Dynamic)
        .map_err(|e| unattributed(format!("failed to encode result: {}", e)))?;
    Ok(DynamicValue::msgpack(bytes))
}

fn check_arity(func: &RegisteredFunction, count: usize) -> Result<(), WireError> {
    let fixed = func.param_types.len();
    match func.variadic_type {
        None if count != fixed => Err(unattributed(format!("argument count must be {}", fixed))),
        Some(_) if count < fixed => Err(unattributed(format!("argument count must be at least {}", fixed))),
        _ => Ok(()),
    }
}

/// Decodes one argument, preferring JSON when both encodings are present.
fn decode_argument(func: &RegisteredFunction, index: usize, raw: &DynamicValue) -> Result<Value, WireError> {
    let ty = func
        .type_for(index)
        .ok_or_else(|| attributed(index, "unexpected argument"))?;

    let decoded = if !raw.json.is_empty() {
        tyval::json::unmarshal(&raw.json, ty)
    } else if !raw.msgpack.is_empty() {
        tyval::msgpack::unmarshal(&raw.msgpack, ty)
    } else {
        return Err(attributed(index, "plugin client is using unsupported argument encoding format"));
    };

    decoded.map_err(|e| attributed(index, format!("invalid encoding for argument: {}", e)))
}

fn attributed(index: usize, text: impl Into<String>) -> WireError {
    WireError { text: text.into(), function_argument: Some(index as i64) }
}

fn unattributed(text: impl Into<String>) -> WireError {
    WireError { text: text.into(), function_argument: None }
}
