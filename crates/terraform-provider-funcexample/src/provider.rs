use tffunc::FunctionError;
use tffunc::FunctionSpec;
use tffunc::Parameter;
use tffunc::Provider;
use tffunc::Refinement;
use tffunc::ReturnType;
use tyval::Type;
use tyval::Value;

pub fn new_provider() -> Provider {
    let mut provider = Provider::new();
    provider.add_function(
        "upper",
        string_conversion("Converts a given string to uppercase.", str::to_uppercase),
    );
    provider.add_function(
        "lower",
        string_conversion("Converts a given string to lowercase.", str::to_lowercase),
    );
    provider
}

/// A function of one non-null string that never returns null.
fn string_conversion(description: &str, convert: fn(&str) -> String) -> FunctionSpec {
    FunctionSpec::new(ReturnType::Static(Type::String), move |args, _| {
        // Arity, type and nullness are checked before we are called.
        let s = args[0].as_str().ok_or_else(|| FunctionError::arg(0, "string required"))?;
        Ok(Value::string(convert(s)))
    })
    .description(description)
    .param(Parameter::new("str", Type::String).description("The string to convert."))
    .refine(Refinement::NotNull)
}
