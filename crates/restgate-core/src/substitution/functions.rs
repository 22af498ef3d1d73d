//! Built-in template functions, registered once per engine.

use std::collections::HashMap;

use chrono::format::{Item, StrftimeItems};
use serde_json_path::JsonPath;
use tera::{Function, Value};

/// `currentTimeMillis()` - milliseconds since the Unix epoch.
pub struct CurrentTimeMillis;

impl Function for CurrentTimeMillis {
    fn call(&self, _args: &HashMap<String, Value>) -> tera::Result<Value> {
        Ok(Value::from(chrono::Utc::now().timestamp_millis()))
    }
}

/// `currentTimeStamp(pattern)` - the current local time formatted with a
/// chrono strftime pattern.
pub struct CurrentTimeStamp;

impl Function for CurrentTimeStamp {
    fn call(&self, args: &HashMap<String, Value>) -> tera::Result<Value> {
        let pattern = required_str(args, "pattern", "currentTimeStamp")?;
        let items: Vec<Item<'_>> = StrftimeItems::new(pattern).collect();
        if items.iter().any(|item| matches!(item, Item::Error)) {
            return Err(tera::Error::msg(format!(
                "currentTimeStamp: invalid pattern '{}'",
                pattern
            )));
        }
        let formatted = chrono::Local::now().format_with_items(items.into_iter()).to_string();
        Ok(Value::String(formatted))
    }
}

/// `jq(json, expr)` - apply a JSONPath expression to a JSON document. A
/// single match yields the matched value, several matches yield the array of
/// them encoded as JSON.
pub struct Jq;

impl Function for Jq {
    fn call(&self, args: &HashMap<String, Value>) -> tera::Result<Value> {
        let json = required_str(args, "json", "jq")?;
        let expr = required_str(args, "expr", "jq")?;
        let document: Value = serde_json::from_str(json)
            .map_err(|e| tera::Error::msg(format!("jq: input is not valid json: {}", e)))?;
        let path = JsonPath::parse(expr)
            .map_err(|e| tera::Error::msg(format!("jq: invalid expression '{}': {}", expr, e)))?;
        let matches: Vec<&Value> = path.query(&document).all();
        match matches.as_slice() {
            [] => Err(tera::Error::msg(format!("jq: expression '{}' matched nothing", expr))),
            [single] => Ok(render_value(single)),
            many => {
                let values: Vec<Value> = many.iter().map(|v| (*v).clone()).collect();
                let encoded = serde_json::to_string(&values)
                    .map_err(|e| tera::Error::msg(format!("jq: {}", e)))?;
                Ok(Value::String(encoded))
            }
        }
    }
}

/// `replaceAtSymbol(value)` - replace every `@` with `__`.
pub struct ReplaceAtSymbol;

impl Function for ReplaceAtSymbol {
    fn call(&self, args: &HashMap<String, Value>) -> tera::Result<Value> {
        let value = required_str(args, "value", "replaceAtSymbol")?;
        Ok(Value::String(value.replace('@', "__")))
    }
}

/// `eval(script, arg1..argN)` - run an embedded CEL expression with the named
/// arguments bound as variables.
///
/// This is an escape hatch that executes caller-influenced code; it assumes
/// template sources are authored by trusted operators only.
pub struct Eval;

impl Function for Eval {
    fn call(&self, args: &HashMap<String, Value>) -> tera::Result<Value> {
        let script = required_str(args, "script", "eval")?;
        let program = cel::Program::compile(script)
            .map_err(|e| tera::Error::msg(format!("eval: invalid script: {}", e)))?;
        let mut context = cel::Context::default();
        for (name, value) in args {
            if name == "script" {
                continue;
            }
            context
                .add_variable(name.clone(), value.clone())
                .map_err(|e| tera::Error::msg(format!("eval: cannot bind '{}': {}", name, e)))?;
        }
        let result = program
            .execute(&context)
            .map_err(|e| tera::Error::msg(format!("eval: {}", e)))?;
        Ok(cel_to_template_value(result))
    }
}

/// Scalar results interpolate directly; anything else is rendered through
/// its debug form.
fn cel_to_template_value(value: cel::Value) -> Value {
    match value {
        cel::Value::Null => Value::Null,
        cel::Value::Bool(b) => Value::Bool(b),
        cel::Value::Int(i) => Value::from(i),
        cel::Value::UInt(u) => Value::from(u),
        cel::Value::Float(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        cel::Value::String(s) => Value::String(s.to_string()),
        other => Value::String(format!("{:?}", other)),
    }
}

/// Scalars interpolate directly; structured values are encoded as JSON so
/// the rendered text is deterministic.
fn render_value(value: &Value) -> Value {
    match value {
        Value::Array(_) | Value::Object(_) => {
            Value::String(serde_json::to_string(value).unwrap_or_default())
        }
        other => other.clone(),
    }
}

fn required_str<'a>(
    args: &'a HashMap<String, Value>,
    name: &str,
    function: &str,
) -> tera::Result<&'a str> {
    args.get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| tera::Error::msg(format!("{}: missing string argument '{}'", function, name)))
}
