//! Template substitution engine.
//!
//! Renders templates against a nested substitution context. Unknown tokens
//! are errors, not empty output. A fixed set of helper functions is
//! registered once at construction and available in every template.

mod functions;

use std::sync::Mutex;

use tera::Tera;

use crate::error::{GatewayError, GatewayResult};

pub struct SubstitutionEngine {
    tera: Mutex<Tera>,
}

impl SubstitutionEngine {
    pub fn new() -> Self {
        let mut tera = Tera::default();
        tera.autoescape_on(vec![]);
        tera.register_function("currentTimeMillis", functions::CurrentTimeMillis);
        tera.register_function("currentTimeStamp", functions::CurrentTimeStamp);
        tera.register_function("jq", functions::Jq);
        tera.register_function("replaceAtSymbol", functions::ReplaceAtSymbol);
        tera.register_function("eval", functions::Eval);
        Self { tera: Mutex::new(tera) }
    }

    /// Render a template against the given substitution context. The context
    /// must serialize to a JSON object.
    pub fn render(&self, template: &str, context: &serde_json::Value) -> GatewayResult<String> {
        tracing::debug!(template, "rendering template");
        let context = tera::Context::from_value(context.clone())
            .map_err(|e| GatewayError::SubstitutionFailed(format!("invalid context: {}", e)))?;
        let mut tera = self.tera.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        tera.render_str(template, &context)
            .map_err(|e| GatewayError::SubstitutionFailed(describe_template_error(&e)))
    }
}

impl Default for SubstitutionEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Tera reports the interesting cause (unknown variable, failed function)
/// one or two levels down the source chain; collect the whole chain.
fn describe_template_error(error: &tera::Error) -> String {
    let mut message = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
