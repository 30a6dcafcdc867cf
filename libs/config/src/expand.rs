//! Recursive secret expansion over config trees
//!
//! Walks the free-form `config:` mapping of a module and resolves every
//! string leaf. Runs once per module, before the module is constructed.

use serde_json::Value;

use crate::secrets::SecretResolver;

/// Expand `${…}` tokens in every string leaf of `value`, in place
///
/// Non-string scalars are untouched. Provider errors are logged and the
/// affected string keeps its literal form.
pub fn expand_config_value(resolver: &SecretResolver, value: &mut Value) {
    match value {
        Value::String(s) => match resolver.resolve(s) {
            Ok(resolved) => *s = resolved,
            Err(err) => {
                tracing::warn!(error = %err, "secret resolution failed; keeping literal");
            }
        },
        Value::Array(items) => {
            for item in items {
                expand_config_value(resolver, item);
            }
        }
        Value::Object(map) => {
            for item in map.values_mut() {
                expand_config_value(resolver, item);
            }
        }
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}
