//! JSON Schema support.
//!
//! We ask LLMs for structured output using "strict" JSON Schemas. OpenAI's
//! strict mode requires every property to be listed in `required`, every
//! object to have `additionalProperties: false`, and does not support `$ref`
//! to local definitions. We generate these schemas from Rust types with
//! [`schemars`], and then use [`jsonschema`] to check what comes back.

use schemars::{JsonSchema, r#gen::SchemaSettings};

use crate::prelude::*;

/// Generate a JSON Schema for `T`, suitable for OpenAI's strict mode.
///
/// `T` should use `#[serde(deny_unknown_fields)]` on every struct, and should
/// not contain any `Option` fields.
pub fn strict_schema_for<T: JsonSchema>() -> Result<Value> {
    let generator = SchemaSettings::draft07()
        .with(|settings| {
            settings.inline_subschemas = true;
        })
        .into_generator();
    let schema = generator.into_root_schema_for::<T>();
    let mut schema = serde_json::to_value(schema).context("failed to serialize schema")?;
    strip_unsupported_keywords(&mut schema);
    Ok(schema)
}

/// Remove keywords that strict mode rejects, such as `format` on integers.
fn strip_unsupported_keywords(schema: &mut Value) {
    match schema {
        Value::Object(obj) => {
            if obj.get("format").is_some_and(|f| f != "date-time") {
                obj.remove("format");
            }
            obj.remove("minimum");
            for value in obj.values_mut() {
                strip_unsupported_keywords(value);
            }
        }
        Value::Array(arr) => {
            for value in arr {
                strip_unsupported_keywords(value);
            }
        }
        _ => {}
    }
}

/// A compiled JSON Schema validator.
pub struct SchemaValidator {
    validator: jsonschema::Validator,
}

impl SchemaValidator {
    /// Compile `schema`.
    pub fn new(schema: &Value) -> Result<Self> {
        let validator = jsonschema::validator_for(schema)
            .map_err(|err| anyhow!("invalid JSON Schema: {err}"))?;
        Ok(Self { validator })
    }

    /// Check `value` against our schema.
    pub fn validate(&self, value: &Value) -> Result<()> {
        self.validator
            .validate(value)
            .map_err(|err| anyhow!("{err}"))
            .with_context(|| format!("Failed to validate {}", value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// An outer type.
    #[allow(dead_code)]
    #[derive(JsonSchema)]
    #[serde(rename_all = "camelCase", deny_unknown_fields)]
    struct Outer {
        /// Some items.
        inner_items: Vec<Inner>,
        count: u32,
    }

    #[allow(dead_code)]
    #[derive(JsonSchema)]
    #[serde(deny_unknown_fields)]
    struct Inner {
        name: String,
    }

    #[test]
    fn strict_schemas_are_inlined_and_closed() -> Result<()> {
        let schema = strict_schema_for::<Outer>()?;
        let text = schema.to_string();
        assert!(!text.contains("$ref"), "{text}");
        assert!(!text.contains("\"format\""), "{text}");
        assert_eq!(schema["title"], "Outer");
        assert_eq!(schema["additionalProperties"], false);
        assert_eq!(
            schema["properties"]["innerItems"]["items"]["additionalProperties"],
            false
        );
        assert_eq!(schema["required"], json!(["count", "innerItems"]));
        Ok(())
    }

    #[test]
    fn values_are_validated() -> Result<()> {
        let validator = SchemaValidator::new(&strict_schema_for::<Outer>()?)?;
        validator.validate(&json!({ "innerItems": [{ "name": "a" }], "count": 1 }))?;
        assert!(
            validator
                .validate(&json!({ "innerItems": [{ "name": 1 }], "count": 1 }))
                .is_err()
        );
        assert!(
            validator
                .validate(&json!({ "innerItems": [], "count": 1, "extra": true }))
                .is_err()
        );
        Ok(())
    }
}
