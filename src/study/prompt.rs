//! Chat prompts, rendered with Handlebars.

use handlebars::Handlebars;
use schemars::JsonSchema;
use serde_json::Map;

use crate::{async_utils::io::read_json_or_toml, prelude::*};

/// A JSON object.
pub type JsonObject = Map<String, Value>;

/// Render a prompt as JSON, filling in template values for any string fields.
pub trait RenderTemplate {
    type Output;

    /// Render the template.
    fn render_template(
        &self,
        handlebars: &Handlebars,
        bindings: &JsonObject,
    ) -> Result<Self::Output>;
}

/// A chat completion prompt.
#[derive(Clone, Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ChatPrompt {
    /// The developer (aka "system") message, if any.
    pub developer: Option<String>,

    /// Messages.
    pub messages: Vec<Message>,
}

impl ChatPrompt {
    /// Parse a prompt from TOML.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).context("Failed to parse prompt TOML")
    }

    /// Load a prompt from a TOML or JSON file.
    pub async fn load(path: &Path) -> Result<Self> {
        read_json_or_toml(path).await
    }

    /// Render the prompt as a JSON array of OpenAI-style messages.
    pub fn render_prompt(&self, bindings: &JsonObject) -> Result<Value> {
        let mut handlebars = Handlebars::new();
        // Page text is plain text, not HTML.
        handlebars.register_escape_fn(handlebars::no_escape);
        handlebars.set_strict_mode(true);
        self.render_template(&handlebars, bindings)
    }
}

impl RenderTemplate for ChatPrompt {
    type Output = Value;

    fn render_template(
        &self,
        handlebars: &Handlebars,
        bindings: &JsonObject,
    ) -> Result<Self::Output> {
        let mut messages = Vec::new();
        if let Some(developer) = &self.developer {
            messages.push(json!({
                "role": "system",
                "content": handlebars.render_template(developer, bindings)?,
            }));
        }
        for message in &self.messages {
            messages.extend(message.render_template(handlebars, bindings)?);
        }
        Ok(Value::Array(messages))
    }
}

/// A message, and optionally a response (represented as a JSON object).
#[derive(Clone, Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Message {
    /// The user message.
    pub user: String,

    /// An example assistant response. This is always a JSON object.
    pub assistant: Option<JsonObject>,
}

impl RenderTemplate for Message {
    type Output = Vec<Value>;

    fn render_template(
        &self,
        handlebars: &Handlebars,
        bindings: &JsonObject,
    ) -> Result<Self::Output> {
        let user = handlebars.render_template(&self.user, bindings)?;
        let mut messages = vec![json!({ "role": "user", "content": user })];
        if let Some(assistant) = &self.assistant {
            let assistant = assistant.render_template(handlebars, bindings)?;
            messages
                .push(json!({ "role": "assistant", "content": assistant.to_string() }));
        }
        Ok(messages)
    }
}

impl RenderTemplate for Value {
    type Output = Value;

    fn render_template(
        &self,
        handlebars: &Handlebars,
        bindings: &JsonObject,
    ) -> Result<Self::Output> {
        match self {
            Value::String(s) => {
                let rendered = handlebars.render_template(s, bindings)?;
                Ok(Value::String(rendered))
            }
            Value::Object(obj) => obj.render_template(handlebars, bindings),
            Value::Array(arr) => arr
                .iter()
                .map(|value| value.render_template(handlebars, bindings))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            _ => Ok(self.clone()),
        }
    }
}

impl RenderTemplate for JsonObject {
    type Output = Value;

    fn render_template(
        &self,
        handlebars: &Handlebars,
        bindings: &JsonObject,
    ) -> Result<Self::Output> {
        let mut output = Map::new();
        for (key, value) in self {
            output.insert(key.clone(), value.render_template(handlebars, bindings)?);
        }
        Ok(Value::Object(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bindings() -> JsonObject {
        let mut bindings = JsonObject::new();
        bindings.insert("title".to_owned(), json!("Cells & Tissues"));
        bindings.insert("text".to_owned(), json!("<p> is not HTML here"));
        bindings
    }

    #[test]
    fn prompts_render_to_messages() -> Result<()> {
        let prompt = ChatPrompt::from_toml(
            r#"
developer = "You write about {{title}}."

[[messages]]
user = "Example"
assistant = { answer = "{{title}}" }

[[messages]]
user = "{{text}}"
"#,
        )?;
        let rendered = prompt.render_prompt(&bindings())?;
        assert_eq!(
            rendered,
            json!([
                { "role": "system", "content": "You write about Cells & Tissues." },
                { "role": "user", "content": "Example" },
                { "role": "assistant", "content": r#"{"answer":"Cells & Tissues"}"# },
                { "role": "user", "content": "<p> is not HTML here" },
            ])
        );
        Ok(())
    }

    #[test]
    fn missing_bindings_are_errors() -> Result<()> {
        let prompt = ChatPrompt::from_toml("[[messages]]\nuser = \"{{nope}}\"\n")?;
        assert!(prompt.render_prompt(&bindings()).is_err());
        Ok(())
    }

    #[test]
    fn unknown_prompt_fields_are_rejected() {
        assert!(ChatPrompt::from_toml("system = \"x\"\nmessages = []\n").is_err());
    }
}
