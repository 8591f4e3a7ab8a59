//! Calling OpenAI-compatible chat completion APIs.

use std::{error, fmt, pin::Pin, time::Duration};

use async_openai::{
    Client,
    config::OpenAIConfig,
    error::OpenAIError,
    types::{CreateChatCompletionResponse, FinishReason},
};
use clap::Args;
use futures::{FutureExt as _, TryFutureExt as _};
use keen_retry::RetryResult;
use schemars::JsonSchema;
use tokio::time;

use crate::{
    prelude::*,
    retry::{
        IntoRetryResult as _, IsKnownTransient, retry_result_fatal, retry_result_ok,
        try_with_retry_result,
    },
};

/// Default model.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Our LLM-related options.
#[derive(Args, Clone, Debug)]
pub struct LlmOpts {
    /// The model to use.
    #[clap(long, default_value = DEFAULT_MODEL)]
    pub model: String,

    /// An upper limit on the number of completion tokens to generate. This may
    /// help prevent runaway responses, but it may also cause incomplete
    /// results. For English, many models have around 4 bytes per token.
    #[clap(long, default_value = "15000")]
    pub max_completion_tokens: u32,

    /// The temperature to use for sampling, between 0.0 and 2.0. Higher values
    /// make the output more random, while lower values make it more
    /// deterministic.
    #[clap(long, default_value = "0.3")]
    pub temperature: f32,

    /// A timeout, in seconds, for the LLM to return a complete response.
    /// Note that even if a request times out, you'll probably still be charged.
    /// Useful dealing with runaway responses and overloaded servers.
    #[clap(long)]
    pub timeout: Option<u64>,
}

impl Default for LlmOpts {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_owned(),
            max_completion_tokens: 15000,
            temperature: 0.3,
            timeout: None,
        }
    }
}

impl LlmOpts {
    /// Apply our timeout, if any, to a future.
    pub fn apply_timeout<'fut, T, E>(
        &self,
        future: impl Future<Output = Result<T, E>> + Send + 'fut,
    ) -> Pin<Box<dyn Future<Output = Result<T, LlmError<E>>> + Send + 'fut>>
    where
        T: Send + 'static,
        E: Send + 'static,
    {
        let future = future.map_err(LlmError::Native);
        if let Some(timeout) = self.timeout {
            time::timeout(Duration::from_secs(timeout), future)
                // Flatten `Result<Result<T, LlmError<E>>, Elapsed>`.
                .map(|result| match result {
                    Ok(inner) => inner,
                    Err(_) => Err(LlmError::Timeout),
                })
                .boxed()
        } else {
            future.boxed()
        }
    }
}

/// Create an OpenAI-compatible client, honoring `OPENAI_API_KEY` and
/// `OPENAI_API_BASE`.
pub fn create_llm_client() -> Result<Client<OpenAIConfig>> {
    let mut client_config = OpenAIConfig::new();
    if let Ok(api_key) = std::env::var("OPENAI_API_KEY") {
        client_config = client_config.with_api_key(api_key);
    }
    if let Ok(api_base) = std::env::var("OPENAI_API_BASE") {
        client_config = client_config.with_api_base(api_base);
    }
    Ok(Client::with_config(client_config))
}

/// Token usage.
#[derive(Clone, Debug, Default, JsonSchema, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    /// How many tokens were used in the prompt?
    pub prompt_tokens: u64,

    /// How many tokens were used in the response?
    pub completion_tokens: u64,
}

/// An error which occurred while calling an LLM.
#[derive(Debug)]
pub enum LlmError<E> {
    /// An error from the underlying client.
    Native(E),

    /// A timeout error.
    Timeout,
}

impl<E> IsKnownTransient for LlmError<E>
where
    E: IsKnownTransient,
{
    fn is_known_transient(&self) -> bool {
        match self {
            LlmError::Native(err) => err.is_known_transient(),
            // Runaway responses and network stalls may go better next time.
            LlmError::Timeout => true,
        }
    }
}

impl<E> fmt::Display for LlmError<E>
where
    E: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmError::Native(err) => write!(f, "LLM error: {err}"),
            LlmError::Timeout => write!(f, "LLM request timed out"),
        }
    }
}

impl<E> error::Error for LlmError<E>
where
    E: error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            LlmError::Native(err) => Some(err),
            LlmError::Timeout => None,
        }
    }
}

/// A chat completion response, parsed as JSON but not yet validated.
#[derive(Debug)]
pub struct ChatCompletionResponse {
    pub response: Value,
    pub token_usage: Option<TokenUsage>,
}

/// Build a `/chat/completions` request body asking for JSON matching `schema`.
pub fn build_chat_request(llm_opts: &LlmOpts, messages: Value, schema: &Value) -> Value {
    let name = schema
        .get("title")
        .and_then(|v| v.as_str())
        .unwrap_or("ResponseFormat");
    json!({
        "model": llm_opts.model,
        "messages": messages,
        "temperature": llm_opts.temperature,
        "max_completion_tokens": llm_opts.max_completion_tokens,
        // Don't keep copies of student documents on the server.
        "store": false,
        "response_format": {
            "type": "json_schema",
            "json_schema": {
                "name": name,
                "schema": schema,
                "strict": true,
            },
        },
    })
}

/// Make one chat completion call.
#[instrument(level = "debug", skip_all, fields(model = %llm_opts.model))]
pub async fn chat_completion(
    client: &Client<OpenAIConfig>,
    llm_opts: &LlmOpts,
    req: &Value,
) -> RetryResult<(), (), ChatCompletionResponse, anyhow::Error> {
    trace!(%req, "Request");
    let chat = client.chat();
    let chat_future = llm_opts.apply_timeout(chat.create_byot(req));
    let chat_result: Value = try_with_retry_result!(
        chat_future
            .await
            .into_retry_result(LlmError::<OpenAIError>::is_known_transient)
    );
    debug!(%chat_result, "OpenAI response");
    let response = try_with_retry_result!(
        serde_json::from_value::<CreateChatCompletionResponse>(chat_result)
            .context("Error parsing OpenAI response")
            .into_fatal()
    );

    let token_usage = response.usage.map(|usage| TokenUsage {
        prompt_tokens: u64::from(usage.prompt_tokens),
        completion_tokens: u64::from(usage.completion_tokens),
    });

    let Some(choice) = response.choices.first() else {
        return retry_result_fatal(anyhow!("No choices in OpenAI response"));
    };
    if choice.finish_reason == Some(FinishReason::ContentFilter) {
        return retry_result_fatal(anyhow!("Content filter triggered"));
    }
    let content = choice.message.content.as_deref().unwrap_or_default();
    let response = try_with_retry_result!(
        serde_json::from_str::<Value>(content)
            .with_context(|| format!(
                "Error parsing OpenAI response content: {:?}",
                content
            ))
            // The model didn't produce JSON. Give it another chance.
            .into_transient()
    );
    retry_result_ok(ChatCompletionResponse {
        response,
        token_usage,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_use_strict_json_schema() {
        let schema = json!({ "title": "QuizResponse", "type": "object" });
        let req = build_chat_request(
            &LlmOpts::default(),
            json!([{ "role": "user", "content": "hi" }]),
            &schema,
        );
        assert_eq!(req["model"], "gpt-4o-mini");
        assert_eq!(req["max_completion_tokens"], 15000);
        assert!((req["temperature"].as_f64().unwrap() - 0.3).abs() < 1e-6);
        assert_eq!(req["response_format"]["json_schema"]["name"], "QuizResponse");
        assert_eq!(req["response_format"]["json_schema"]["strict"], true);
        assert_eq!(req["response_format"]["json_schema"]["schema"], schema);
    }

    #[test]
    fn timeouts_are_transient() {
        let err = LlmError::<OpenAIError>::Timeout;
        assert!(err.is_known_transient());
        assert_eq!(err.to_string(), "LLM request timed out");
        let err = LlmError::Native(OpenAIError::InvalidArgument("bad".to_owned()));
        assert!(!err.is_known_transient());
    }
}
