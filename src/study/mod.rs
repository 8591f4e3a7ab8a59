//! Generating quizzes and study notes from resources using an LLM.

use std::fmt;

use async_openai::{Client, config::OpenAIConfig};
use keen_retry::{ExponentialJitter, ResolvedResult, RetryResult};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;

use self::{
    llm::{
        ChatCompletionResponse, LlmOpts, TokenUsage, build_chat_request, chat_completion,
        create_llm_client,
    },
    prompt::{ChatPrompt, JsonObject},
};
use crate::{
    models::{Mcq, Note, NoteModule, Quiz, Resource, validate_mcqs, validate_note_modules},
    prelude::*,
    retry::{IntoRetryResult as _, retry_result_ok, try_with_retry_result},
    schema::{SchemaValidator, strict_schema_for},
    validation::{Validate, ValidationErrors},
};

pub mod llm;
pub mod prompt;

/// Built-in quiz prompt.
const QUIZ_PROMPT: &str = include_str!("prompts/quiz.toml");

/// Built-in notes prompt.
const NOTES_PROMPT: &str = include_str!("prompts/notes.toml");

/// A structured LLM response which can be turned into a stored record.
pub trait StudyResponse: fmt::Debug + DeserializeOwned + JsonSchema + Validate + Send {
    /// The record we produce.
    type Record;

    /// Wrap this response into a record belonging to `resource`'s owner.
    fn into_record(self, resource: &Resource) -> Self::Record;
}

/// The response we expect when asking for a quiz.
#[derive(Clone, Debug, Deserialize, JsonSchema, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct QuizResponse {
    /// The questions.
    pub multiple_choice_quiz: Vec<Mcq>,
}

impl Validate for QuizResponse {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        validate_mcqs("multipleChoiceQuiz", &self.multiple_choice_quiz, &mut errors);
        errors.into_result()
    }
}

impl StudyResponse for QuizResponse {
    type Record = Quiz;

    fn into_record(self, resource: &Resource) -> Quiz {
        Quiz::new(resource, self.multiple_choice_quiz)
    }
}

/// The response we expect when asking for notes.
#[derive(Clone, Debug, Deserialize, JsonSchema, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NotesResponse {
    /// The top-level sections of the notes.
    pub modules: Vec<NoteModule>,
}

impl Validate for NotesResponse {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        validate_note_modules("modules", &self.modules, &mut errors);
        errors.into_result()
    }
}

impl StudyResponse for NotesResponse {
    type Record = Note;

    fn into_record(self, resource: &Resource) -> Note {
        Note::new(resource, self.modules)
    }
}

/// A generated record, plus what it cost.
#[derive(Debug)]
pub struct Generated<T> {
    pub record: T,
    pub token_usage: Option<TokenUsage>,
}

/// Generates study materials.
pub struct StudyGenerator {
    client: Client<OpenAIConfig>,
    llm_opts: LlmOpts,
    quiz_prompt: ChatPrompt,
    notes_prompt: ChatPrompt,
}

impl StudyGenerator {
    /// Create a generator using the built-in prompts.
    pub fn new(llm_opts: LlmOpts) -> Result<Self> {
        Ok(Self {
            client: create_llm_client()?,
            llm_opts,
            quiz_prompt: ChatPrompt::from_toml(QUIZ_PROMPT)?,
            notes_prompt: ChatPrompt::from_toml(NOTES_PROMPT)?,
        })
    }

    /// Use `prompt` instead of the built-in quiz prompt.
    pub fn with_quiz_prompt(mut self, prompt: ChatPrompt) -> Self {
        self.quiz_prompt = prompt;
        self
    }

    /// Use `prompt` instead of the built-in notes prompt.
    pub fn with_notes_prompt(mut self, prompt: ChatPrompt) -> Self {
        self.notes_prompt = prompt;
        self
    }

    /// Generate a multiple-choice quiz for `resource`.
    #[instrument(level = "debug", skip_all, fields(resource_id = %resource.id))]
    pub async fn generate_quiz(&self, resource: &Resource) -> Result<Generated<Quiz>> {
        self.generate::<QuizResponse>(&self.quiz_prompt, resource)
            .await
            .context("Failed to generate quiz")
    }

    /// Generate study notes for `resource`.
    #[instrument(level = "debug", skip_all, fields(resource_id = %resource.id))]
    pub async fn generate_notes(&self, resource: &Resource) -> Result<Generated<Note>> {
        self.generate::<NotesResponse>(&self.notes_prompt, resource)
            .await
            .context("Failed to generate notes")
    }

    /// Run `prompt` against `resource`, retrying as needed.
    async fn generate<R: StudyResponse>(
        &self,
        prompt: &ChatPrompt,
        resource: &Resource,
    ) -> Result<Generated<R::Record>> {
        let messages = prompt
            .render_prompt(&template_bindings(resource))
            .context("Error rendering prompt")?;
        let schema = strict_schema_for::<R>()?;
        debug!(%schema, "Schema");
        let validator = SchemaValidator::new(&schema)?;
        let req = build_chat_request(&self.llm_opts, messages, &schema);

        // If we have a transient failure, back off exponentially.
        let jitter = ExponentialJitter::FromBackoffRange {
            backoff_range_millis: 1..=30_000,
            re_attempts: 5,
            jitter_ratio: 0.2,
        };

        let result = self
            .attempt::<R>(&req, &validator)
            .await
            .retry_with_async(|_| self.attempt::<R>(&req, &validator))
            .with_exponential_jitter(|| jitter)
            .await
            .inspect_fatal(|_, fatal_error| error!("FAILED with error {fatal_error:?}"))
            .inspect_recovered(|_, _, retry_errors_list| {
                warn!(
                    "succeeded after retrying {} times (failed attempts: [{}])",
                    retry_errors_list.len(),
                    keen_retry::loggable_retry_errors(retry_errors_list)
                )
            })
            .inspect_given_up(|_, retry_errors_list, fatal_error| {
                error!(
                    "FAILED after exhausting all {} retrying attempts with error {fatal_error:?}. Previous transient failures: [{}]",
                    retry_errors_list.len(),
                    keen_retry::loggable_retry_errors(retry_errors_list)
                )
            });

        let (response, token_usage) = match result {
            ResolvedResult::Ok { output, .. } | ResolvedResult::Recovered { output, .. } => {
                output
            }
            ResolvedResult::Fatal { error, .. } => return Err(error),
            ResolvedResult::GivenUp { fatal_error, .. }
            | ResolvedResult::Unrecoverable { fatal_error, .. } => return Err(fatal_error),
        };
        if let Some(usage) = &token_usage {
            info!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Token usage"
            );
        }
        Ok(Generated {
            record: response.into_record(resource),
            token_usage,
        })
    }

    /// Make a single attempt, checking the response against both the JSON
    /// Schema and our own validation rules.
    async fn attempt<R: StudyResponse>(
        &self,
        req: &Value,
        validator: &SchemaValidator,
    ) -> RetryResult<(), (), (R, Option<TokenUsage>), anyhow::Error> {
        let ChatCompletionResponse {
            response,
            token_usage,
        } = try_with_retry_result!(chat_completion(&self.client, &self.llm_opts, req).await);

        // A model that ignores the schema may do better on another try.
        try_with_retry_result!(validator.validate(&response).into_transient());
        let parsed = try_with_retry_result!(
            serde_json::from_value::<R>(response)
                .context("Error parsing LLM response")
                .into_transient()
        );
        try_with_retry_result!(
            parsed
                .validate()
                .context("LLM response failed validation")
                .into_transient()
        );
        retry_result_ok((parsed, token_usage))
    }
}

/// Template bindings for a resource.
fn template_bindings(resource: &Resource) -> JsonObject {
    let mut bindings = JsonObject::new();
    bindings.insert("title".to_owned(), json!(resource.title));
    bindings.insert("page_count".to_owned(), json!(resource.content.total_pages));
    bindings.insert("text".to_owned(), json!(resource.full_text()));
    bindings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CreateResourceRequest;

    fn resource() -> Resource {
        Resource::new(
            "alice",
            &CreateResourceRequest {
                file_url: "https://bucket.s3.amazonaws.com/dev/resource/x.pdf".to_owned(),
                title: "Cell Biology".to_owned(),
            },
            vec!["Cells are small.".to_owned(), "Mitochondria & energy.".to_owned()],
        )
    }

    #[test]
    fn built_in_prompts_render() -> Result<()> {
        let bindings = template_bindings(&resource());
        for prompt in [QUIZ_PROMPT, NOTES_PROMPT] {
            let messages = ChatPrompt::from_toml(prompt)?.render_prompt(&bindings)?;
            let messages = messages.as_array().expect("messages should be an array");
            assert_eq!(messages[0]["role"], "system");
            let user = messages[1]["content"].as_str().unwrap_or_default();
            assert!(user.contains("Title: Cell Biology"), "{user}");
            assert!(user.contains("Pages: 2"), "{user}");
            assert!(user.contains("Cells are small.\n\nMitochondria & energy."));
        }
        Ok(())
    }

    #[test]
    fn response_schemas_are_strict() -> Result<()> {
        for schema in [
            strict_schema_for::<QuizResponse>()?,
            strict_schema_for::<NotesResponse>()?,
        ] {
            assert!(!schema.to_string().contains("$ref"));
            assert_eq!(schema["additionalProperties"], false);
        }
        let quiz = strict_schema_for::<QuizResponse>()?;
        assert_eq!(
            quiz["properties"]["multipleChoiceQuiz"]["items"]["required"],
            json!(["answer", "options", "question"])
        );
        Ok(())
    }

    #[test]
    fn quiz_responses_become_quizzes() -> Result<()> {
        let response = serde_json::from_value::<QuizResponse>(json!({
            "multipleChoiceQuiz": [{
                "question": " What powers the cell? ",
                "options": ["Mitochondria", "Ribosomes"],
                "answer": "Mitochondria",
            }],
        }))?;
        response.validate()?;
        let resource = resource();
        let quiz = response.into_record(&resource);
        assert_eq!(quiz.user_id, "alice");
        assert_eq!(quiz.resource_id, resource.id);
        assert_eq!(quiz.mcqs[0].question, "What powers the cell?");
        Ok(())
    }

    #[test]
    fn invalid_responses_are_rejected() -> Result<()> {
        let response = serde_json::from_value::<QuizResponse>(json!({
            "multipleChoiceQuiz": [],
        }))?;
        let err = response.validate().unwrap_err();
        assert_eq!(err.to_string(), "At least one MCQ required");

        let notes = serde_json::from_value::<NotesResponse>(json!({
            "modules": [{ "title": "", "overview": "o", "submodules": [] }],
        }))?;
        let err = notes.validate().unwrap_err();
        assert_eq!(err.errors[0].field, "modules[0].title");
        Ok(())
    }

    #[test]
    fn schema_and_semantic_checks_agree_on_shape() -> Result<()> {
        let validator = SchemaValidator::new(&strict_schema_for::<QuizResponse>()?)?;
        assert!(
            validator
                .validate(&json!({ "multipleChoiceQuiz": [{ "question": "q" }] }))
                .is_err()
        );
        Ok(())
    }
}
