//! The `quiz` and `notes` subcommands.

use clap::Args;
use uuid::Uuid;

use super::StoreOpts;
use crate::{
    async_utils::io::{append_jsonl, write_json},
    prelude::*,
    study::{
        StudyGenerator,
        llm::{LlmOpts, TokenUsage},
        prompt::ChatPrompt,
    },
    ui::{ProgressConfig, Ui},
};

/// Study material command line arguments.
#[derive(Debug, Args)]
pub struct StudyOpts {
    /// The owner of the resource.
    #[clap(long)]
    pub user_id: String,

    /// The resource to study.
    #[clap(long)]
    pub resource_id: Uuid,

    /// A TOML or JSON prompt to use instead of the built-in one.
    #[clap(long)]
    pub prompt: Option<PathBuf>,

    /// Also append the generated record to this JSON Lines file.
    #[clap(long)]
    pub save_to: Option<PathBuf>,

    /// Output location. Defaults to standard output.
    #[clap(short = 'o', long = "out")]
    pub output_path: Option<PathBuf>,

    #[clap(flatten)]
    pub store_opts: StoreOpts,

    #[clap(flatten)]
    pub llm_opts: LlmOpts,
}

/// Which kind of study material to generate.
#[derive(Clone, Copy, Debug)]
pub enum StudyKind {
    Quiz,
    Notes,
}

/// The `quiz` and `notes` subcommands.
#[instrument(level = "debug", skip(ui, opts))]
pub async fn cmd_study(ui: Ui, kind: StudyKind, opts: &StudyOpts) -> Result<()> {
    let resource = opts
        .store_opts
        .store()
        .find(&opts.user_id, opts.resource_id)
        .await?;

    let mut generator = StudyGenerator::new(opts.llm_opts.clone())?;
    if let Some(path) = &opts.prompt {
        let prompt = ChatPrompt::load(path).await?;
        generator = match kind {
            StudyKind::Quiz => generator.with_quiz_prompt(prompt),
            StudyKind::Notes => generator.with_notes_prompt(prompt),
        };
    }

    let spinner = ui.new_spinner(&ProgressConfig {
        emoji: "🧠",
        msg: "Asking the LLM",
        done_msg: "LLM answered",
    });
    let (record, token_usage) = match kind {
        StudyKind::Quiz => {
            let generated = generator.generate_quiz(&resource).await?;
            (serde_json::to_value(generated.record)?, generated.token_usage)
        }
        StudyKind::Notes => {
            let generated = generator.generate_notes(&resource).await?;
            (serde_json::to_value(generated.record)?, generated.token_usage)
        }
    };
    spinner.finish();
    report_token_usage(&ui, token_usage.as_ref());

    if let Some(path) = &opts.save_to {
        append_jsonl(path, &record).await?;
    }
    write_json(opts.output_path.as_deref(), &record).await
}

/// Tell the user how many tokens we used.
fn report_token_usage(ui: &Ui, token_usage: Option<&TokenUsage>) {
    if let Some(usage) = token_usage {
        ui.display_message(
            "📈",
            &format!(
                "{} input tokens and {} output tokens used",
                usage.prompt_tokens, usage.completion_tokens,
            ),
        );
    }
}
