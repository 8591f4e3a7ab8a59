use std::str::FromStr;

use clap::{Parser, Subcommand};
use tracing_subscriber::{
    EnvFilter, Layer as _, filter::Directive, fmt::format::FmtSpan, layer::SubscriberExt,
    util::SubscriberInitExt as _,
};

use self::{prelude::*, ui::Ui};

mod async_utils;
mod aws;
mod cmd;
mod cpu_limit;
mod ingest;
mod models;
mod ocr;
mod prelude;
mod resources;
mod retry;
mod schema;
mod storage;
mod study;
mod ui;
mod validation;

/// OCR PDFs and turn them into quizzes and study notes.
#[derive(Debug, Parser)]
#[clap(
    version,
    author,
    after_help = r#"
Environment Variables:
  - OPENAI_API_BASE (optional): Override the server URL.
  - OPENAI_API_KEY: The OpenAI key to use.
  - AWS_S3_BUCKET (optional): The bucket for uploads. Defaults to "sheek-backend".
  - DEPLOY_ENV (optional): Key prefix for uploads. Defaults to "dev".

  Standard AWS environment variables and credential files
  are used for S3.

  These variables may be set in a standard `.env` file.

External Tools:
  The `ocr` and `ingest` commands require `pdfinfo` and `pdftocairo`
  (from poppler-utils) and `tesseract`.
"#
)]
struct Opts {
    #[clap(subcommand)]
    subcmd: Cmd,
}

/// The subcommands we support.
#[derive(Debug, Subcommand)]
enum Cmd {
    /// OCR a local PDF, printing the text of each page.
    Ocr(cmd::ocr::OcrOpts),
    /// Download an uploaded PDF, OCR it, and save it as a resource.
    Ingest(cmd::ingest::IngestOpts),
    /// Create a presigned URL for uploading a file.
    UploadUrl(cmd::storage::UploadUrlOpts),
    /// Show metadata and a download URL for an uploaded file.
    ObjectInfo(cmd::storage::ObjectInfoOpts),
    /// List a user's resources, newest first.
    Resources(cmd::resources::ResourcesOpts),
    /// Generate a multiple-choice quiz for a resource.
    Quiz(cmd::study::StudyOpts),
    /// Generate study notes for a resource.
    Notes(cmd::study::StudyOpts),
    /// Print schemas for input and output formats.
    Schema(cmd::schema::SchemaOpts),
}

impl Cmd {
    /// Are we using stdout for output?
    fn using_stdout_for_output(&self) -> bool {
        match self {
            Cmd::Ocr(opts) => opts.output_path.is_none(),
            Cmd::Ingest(opts) => opts.output_path.is_none(),
            Cmd::UploadUrl(opts) => opts.output_path.is_none(),
            Cmd::ObjectInfo(opts) => opts.output_path.is_none(),
            Cmd::Resources(opts) => opts.output_path.is_none(),
            Cmd::Quiz(opts) | Cmd::Notes(opts) => opts.output_path.is_none(),
            Cmd::Schema(opts) => opts.output_path.is_none(),
        }
    }
}

/// Our entry point, which can return an error. [`anyhow::Result`] will
/// automatically print a nice error message with optional backtrace.
#[tokio::main]
async fn main() -> Result<()> {
    let ui = Ui::init();

    // Initialize tracing.
    let directive =
        Directive::from_str("info").expect("built-in directive should be valid");
    let env_filter = EnvFilter::builder()
        .with_default_directive(directive)
        .from_env_lossy();

    let subscriber = tracing_subscriber::fmt::layer()
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .with_writer(ui.get_stderr_writer())
        .with_filter(env_filter);

    // We can stack multiple layers here if we need to.
    tracing_subscriber::registry().with(subscriber).init();

    // Call our real `main` function now that logging is set up.
    real_main(ui).await
}

/// Our real entry point.
#[instrument(level = "debug", name = "main", skip_all)]
async fn real_main(ui: Ui) -> Result<()> {
    // Load environment variables from a `.env` file, if it exists.
    dotenvy::dotenv().ok();

    // Parse command-line arguments.
    let opts = Opts::parse();
    debug!("Parsed options: {:?}", opts);

    // Hide the progress bar if we're using stdout for output.
    if opts.subcmd.using_stdout_for_output() {
        ui.hide_progress_bars();
    }

    // Run the appropriate subcommand.
    match &opts.subcmd {
        Cmd::Ocr(opts) => cmd::ocr::cmd_ocr(ui, opts).await?,
        Cmd::Ingest(opts) => cmd::ingest::cmd_ingest(ui, opts).await?,
        Cmd::UploadUrl(opts) => cmd::storage::cmd_upload_url(opts).await?,
        Cmd::ObjectInfo(opts) => cmd::storage::cmd_object_info(opts).await?,
        Cmd::Resources(opts) => cmd::resources::cmd_resources(opts).await?,
        Cmd::Quiz(opts) => {
            cmd::study::cmd_study(ui, cmd::study::StudyKind::Quiz, opts).await?
        }
        Cmd::Notes(opts) => {
            cmd::study::cmd_study(ui, cmd::study::StudyKind::Notes, opts).await?
        }
        Cmd::Schema(schema_opts) => cmd::schema::cmd_schema(schema_opts).await?,
    }
    Ok(())
}
