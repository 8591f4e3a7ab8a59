//! The `schema` subcommand.

use clap::{Args, ValueEnum};
use schemars::schema_for;
use tokio::io::AsyncWriteExt as _;

use crate::{
    async_utils::io::create_writer,
    cmd::storage::ObjectInfo,
    models::{CreateResourceRequest, Note, Quiz, Resource},
    ocr::ExtractionResult,
    prelude::*,
    resources::{PageQuery, ResourcePage},
    storage::{UploadTicket, UploadUrlRequest},
    study::{NotesResponse, QuizResponse, prompt::ChatPrompt},
    validation::ValidationErrors,
};

/// The different schema types we support.
///
/// We parse these as PascalCase, because they represent type names.
#[derive(Debug, Clone, Copy, ValueEnum)]
#[clap(rename_all = "PascalCase")]
pub enum SchemaType {
    /// Chat prompt.
    ChatPrompt,
    /// Resource creation request.
    CreateResourceRequest,
    /// OCR output.
    ExtractionResult,
    /// Notes record.
    Note,
    /// Expected LLM response for notes.
    NotesResponse,
    /// Object metadata and download URL.
    ObjectInfo,
    /// Resource listing query.
    PageQuery,
    /// Quiz record.
    Quiz,
    /// Expected LLM response for quizzes.
    QuizResponse,
    /// Resource record.
    Resource,
    /// One page of resource summaries.
    ResourcePage,
    /// Upload ticket.
    UploadTicket,
    /// Upload URL request.
    UploadUrlRequest,
    /// Validation errors.
    ValidationErrors,
}

/// Schema command line arguments.
#[derive(Debug, Args)]
pub struct SchemaOpts {
    /// The schema type to generate.
    #[clap(value_enum, value_name = "TYPE")]
    pub schema_type: SchemaType,

    /// The output path to write the schema to.
    #[clap(short = 'o', long = "out")]
    pub output_path: Option<PathBuf>,
}

/// The `schema` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_schema(schema_opts: &SchemaOpts) -> Result<()> {
    let schema = match schema_opts.schema_type {
        SchemaType::ChatPrompt => schema_for!(ChatPrompt),
        SchemaType::CreateResourceRequest => schema_for!(CreateResourceRequest),
        SchemaType::ExtractionResult => schema_for!(ExtractionResult),
        SchemaType::Note => schema_for!(Note),
        SchemaType::NotesResponse => schema_for!(NotesResponse),
        SchemaType::ObjectInfo => schema_for!(ObjectInfo),
        SchemaType::PageQuery => schema_for!(PageQuery),
        SchemaType::Quiz => schema_for!(Quiz),
        SchemaType::QuizResponse => schema_for!(QuizResponse),
        SchemaType::Resource => schema_for!(Resource),
        SchemaType::ResourcePage => schema_for!(ResourcePage),
        SchemaType::UploadTicket => schema_for!(UploadTicket),
        SchemaType::UploadUrlRequest => schema_for!(UploadUrlRequest),
        SchemaType::ValidationErrors => schema_for!(ValidationErrors),
    };

    let mut wtr = create_writer(schema_opts.output_path.as_deref()).await?;
    let schema_str =
        serde_json::to_string_pretty(&schema).context("failed to serialize schema")?;
    wtr.write_all(schema_str.as_bytes())
        .await
        .context("failed to write schema")?;
    wtr.write_all(b"\n").await.context("failed to write schema")?;
    wtr.flush().await.context("failed to flush schema")?;
    Ok(())
}
