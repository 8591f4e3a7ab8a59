//! The `ingest` subcommand.

use std::sync::Arc;

use clap::Args;

use super::StoreOpts;
use crate::{
    async_utils::io::write_json,
    ingest::IngestService,
    models::CreateResourceRequest,
    ocr::{ExtractOpts, OcrPipeline},
    prelude::*,
    storage::{S3Storage, StorageOpts},
    ui::{ProgressConfig, Ui},
};

/// Ingest command line arguments.
#[derive(Debug, Args)]
pub struct IngestOpts {
    /// The user who owns the new resource.
    #[clap(long)]
    pub user_id: String,

    /// The S3 URL of an uploaded PDF.
    #[clap(long)]
    pub file_url: String,

    /// A title for the resource.
    #[clap(long)]
    pub title: String,

    /// Output location for the new resource. Defaults to standard output.
    #[clap(short = 'o', long = "out")]
    pub output_path: Option<PathBuf>,

    #[clap(flatten)]
    pub store_opts: StoreOpts,

    #[clap(flatten)]
    pub storage_opts: StorageOpts,

    #[clap(flatten)]
    pub extract_opts: ExtractOpts,
}

/// The `ingest` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_ingest(ui: Ui, opts: &IngestOpts) -> Result<()> {
    let storage = S3Storage::new(&opts.storage_opts.bucket).await?;
    let pb = ui.new_progress_bar(
        &ProgressConfig {
            emoji: "📄",
            msg: "Extracting text",
            done_msg: "Extracted text",
        },
        0,
    );
    let pipeline =
        OcrPipeline::with_local_tools(opts.extract_opts.limits()).with_progress(pb);
    let service = IngestService::new(Arc::new(storage), pipeline, opts.store_opts.store());

    let request = CreateResourceRequest {
        file_url: opts.file_url.clone(),
        title: opts.title.clone(),
    };
    let resource = service
        .create_resource(
            &opts.user_id,
            &request,
            &opts.extract_opts.params(),
            super::ctrl_c(),
        )
        .await
        .context("Failed to create resource")?;
    write_json(opts.output_path.as_deref(), &resource).await
}
