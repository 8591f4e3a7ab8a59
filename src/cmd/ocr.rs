//! The `ocr` subcommand.

use clap::Args;

use crate::{
    async_utils::io::write_json,
    ocr::{ExtractOpts, OcrPipeline},
    prelude::*,
    ui::{ProgressConfig, Ui},
};

/// OCR command line arguments.
#[derive(Debug, Args)]
pub struct OcrOpts {
    /// The PDF to OCR. It is never modified.
    pub input_path: PathBuf,

    /// Output location. Defaults to standard output.
    #[clap(short = 'o', long = "out")]
    pub output_path: Option<PathBuf>,

    #[clap(flatten)]
    pub extract_opts: ExtractOpts,
}

/// The `ocr` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_ocr(ui: Ui, opts: &OcrOpts) -> Result<()> {
    let pb = ui.new_progress_bar(
        &ProgressConfig {
            emoji: "🔍",
            msg: "OCRing pages",
            done_msg: "OCRed pages",
        },
        0,
    );
    let pipeline = OcrPipeline::with_local_tools(opts.extract_opts.limits())
        .with_progress(pb);

    let result = pipeline
        .extract_until(
            &opts.input_path,
            &opts.extract_opts.params(),
            super::ctrl_c(),
        )
        .await
        .with_context(|| format!("Failed to OCR {:?}", opts.input_path.display()))?;
    info!(pages = result.pages().len(), "Extracted text");
    write_json(opts.output_path.as_deref(), &result).await
}
