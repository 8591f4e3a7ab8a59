//! Per-page OCR of paginated documents.
//!
//! An [`OcrPipeline`] counts the pages in a document, then runs one job per
//! page: render the page to a scoped temporary image, recognize its text, and
//! return a [`PageResult`]. Jobs run concurrently up to a limit, and may finish
//! in any order. Once every job has succeeded, the results are sorted back into
//! page order. If any page fails, the whole document fails and any unfinished
//! page jobs are dropped.

use std::{sync::Arc, time::Duration};

use clap::Args;
use futures::{StreamExt as _, TryStreamExt as _, stream};
use indicatif::ProgressBar;
use keen_retry::{ExponentialJitter, ResolvedResult};
use schemars::JsonSchema;
use tokio::time;

use self::{
    engines::{
        PageCounter, Rasterizer, Recognizer, RecognizerError, poppler::Poppler,
        tesseract::Tesseract,
    },
    page_image::PageImage,
};
use crate::{prelude::*, retry::IntoRetryResult as _, retry::IsKnownTransient as _};

pub mod engines;
mod error;
mod page_image;

pub use self::error::{OcrError, PageFailure};

/// Default recognizer language.
pub const DEFAULT_LANGUAGE: &str = "eng";

/// Default rasterization resolution.
pub const DEFAULT_DPI: u32 = 300;

/// Parameters for a single extraction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractParams {
    /// Recognizer language code, for example `eng`.
    pub language: String,

    /// Rasterization resolution.
    pub dpi: u32,
}

impl Default for ExtractParams {
    fn default() -> Self {
        Self {
            language: DEFAULT_LANGUAGE.to_owned(),
            dpi: DEFAULT_DPI,
        }
    }
}

impl ExtractParams {
    /// Reject parameters that can never work. Whether the recognizer actually
    /// supports `language` is only discovered when it runs.
    fn validate(&self) -> Result<(), OcrError> {
        if self.language.trim().is_empty() {
            return Err(OcrError::InvalidParams(
                "language must not be empty".to_owned(),
            ));
        }
        if self.dpi == 0 {
            return Err(OcrError::InvalidParams("dpi must be positive".to_owned()));
        }
        Ok(())
    }
}

/// Limits applied to every extraction run by an [`OcrPipeline`].
#[derive(Clone, Debug)]
pub struct PipelineLimits {
    /// Maximum number of pages processed at once.
    pub concurrency_limit: usize,

    /// Maximum time allowed for one page, including retries.
    pub page_timeout: Option<Duration>,

    /// How many times to retry a page whose recognizer was unavailable.
    pub recognizer_retries: u8,
}

impl Default for PipelineLimits {
    fn default() -> Self {
        Self {
            concurrency_limit: num_cpus::get(),
            page_timeout: Some(Duration::from_secs(600)),
            recognizer_retries: 3,
        }
    }
}

/// Command-line options controlling OCR.
#[derive(Args, Clone, Debug)]
pub struct ExtractOpts {
    /// The Tesseract language code to recognize, for example `eng` or
    /// `eng+fra`.
    #[clap(long, default_value = DEFAULT_LANGUAGE)]
    pub language: String,

    /// The DPI to use for rasterization.
    #[clap(long, default_value_t = DEFAULT_DPI)]
    pub dpi: u32,

    /// Max number of pages to OCR at a time. Defaults to the number of CPUs.
    #[clap(long)]
    pub page_jobs: Option<usize>,

    /// Give up on a page after this many seconds. Use 0 to wait forever.
    #[clap(long, default_value = "600")]
    pub page_timeout: u64,

    /// How many times to retry a page when the recognizer is unavailable.
    #[clap(long, default_value = "3")]
    pub recognizer_retries: u8,
}

impl ExtractOpts {
    /// Per-document parameters.
    pub fn params(&self) -> ExtractParams {
        ExtractParams {
            language: self.language.clone(),
            dpi: self.dpi,
        }
    }

    /// Pipeline-wide limits.
    pub fn limits(&self) -> PipelineLimits {
        PipelineLimits {
            concurrency_limit: self.page_jobs.unwrap_or_else(num_cpus::get),
            page_timeout: (self.page_timeout > 0)
                .then(|| Duration::from_secs(self.page_timeout)),
            recognizer_retries: self.recognizer_retries,
        }
    }
}

/// The recognized text of one page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageResult {
    /// 1-based page number.
    pub page_number: usize,

    /// Recognized text.
    pub text: String,
}

/// The text of every page in a document, in page order.
#[derive(Clone, Debug, PartialEq, Eq, JsonSchema, Serialize)]
pub struct ExtractionResult {
    /// Page texts. Index `i` holds page `i + 1`.
    pages: Vec<String>,
}

impl ExtractionResult {
    /// Assemble a result from completed page jobs, in whatever order they
    /// finished.
    fn from_page_results(mut results: Vec<PageResult>, page_count: usize) -> Self {
        results.sort_by_key(|result| result.page_number);
        debug_assert!(
            results.len() == page_count
                && results
                    .iter()
                    .enumerate()
                    .all(|(idx, result)| result.page_number == idx + 1),
            "page results must cover 1..={page_count} exactly once"
        );
        Self {
            pages: results.into_iter().map(|result| result.text).collect(),
        }
    }

    /// Page texts, in page order.
    pub fn pages(&self) -> &[String] {
        &self.pages
    }

    /// Take ownership of the page texts.
    pub fn into_pages(self) -> Vec<String> {
        self.pages
    }
}

/// Extracts per-page text from documents.
#[derive(Clone)]
pub struct OcrPipeline {
    page_counter: Arc<dyn PageCounter>,
    rasterizer: Arc<dyn Rasterizer>,
    recognizer: Arc<dyn Recognizer>,
    limits: PipelineLimits,
    progress: Option<ProgressBar>,
}

impl OcrPipeline {
    /// Create a pipeline from its collaborators.
    pub fn new(
        page_counter: Arc<dyn PageCounter>,
        rasterizer: Arc<dyn Rasterizer>,
        recognizer: Arc<dyn Recognizer>,
        limits: PipelineLimits,
    ) -> Self {
        Self {
            page_counter,
            rasterizer,
            recognizer,
            limits,
            progress: None,
        }
    }

    /// Create a pipeline using the locally installed Poppler and Tesseract.
    pub fn with_local_tools(limits: PipelineLimits) -> Self {
        let poppler = Arc::new(Poppler::new());
        Self::new(poppler.clone(), poppler, Arc::new(Tesseract::new()), limits)
    }

    /// Tick `progress` once for every page completed.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Count the pages in `document`.
    #[instrument(level = "debug", skip_all, fields(path = %document.display()))]
    pub async fn page_count(&self, document: &Path) -> Result<usize, OcrError> {
        let page_count = self.page_counter.page_count(document).await.map_err(|cause| {
            OcrError::DocumentParse {
                path: document.to_owned(),
                cause,
            }
        })?;
        if page_count == 0 {
            return Err(OcrError::DocumentParse {
                path: document.to_owned(),
                cause: anyhow!("document has no pages"),
            });
        }
        Ok(page_count)
    }

    /// Extract the text of every page of `document`.
    ///
    /// The caller keeps ownership of `document`. Dropping the returned future
    /// cancels every outstanding page job.
    #[instrument(level = "debug", skip_all, fields(path = %document.display(), language = %params.language, dpi = params.dpi))]
    pub async fn extract(
        &self,
        document: &Path,
        params: &ExtractParams,
    ) -> Result<ExtractionResult, OcrError> {
        params.validate()?;
        let page_count = self.page_count(document).await?;
        if let Some(progress) = &self.progress {
            progress.set_length(u64::try_from(page_count).unwrap_or(u64::MAX));
        }

        let results = stream::iter(1..=page_count)
            .map(|page_number| {
                self.process_page(document, page_number, page_count, params)
            })
            // Process pages concurrently, up to the concurrency limit, in
            // whatever order they finish.
            .buffer_unordered(self.limits.concurrency_limit.max(1))
            // Stop at the first failure, dropping any pages still in flight.
            .try_collect::<Vec<_>>()
            .await?;

        Ok(ExtractionResult::from_page_results(results, page_count))
    }

    /// Like [`OcrPipeline::extract`], but give up with [`OcrError::Cancelled`]
    /// as soon as `cancelled` completes.
    pub async fn extract_until<C>(
        &self,
        document: &Path,
        params: &ExtractParams,
        cancelled: C,
    ) -> Result<ExtractionResult, OcrError>
    where
        C: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            () = cancelled => {
                warn!(path = %document.display(), "OCR extraction cancelled");
                Err(OcrError::Cancelled)
            }
            result = self.extract(document, params) => result,
        }
    }

    /// Run one page job, applying the page timeout.
    #[instrument(level = "debug", skip(self, document, params))]
    async fn process_page(
        &self,
        document: &Path,
        page_number: usize,
        page_count: usize,
        params: &ExtractParams,
    ) -> Result<PageResult, OcrError> {
        let job = self.rasterize_and_recognize(document, page_number, params);
        let result = match self.limits.page_timeout {
            Some(limit) => time::timeout(limit, job)
                .await
                .unwrap_or(Err(PageFailure::Timeout(limit))),
            None => job.await,
        };
        let text = result.map_err(|cause| {
            error!(page_number, %cause, "Page failed");
            OcrError::PageProcessing { page_number, cause }
        })?;

        info!("Processed page {}/{}", page_number, page_count);
        if let Some(progress) = &self.progress {
            progress.inc(1);
        }
        Ok(PageResult { page_number, text })
    }

    /// Render a page to a scoped image and recognize it. The image is deleted
    /// when this returns, fails, or is dropped.
    async fn rasterize_and_recognize(
        &self,
        document: &Path,
        page_number: usize,
        params: &ExtractParams,
    ) -> Result<String, PageFailure> {
        let image = PageImage::allocate(page_number, params.dpi)
            .map_err(PageFailure::Rasterize)?;
        self.rasterizer
            .render(document, image.page_number(), image.dpi(), image.path())
            .await
            .map_err(PageFailure::Rasterize)?;
        let text = self
            .recognize_with_retry(image.path(), &params.language)
            .await?;
        drop(image);
        Ok(text)
    }

    /// Recognize an image, backing off and retrying while the recognizer is
    /// unavailable.
    async fn recognize_with_retry(
        &self,
        image: &Path,
        language: &str,
    ) -> Result<String, PageFailure> {
        let attempt = || async {
            self.recognizer
                .recognize(image, language)
                .await
                .into_retry_result(RecognizerError::is_known_transient)
        };

        // Keep unit tests fast.
        let backoff_range_millis = if cfg!(test) { 1..=20 } else { 100..=10_000 };
        let jitter = ExponentialJitter::FromBackoffRange {
            backoff_range_millis,
            re_attempts: self.limits.recognizer_retries,
            jitter_ratio: 0.2,
        };

        let result = attempt()
            .await
            .retry_with_async(|_| attempt())
            .with_exponential_jitter(|| jitter)
            .await
            .inspect_recovered(|_, _, retry_errors_list| {
                warn!(
                    "recognizer recovered after retrying {} times (failed attempts: [{}])",
                    retry_errors_list.len(),
                    keen_retry::loggable_retry_errors(retry_errors_list)
                )
            })
            .inspect_given_up(|_, retry_errors_list, fatal_error| {
                error!(
                    "giving up on recognizer after {} retries with error {fatal_error:?}",
                    retry_errors_list.len(),
                )
            });

        match result {
            ResolvedResult::Ok { output, .. } | ResolvedResult::Recovered { output, .. } => {
                Ok(output)
            }
            ResolvedResult::Fatal { error, .. } => Err(error.into()),
            ResolvedResult::GivenUp { fatal_error, .. }
            | ResolvedResult::Unrecoverable { fatal_error, .. } => Err(fatal_error.into()),
        }
    }
}
