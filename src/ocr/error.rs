//! Errors reported by the OCR pipeline.

use std::{error, fmt, time::Duration};

use super::engines::RecognizerError;
use crate::prelude::*;

/// Why an extraction failed. Every variant aborts the whole document; there
/// are no partial results.
#[derive(Debug)]
pub enum OcrError {
    /// The extraction parameters were unusable.
    InvalidParams(String),

    /// The source document could not be opened or parsed.
    DocumentParse {
        /// The document we were asked to read.
        path: PathBuf,
        /// The underlying problem.
        cause: anyhow::Error,
    },

    /// A single page could not be rasterized or recognized.
    PageProcessing {
        /// The 1-based number of the page that failed.
        page_number: usize,
        /// What went wrong with it.
        cause: PageFailure,
    },

    /// The caller stopped waiting before the extraction finished.
    Cancelled,
}

impl fmt::Display for OcrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OcrError::InvalidParams(msg) => write!(f, "invalid OCR parameters: {msg}"),
            OcrError::DocumentParse { path, cause } => write!(
                f,
                "could not read {:?} as a paginated document: {cause:#}",
                path.display()
            ),
            OcrError::PageProcessing { page_number, cause } => {
                write!(f, "failed to process page {page_number}: {cause}")
            }
            OcrError::Cancelled => write!(f, "OCR extraction was cancelled"),
        }
    }
}

impl error::Error for OcrError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            OcrError::DocumentParse { cause, .. } => Some(&**cause),
            OcrError::PageProcessing { cause, .. } => Some(cause),
            OcrError::InvalidParams(_) | OcrError::Cancelled => None,
        }
    }
}

/// What went wrong while processing one page.
#[derive(Debug)]
pub enum PageFailure {
    /// The page could not be rendered to an image.
    Rasterize(anyhow::Error),

    /// The recognizer rejected the image.
    Recognize(anyhow::Error),

    /// The recognizer stayed unavailable after all retries.
    RecognizerUnavailable(anyhow::Error),

    /// The page took longer than the per-page time limit.
    Timeout(Duration),
}

impl From<RecognizerError> for PageFailure {
    fn from(err: RecognizerError) -> Self {
        match err {
            RecognizerError::Unavailable(err) => PageFailure::RecognizerUnavailable(err),
            RecognizerError::Failed(err) => PageFailure::Recognize(err),
        }
    }
}

impl fmt::Display for PageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageFailure::Rasterize(err) => write!(f, "rasterization failed: {err:#}"),
            PageFailure::Recognize(err) => write!(f, "text recognition failed: {err:#}"),
            PageFailure::RecognizerUnavailable(err) => {
                write!(f, "text recognizer unavailable: {err:#}")
            }
            PageFailure::Timeout(limit) => {
                write!(f, "timed out after {:.1}s", limit.as_secs_f64())
            }
        }
    }
}

impl error::Error for PageFailure {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            PageFailure::Rasterize(err)
            | PageFailure::Recognize(err)
            | PageFailure::RecognizerUnavailable(err) => Some(&**err),
            PageFailure::Timeout(_) => None,
        }
    }
}
