//! Interfaces to the external tools used by the OCR pipeline.
//!
//! The pipeline only knows about three small traits: something that can count
//! the pages in a document, something that can render one page to an image,
//! and something that can recognize the text in an image. The real
//! implementations shell out to Poppler and Tesseract. Tests use stand-ins.

use std::{error, fmt};

use crate::{prelude::*, retry::IsKnownTransient};

pub mod poppler;
pub mod tesseract;

/// Determines how many pages a document has.
#[async_trait]
pub trait PageCounter: Send + Sync + 'static {
    /// Count the pages in `document`. Must not modify the filesystem.
    async fn page_count(&self, document: &Path) -> Result<usize>;
}

/// Renders a single page of a document to an image.
#[async_trait]
pub trait Rasterizer: Send + Sync + 'static {
    /// Render page `page_number` (1-based) of `document` at `dpi`, writing the
    /// image to `output`.
    async fn render(
        &self,
        document: &Path,
        page_number: usize,
        dpi: u32,
        output: &Path,
    ) -> Result<()>;
}

/// Recognizes the text in an image.
#[async_trait]
pub trait Recognizer: Send + Sync + 'static {
    /// Recognize the text in `image`, using the recognizer's code for
    /// `language` (for example, `eng`).
    async fn recognize(
        &self,
        image: &Path,
        language: &str,
    ) -> Result<String, RecognizerError>;
}

/// An error reported by a [`Recognizer`].
#[derive(Debug)]
pub enum RecognizerError {
    /// The recognizer could not be reached or could not run right now. Worth
    /// retrying.
    Unavailable(anyhow::Error),

    /// The recognizer ran and failed, for example because of an unsupported
    /// language or an unreadable image.
    Failed(anyhow::Error),
}

impl IsKnownTransient for RecognizerError {
    fn is_known_transient(&self) -> bool {
        matches!(self, RecognizerError::Unavailable(_))
    }
}

impl fmt::Display for RecognizerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecognizerError::Unavailable(err) => {
                write!(f, "text recognizer unavailable: {err:#}")
            }
            RecognizerError::Failed(err) => write!(f, "text recognition failed: {err:#}"),
        }
    }
}

impl error::Error for RecognizerError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            RecognizerError::Unavailable(err) | RecognizerError::Failed(err) => {
                Some(&**err)
            }
        }
    }
}
