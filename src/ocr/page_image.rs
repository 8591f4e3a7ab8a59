//! Scoped temporary storage for a rendered page.

use tempfile::TempDir;

use crate::prelude::*;

/// A private temporary directory holding the image for one page. The
/// directory and everything in it are deleted when this is dropped, whether
/// the page succeeded, failed, or was cancelled.
#[derive(Debug)]
pub struct PageImage {
    tmpdir: Option<TempDir>,
    path: PathBuf,
    page_number: usize,
    dpi: u32,
}

impl PageImage {
    /// Reserve a unique location for the image of `page_number`.
    pub fn allocate(page_number: usize, dpi: u32) -> Result<Self> {
        let tmpdir = TempDir::with_prefix("sheek-page")
            .context("failed to create temporary directory for page image")?;
        let path = tmpdir.path().join(format!("page-{page_number}.png"));
        Ok(Self {
            tmpdir: Some(tmpdir),
            path,
            page_number,
            dpi,
        })
    }

    /// Where the image should be written.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The 1-based page this image belongs to.
    pub fn page_number(&self) -> usize {
        self.page_number
    }

    /// The resolution to render at.
    pub fn dpi(&self) -> u32 {
        self.dpi
    }
}

impl Drop for PageImage {
    fn drop(&mut self) {
        if let Some(tmpdir) = self.tmpdir.take() {
            let tmpdir_path = tmpdir.path().to_owned();
            if let Err(err) = tmpdir.close() {
                error!(
                    directory = ?tmpdir_path.display(),
                    "failed to delete temporary page image: {}",
                    err
                );
            }
        }
    }
}
