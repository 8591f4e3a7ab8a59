//! Creating resources from uploaded PDFs.

use std::sync::Arc;

use tempfile::NamedTempFile;

use crate::{
    models::{CreateResourceRequest, Resource},
    ocr::{ExtractParams, OcrPipeline},
    prelude::*,
    resources::ResourceStore,
    storage::{ObjectStore, s3_key_from_url},
    validation::Validate,
};

/// Downloads uploaded PDFs, OCRs them, and records the result.
pub struct IngestService {
    store: Arc<dyn ObjectStore>,
    pipeline: OcrPipeline,
    resources: ResourceStore,
}

impl IngestService {
    /// Create a new ingestion service.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        pipeline: OcrPipeline,
        resources: ResourceStore,
    ) -> Self {
        Self {
            store,
            pipeline,
            resources,
        }
    }

    /// Create a resource for `user_id` from the PDF at `request.file_url`.
    #[instrument(level = "debug", skip(self, cancelled))]
    pub async fn create_resource<C>(
        &self,
        user_id: &str,
        request: &CreateResourceRequest,
        params: &ExtractParams,
        cancelled: C,
    ) -> Result<Resource>
    where
        C: Future<Output = ()>,
    {
        request.validate()?;
        let key = s3_key_from_url(&request.file_url)?;

        // Deleted when dropped, on every path out of this function.
        let source = tempfile::Builder::new()
            .prefix("sheek-source")
            .suffix(".pdf")
            .tempfile()
            .context("Failed to create temporary file")?;
        self.store
            .download(key, source.path())
            .await
            .context("Failed to download file from S3")?;

        let pages = self.extract(&source, params, cancelled).await?;
        let resource = Resource::new(user_id, request, pages);
        self.resources
            .insert(&resource)
            .await
            .context("Failed to save resource")?;
        info!(
            id = %resource.id,
            total_pages = resource.content.total_pages,
            "Created resource"
        );
        Ok(resource)
    }

    /// OCR a downloaded source document.
    async fn extract<C>(
        &self,
        source: &NamedTempFile,
        params: &ExtractParams,
        cancelled: C,
    ) -> Result<Vec<String>>
    where
        C: Future<Output = ()>,
    {
        let result = self
            .pipeline
            .extract_until(source.path(), params, cancelled)
            .await
            .context("Failed to extract text")?;
        Ok(result.into_pages())
    }
}
