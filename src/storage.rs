//! Object storage for uploaded documents.
//!
//! Clients upload PDFs directly to S3 using presigned URLs, and we later
//! download them for OCR. Everything goes through the [`ObjectStore`] trait so
//! that the rest of the code doesn't need a real bucket to run.

use std::{fmt, time::Duration};

use aws_sdk_s3::{error::DisplayErrorContext, presigning::PresigningConfig};
use chrono::{DateTime, Utc};
use clap::Args;
use schemars::JsonSchema;
use tokio::{fs::File, io::AsyncWriteExt as _};
use uuid::Uuid;

use crate::{
    aws::load_aws_config,
    prelude::*,
    validation::{Validate, ValidationErrors},
};

/// Default bucket name.
pub const DEFAULT_BUCKET: &str = "sheek-backend";

/// Default deployment environment, used as a key prefix.
pub const DEFAULT_DEPLOY_ENV: &str = "dev";

/// Lifetime of the upload URLs we hand out in [`UploadTicket`]s.
pub const UPLOAD_TICKET_EXPIRY: Duration = Duration::from_secs(7200);

/// Default lifetime of a presigned download URL.
pub const DEFAULT_DOWNLOAD_EXPIRY: Duration = Duration::from_secs(86400);

/// Storage-related options.
#[derive(Args, Clone, Debug)]
pub struct StorageOpts {
    /// The S3 bucket holding uploaded documents.
    #[clap(long, env = "AWS_S3_BUCKET", default_value = DEFAULT_BUCKET)]
    pub bucket: String,

    /// The deployment environment. Used as the top-level key prefix.
    #[clap(long, env = "DEPLOY_ENV", default_value = DEFAULT_DEPLOY_ENV)]
    pub deploy_env: String,
}

/// Where in the bucket an upload should go.
#[derive(Clone, Copy, Debug, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UploadPath {
    /// Source documents for resources.
    Resource,
}

impl UploadPath {
    /// Every upload path, by name.
    pub const ALL: &'static [UploadPath] = &[UploadPath::Resource];

    /// The name clients use for this path.
    pub fn name(self) -> &'static str {
        match self {
            UploadPath::Resource => "RESOURCE",
        }
    }

    /// Look up a path by name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|path| path.name() == name)
    }

    /// The key prefix for this path in `deploy_env`.
    pub fn subbucket_path(self, deploy_env: &str) -> String {
        match self {
            UploadPath::Resource => format!("{deploy_env}/resource"),
        }
    }
}

impl fmt::Display for UploadPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Metadata about a stored object.
#[derive(Clone, Debug, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMetadata {
    pub bucket: String,
    pub key: String,
    pub size: Option<i64>,
    pub content_type: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

/// A bucket of objects.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// The bucket we're using.
    fn bucket(&self) -> &str;

    /// Create a URL which can be used to `PUT` an object at `key`.
    async fn presigned_upload_url(
        &self,
        key: &str,
        expires_in: Duration,
        content_type: Option<&str>,
    ) -> Result<String>;

    /// Create a URL which can be used to `GET` the object at `key`.
    async fn presigned_download_url(&self, key: &str, expires_in: Duration)
    -> Result<String>;

    /// Look up metadata for the object at `key`.
    async fn object_metadata(&self, key: &str) -> Result<ObjectMetadata>;

    /// Download the object at `key` to `local_path`, replacing any existing
    /// contents.
    async fn download(&self, key: &str, local_path: &Path) -> Result<()>;
}

/// An [`ObjectStore`] backed by S3.
pub struct S3Storage {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3Storage {
    /// Connect to `bucket` using the standard AWS configuration.
    pub async fn new(bucket: &str) -> Result<Self> {
        let config = load_aws_config().await?;
        Ok(Self {
            client: aws_sdk_s3::Client::new(&config),
            bucket: bucket.to_owned(),
        })
    }
}

#[async_trait]
impl ObjectStore for S3Storage {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    #[instrument(level = "debug", skip(self))]
    async fn presigned_upload_url(
        &self,
        key: &str,
        expires_in: Duration,
        content_type: Option<&str>,
    ) -> Result<String> {
        let presigning = PresigningConfig::expires_in(expires_in)
            .context("invalid presigned URL lifetime")?;
        let req = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .set_content_type(content_type.map(str::to_owned))
            .presigned(presigning)
            .await
            .map_err(|err| {
                anyhow!(
                    "Failed to generate presigned upload URL: {}",
                    DisplayErrorContext(err)
                )
            })?;
        Ok(req.uri().to_string())
    }

    #[instrument(level = "debug", skip(self))]
    async fn presigned_download_url(
        &self,
        key: &str,
        expires_in: Duration,
    ) -> Result<String> {
        let presigning = PresigningConfig::expires_in(expires_in)
            .context("invalid presigned URL lifetime")?;
        let req = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|err| {
                anyhow!(
                    "Failed to generate presigned download URL: {}",
                    DisplayErrorContext(err)
                )
            })?;
        Ok(req.uri().to_string())
    }

    #[instrument(level = "debug", skip(self))]
    async fn object_metadata(&self, key: &str) -> Result<ObjectMetadata> {
        let output = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                anyhow!(
                    "Failed to get S3 object metadata: {}",
                    DisplayErrorContext(err)
                )
            })?;
        debug!(?output, "S3 object metadata");
        Ok(ObjectMetadata {
            bucket: self.bucket.clone(),
            key: key.to_owned(),
            size: output.content_length(),
            content_type: output.content_type().map(str::to_owned),
            last_modified: output
                .last_modified()
                .and_then(|t| DateTime::from_timestamp(t.secs(), t.subsec_nanos())),
        })
    }

    #[instrument(level = "debug", skip(self), fields(local_path = %local_path.display()))]
    async fn download(&self, key: &str, local_path: &Path) -> Result<()> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                anyhow!("Failed to download from S3: {}", DisplayErrorContext(err))
            })?;

        let mut file = File::create(local_path).await.with_context(|| {
            format!("Failed to create {:?}", local_path.display())
        })?;
        let mut body = output.body;
        let mut bytes_written = 0;
        while let Some(bytes) = body
            .try_next()
            .await
            .context("Failed to download from S3")?
        {
            file.write_all(&bytes).await.with_context(|| {
                format!("Failed to write downloaded file {:?}", local_path.display())
            })?;
            bytes_written += bytes.len();
        }
        file.flush().await.context("Failed to flush downloaded file")?;
        debug!(bytes_written, "Downloaded object");
        Ok(())
    }
}

/// Extract the object key from an S3 URL like
/// `https://bucket.s3.region.amazonaws.com/path/to/file.pdf`.
pub fn s3_key_from_url(file_url: &str) -> Result<&str> {
    let parts = file_url.split(".com/").collect::<Vec<_>>();
    match parts.as_slice() {
        [_, key] if !key.is_empty() => Ok(*key),
        _ => Err(anyhow!("Invalid S3 URL format")),
    }
}

/// A request for a presigned upload URL.
#[derive(Clone, Debug, Deserialize, JsonSchema, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UploadUrlRequest {
    /// The name of the file being uploaded. Only the extension is kept.
    pub file_name: String,

    /// Which kind of upload this is. Currently only `RESOURCE`.
    pub path: String,

    /// The MIME type of the file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

impl Validate for UploadUrlRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        errors.check(
            self.file_name.is_empty(),
            "fileName",
            "File name is required.",
        );
        if self.path.is_empty() {
            errors.add("path", "Path is required.");
        } else if UploadPath::from_name(&self.path).is_none() {
            let names = UploadPath::ALL
                .iter()
                .map(|path| path.name())
                .collect::<Vec<_>>();
            errors.add(
                "path",
                format!("Path must be one of: {}.", names.join(", ")),
            );
        }
        errors.into_result()
    }
}

/// Everything a client needs to upload a file.
#[derive(Clone, Debug, JsonSchema, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadTicket {
    /// A presigned `PUT` URL.
    pub upload_url: String,
    pub bucket: String,
    pub key: String,

    /// The generated file name, a UUID plus the original extension.
    pub file_name: String,
    pub path: UploadPath,
    pub subbucket_path: String,

    /// How long `upload_url` is valid, in seconds.
    pub expires_in: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

/// Validate `request` and create an [`UploadTicket`] for it.
#[instrument(level = "debug", skip(store))]
pub async fn issue_upload_ticket(
    store: &dyn ObjectStore,
    deploy_env: &str,
    request: &UploadUrlRequest,
) -> Result<UploadTicket> {
    request.validate()?;
    let path = UploadPath::from_name(&request.path)
        .ok_or_else(|| anyhow!("Invalid path specified"))?;
    let subbucket_path = path.subbucket_path(deploy_env);

    let extension = Path::new(&request.file_name)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();
    let file_name = format!("{}{}", Uuid::new_v4(), extension);
    let key = format!("{subbucket_path}/{file_name}");

    let upload_url = store
        .presigned_upload_url(
            &key,
            UPLOAD_TICKET_EXPIRY,
            request.content_type.as_deref(),
        )
        .await
        .context("Failed to generate upload URL")?;

    let content_type = request.content_type.clone().or_else(|| {
        mime_guess::from_path(&request.file_name)
            .first()
            .map(|mime| mime.to_string())
    });

    Ok(UploadTicket {
        upload_url,
        bucket: store.bucket().to_owned(),
        key,
        file_name,
        path,
        subbucket_path,
        expires_in: UPLOAD_TICKET_EXPIRY.as_secs(),
        content_type,
    })
}
