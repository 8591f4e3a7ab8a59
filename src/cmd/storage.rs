//! The `upload-url` and `object-info` subcommands.

use std::time::Duration;

use clap::Args;
use schemars::JsonSchema;

use crate::{
    async_utils::io::write_json,
    prelude::*,
    storage::{
        DEFAULT_DOWNLOAD_EXPIRY, ObjectMetadata, ObjectStore as _, S3Storage, StorageOpts,
        UploadUrlRequest, issue_upload_ticket, s3_key_from_url,
    },
};

/// Upload URL command line arguments.
#[derive(Debug, Args)]
pub struct UploadUrlOpts {
    /// The name of the file to upload.
    #[clap(long)]
    pub file_name: String,

    /// Where the file should go.
    #[clap(long, default_value = "RESOURCE")]
    pub path: String,

    /// The MIME type of the file. Guessed from the file name if omitted.
    #[clap(long)]
    pub content_type: Option<String>,

    /// Output location. Defaults to standard output.
    #[clap(short = 'o', long = "out")]
    pub output_path: Option<PathBuf>,

    #[clap(flatten)]
    pub storage_opts: StorageOpts,
}

/// The `upload-url` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_upload_url(opts: &UploadUrlOpts) -> Result<()> {
    let storage = S3Storage::new(&opts.storage_opts.bucket).await?;
    let request = UploadUrlRequest {
        file_name: opts.file_name.clone(),
        path: opts.path.clone(),
        content_type: opts.content_type.clone(),
    };
    let ticket = issue_upload_ticket(&storage, &opts.storage_opts.deploy_env, &request)
        .await
        .context("Failed to generate upload URL")?;
    write_json(opts.output_path.as_deref(), &ticket).await
}

/// Object info command line arguments.
#[derive(Debug, Args)]
pub struct ObjectInfoOpts {
    /// The S3 URL of an uploaded object.
    pub file_url: String,

    /// How long the download URL should be valid, in seconds.
    #[clap(long, default_value_t = DEFAULT_DOWNLOAD_EXPIRY.as_secs())]
    pub expires_in: u64,

    /// Output location. Defaults to standard output.
    #[clap(short = 'o', long = "out")]
    pub output_path: Option<PathBuf>,

    #[clap(flatten)]
    pub storage_opts: StorageOpts,
}

/// Metadata about an object, plus a way to fetch it.
#[derive(Debug, JsonSchema, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectInfo {
    #[serde(flatten)]
    pub metadata: ObjectMetadata,

    /// A presigned `GET` URL.
    pub download_url: String,

    /// How long `download_url` is valid, in seconds.
    pub expires_in: u64,
}

/// The `object-info` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_object_info(opts: &ObjectInfoOpts) -> Result<()> {
    let key = s3_key_from_url(&opts.file_url)?;
    let storage = S3Storage::new(&opts.storage_opts.bucket).await?;
    let metadata = storage.object_metadata(key).await?;
    let download_url = storage
        .presigned_download_url(key, Duration::from_secs(opts.expires_in))
        .await?;
    let info = ObjectInfo {
        metadata,
        download_url,
        expires_in: opts.expires_in,
    };
    write_json(opts.output_path.as_deref(), &info).await
}
