//! Command-line entry points.

use clap::Args;

use crate::{prelude::*, resources::ResourceStore};

pub mod ingest;
pub mod ocr;
pub mod resources;
pub mod schema;
pub mod storage;
pub mod study;

/// Options for subcommands which read or write the resource store.
#[derive(Debug, Clone, Args)]
pub struct StoreOpts {
    /// JSON Lines file holding resources.
    #[clap(long = "resources", default_value = "resources.jsonl")]
    pub resources_path: PathBuf,
}

impl StoreOpts {
    /// Open the resource store.
    pub fn store(&self) -> ResourceStore {
        ResourceStore::new(&self.resources_path)
    }
}

/// Resolves when the user presses Ctrl-C. If we can't listen for Ctrl-C, this
/// never resolves.
pub async fn ctrl_c() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("cannot listen for Ctrl-C: {}", err);
        futures::future::pending::<()>().await;
    }
}
