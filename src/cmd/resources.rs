//! The `resources` subcommand.

use clap::Args;

use super::StoreOpts;
use crate::{
    async_utils::io::write_json,
    prelude::*,
    resources::{PageQuery, list_resources},
};

/// Resource listing command line arguments.
#[derive(Debug, Args)]
pub struct ResourcesOpts {
    /// Whose resources to list.
    #[clap(long)]
    pub user_id: String,

    #[clap(flatten)]
    pub query: PageQuery,

    /// Output location. Defaults to standard output.
    #[clap(short = 'o', long = "out")]
    pub output_path: Option<PathBuf>,

    #[clap(flatten)]
    pub store_opts: StoreOpts,
}

/// The `resources` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_resources(opts: &ResourcesOpts) -> Result<()> {
    let page = list_resources(&opts.store_opts.store(), &opts.user_id, &opts.query).await?;
    write_json(opts.output_path.as_deref(), &page).await
}
