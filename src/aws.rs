//! AWS-related code shared by different modules.

use aws_config::{BehaviorVersion, meta::region::RegionProviderChain};

use crate::prelude::*;

/// The region to use when none is configured.
pub const FALLBACK_REGION: &str = "us-east-1";

/// Load the user's AWS configuration using standard conventions, falling back
/// to [`FALLBACK_REGION`] if no region is configured.
pub async fn load_aws_config() -> Result<aws_config::SdkConfig> {
    let region = RegionProviderChain::default_provider().or_else(FALLBACK_REGION);
    Ok(aws_config::defaults(BehaviorVersion::v2025_01_17())
        .region(region)
        .load()
        .await)
}
