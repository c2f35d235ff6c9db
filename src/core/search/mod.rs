mod custom_search;
mod googler;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::core::config::{ProviderKind, SearchConfig};
use crate::core::error::ProbeError;

use custom_search::CustomSearchProvider;
use googler::GooglerProvider;

/// The external search facility. One call is one probe: no retries.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Up to `limit` result URLs for `keyword`, best first.
    async fn search(&self, keyword: &str, limit: u32) -> Result<Vec<String>, ProbeError>;
}

pub fn build_provider(config: &SearchConfig) -> Result<Arc<dyn SearchProvider>, ProbeError> {
    let timeout = Duration::from_secs(config.timeout_secs);
    match config.provider {
        ProviderKind::Googler => Ok(Arc::new(GooglerProvider::new(
            config.command.clone(),
            config.extra_args.clone(),
            timeout,
        ))),
        ProviderKind::CustomSearch => Ok(Arc::new(CustomSearchProvider::new(
            config.endpoint.clone(),
            config.api_key.clone().unwrap_or_default(),
            config.engine_id.clone().unwrap_or_default(),
            timeout,
        )?)),
    }
}
