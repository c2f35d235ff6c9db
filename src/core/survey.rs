use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::core::search::SearchProvider;

/// Rank recorded when the probe itself failed.
pub const PROBE_FAILED: i64 = -1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankOutcome {
    pub keyword: String,
    /// 1-based position, `max_rank + 1` when absent, `-1` when the probe failed.
    pub rank: i64,
}

/// One outcome per keyword, in keyword order. Position `i` maps to store
/// column `i + 1`.
pub type SurveyBatch = Vec<RankOutcome>;

/// Rank of the first URL containing `fragment`, or `max_rank + 1`.
pub fn rank_of(urls: &[String], fragment: &str, max_rank: u32) -> i64 {
    urls.iter()
        .position(|url| url.contains(fragment))
        .map(|i| i as i64 + 1)
        .unwrap_or(i64::from(max_rank) + 1)
}

/// Probes keywords strictly one after another. Every probe made through one
/// surveyor starts at least `courtesy_delay` after the previous one ended,
/// across `survey` calls as well as within them.
pub struct RankSurveyor<'a> {
    provider: &'a dyn SearchProvider,
    courtesy_delay: Duration,
    last_probe: Mutex<Option<Instant>>,
}

impl<'a> RankSurveyor<'a> {
    pub fn new(provider: &'a dyn SearchProvider, courtesy_delay: Duration) -> Self {
        Self {
            provider,
            courtesy_delay,
            last_probe: Mutex::new(None),
        }
    }

    fn last_probe(&self) -> std::sync::MutexGuard<'_, Option<Instant>> {
        self.last_probe.lock().unwrap_or_else(|p| p.into_inner())
    }

    async fn pace(&self) {
        let last = *self.last_probe();
        let Some(last) = last else {
            return;
        };
        let wait = (last + self.courtesy_delay).saturating_duration_since(Instant::now());
        if !wait.is_zero() {
            debug!("Waiting {:?} before next probe", wait);
            tokio::time::sleep(wait).await;
        }
    }

    pub async fn survey(&self, keywords: &[String], fragment: &str, max_rank: u32) -> SurveyBatch {
        let mut batch = Vec::with_capacity(keywords.len());

        for keyword in keywords {
            self.pace().await;
            let result = self.provider.search(keyword, max_rank).await;
            *self.last_probe() = Some(Instant::now());

            let rank = match result {
                Ok(urls) => rank_of(&urls, fragment, max_rank),
                Err(e) => {
                    error!("Search for '{}' failed: {}", keyword, e);
                    PROBE_FAILED
                }
            };
            info!("{}: rank:{}", keyword, rank);

            batch.push(RankOutcome {
                keyword: keyword.clone(),
                rank,
            });
        }

        batch
    }
}
