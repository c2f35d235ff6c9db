use chrono::NaiveDateTime;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::core::config::{Config, MonitoredTarget, SearchConfig, StoreInfo};
use crate::core::error::ProbeError;
use crate::core::locator::RowLocator;
use crate::core::recorder::ResultRecorder;
use crate::core::search::{SearchProvider, build_provider};
use crate::core::store::{StoreConnector, TabularStore};
use crate::core::survey::RankSurveyor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    LoadingConfig,
    Surveying,
    Locating,
    Recording,
}

pub fn can_transition(from: CycleState, to: CycleState) -> bool {
    match from {
        CycleState::Idle => matches!(to, CycleState::LoadingConfig),
        CycleState::LoadingConfig => matches!(to, CycleState::Surveying | CycleState::Idle),
        // Surveying -> Surveying: the previous target was not recorded.
        CycleState::Surveying => matches!(
            to,
            CycleState::Locating | CycleState::Surveying | CycleState::Idle
        ),
        CycleState::Locating => matches!(
            to,
            CycleState::Recording | CycleState::Surveying | CycleState::Idle
        ),
        CycleState::Recording => matches!(to, CycleState::Surveying | CycleState::Idle),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub surveyed: usize,
    pub recorded: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Another cycle was still in progress.
    Skipped,
    ConfigRejected,
    Aborted(String),
    Completed(CycleSummary),
}

pub type ProviderFactory =
    Arc<dyn Fn(&SearchConfig) -> Result<Arc<dyn SearchProvider>, ProbeError> + Send + Sync>;

/// Source of the cycle timestamp. Called once per cycle.
pub type Clock = Arc<dyn Fn(&Config) -> NaiveDateTime + Send + Sync>;

/// How far one target got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TargetResult {
    Surveyed,
    Recorded,
    Failed,
}

/// Holds the in-progress flag for as long as a cycle runs. Released on drop,
/// including during unwinding.
pub struct CycleGuard {
    flag: Arc<AtomicBool>,
}

impl CycleGuard {
    pub fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag: flag.clone() })
    }
}

impl Drop for CycleGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// The store session is opened on first use and reused for the rest of the
/// cycle. A failed open disables recording until the cycle ends.
enum StoreSession {
    Pending,
    Open(Box<dyn TabularStore>),
    Unavailable,
}

impl StoreSession {
    async fn get(
        &mut self,
        connector: &dyn StoreConnector,
        info: &StoreInfo,
    ) -> Option<&mut dyn TabularStore> {
        if matches!(self, StoreSession::Pending) {
            *self = match connector.open(info).await {
                Ok(store) => StoreSession::Open(store),
                Err(e) => {
                    error!("Cannot open store {}: {}", info.file_id, e);
                    StoreSession::Unavailable
                }
            };
        }
        match self {
            StoreSession::Open(store) => Some(store.as_mut()),
            _ => None,
        }
    }

    fn discard(&mut self) {
        if let StoreSession::Open(store) = self {
            store.discard();
        }
    }
}

/// Everything one cycle shares across its targets.
struct CycleContext<'a> {
    config: &'a Config,
    now: NaiveDateTime,
    surveyor: RankSurveyor<'a>,
    locator: RowLocator,
    recorder: ResultRecorder,
}

/// One full survey-and-record pass over every monitored target.
#[derive(Clone)]
pub struct MonitorCycle {
    config_path: PathBuf,
    connector: Arc<dyn StoreConnector>,
    provider_factory: ProviderFactory,
    clock: Clock,
    running: Arc<AtomicBool>,
    at: Option<NaiveDateTime>,
    dry_run: bool,
}

impl MonitorCycle {
    pub fn new(config_path: PathBuf, connector: Arc<dyn StoreConnector>) -> Self {
        Self {
            config_path,
            connector,
            provider_factory: Arc::new(build_provider),
            clock: Arc::new(Config::now),
            running: Arc::new(AtomicBool::new(false)),
            at: None,
            dry_run: false,
        }
    }

    pub fn with_provider_factory(mut self, factory: ProviderFactory) -> Self {
        self.provider_factory = factory;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Record against this timestamp instead of the current time.
    pub fn at(mut self, at: Option<NaiveDateTime>) -> Self {
        self.at = at;
        self
    }

    /// Survey and log only; the store is never opened.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Scheduler entry point. The cycle runs on its own task; a panic comes
    /// back as a `JoinError` and is logged.
    pub async fn trigger(&self) {
        let cycle = self.clone();
        match tokio::spawn(async move { cycle.run().await }).await {
            Ok(outcome) => debug!("Cycle finished: {:?}", outcome),
            Err(e) => error!("Monitor cycle aborted: {}", e),
        }
    }

    pub async fn run(&self) -> CycleOutcome {
        let Some(_guard) = CycleGuard::acquire(&self.running) else {
            warn!("Previous monitor cycle still running; skipping this trigger");
            return CycleOutcome::Skipped;
        };

        let cycle_id = Uuid::new_v4();
        let mut state = CycleState::Idle;
        advance(&mut state, CycleState::LoadingConfig);

        let config = match Config::load(&self.config_path) {
            Ok(config) => config,
            Err(e) => {
                error!(
                    "Cycle {}: config {:?} rejected: {}",
                    cycle_id, self.config_path, e
                );
                advance(&mut state, CycleState::Idle);
                return CycleOutcome::ConfigRejected;
            }
        };

        let provider = match (self.provider_factory)(&config.search) {
            Ok(provider) => provider,
            Err(e) => {
                error!("Cycle {}: search provider unavailable: {}", cycle_id, e);
                advance(&mut state, CycleState::Idle);
                return CycleOutcome::Aborted(e.to_string());
            }
        };

        // One timestamp for every target, however long the cycle takes.
        let now = self.at.unwrap_or_else(|| (self.clock)(&config));
        info!(
            "Cycle {} started: {} target(s), recording against {}",
            cycle_id,
            config.targets.len(),
            now.format("%Y-%m-%d %H:%M:%S")
        );

        let ctx = CycleContext {
            config: &config,
            now,
            surveyor: RankSurveyor::new(
                provider.as_ref(),
                Duration::from_secs(config.search.courtesy_delay_secs),
            ),
            locator: RowLocator::new(config.store.scan_row_limit),
            recorder: ResultRecorder::new(config.store.rank_column_capacity),
        };
        let mut session = StoreSession::Pending;
        let mut summary = CycleSummary::default();

        for (i, target) in config.targets.iter().enumerate() {
            let step = AssertUnwindSafe(self.process_target(
                &ctx,
                &mut session,
                &mut state,
                &mut summary,
                i,
                target,
            ))
            .catch_unwind()
            .await;

            let result = match step {
                Ok(result) => result,
                Err(panic) => {
                    error!(
                        "Target {} ({}) panicked: {}",
                        i,
                        target.url,
                        panic_message(panic.as_ref())
                    );
                    session.discard();
                    TargetResult::Failed
                }
            };
            match result {
                TargetResult::Recorded => summary.recorded += 1,
                TargetResult::Failed => summary.failed += 1,
                TargetResult::Surveyed => {}
            }
        }

        advance(&mut state, CycleState::Idle);
        info!(
            "Cycle {} finished: {} surveyed, {} recorded, {} failed",
            cycle_id, summary.surveyed, summary.recorded, summary.failed
        );
        CycleOutcome::Completed(summary)
    }

    /// Survey, locate and record one target. Errors are logged here and
    /// reported as a `TargetResult`.
    async fn process_target(
        &self,
        ctx: &CycleContext<'_>,
        session: &mut StoreSession,
        state: &mut CycleState,
        summary: &mut CycleSummary,
        i: usize,
        target: &MonitoredTarget,
    ) -> TargetResult {
        advance(state, CycleState::Surveying);
        info!(
            "Surveying target {} ({}): {} keyword(s)",
            i,
            target.url,
            target.keywords.len()
        );
        let batch = ctx
            .surveyor
            .survey(&target.keywords, &target.url, ctx.config.max_search_rank)
            .await;
        summary.surveyed += 1;

        if self.dry_run {
            return TargetResult::Surveyed;
        }

        let Some(store) = session
            .get(self.connector.as_ref(), &ctx.config.store)
            .await
        else {
            warn!("Store unavailable; results for target {} not recorded", i);
            return TargetResult::Failed;
        };

        advance(state, CycleState::Locating);
        let row = match ctx.locator.locate(store, target.sheet_index, &ctx.now).await {
            Ok(row) => row,
            Err(e) => {
                warn!("Skipping record for target {} ({}): {}", i, target.url, e);
                return TargetResult::Failed;
            }
        };

        advance(state, CycleState::Recording);
        match ctx
            .recorder
            .record(store, &batch, row, target.sheet_index)
            .await
        {
            Ok(()) => TargetResult::Recorded,
            Err(e) => {
                error!("Recording target {} ({}) failed: {}", i, target.url, e);
                TargetResult::Failed
            }
        }
    }
}

/// Best-effort text of a panic payload.
fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}

fn advance(state: &mut CycleState, to: CycleState) {
    debug_assert!(
        can_transition(*state, to),
        "illegal cycle transition {:?} -> {:?}",
        state,
        to
    );
    debug!("Cycle state {:?} -> {:?}", state, to);
    *state = to;
}
