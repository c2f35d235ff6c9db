use anyhow::{Context, Result};
use chrono::TimeZone;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobSchedulerError};
use tracing::{error, info};

use crate::core::config::Config;
use crate::core::cycle::MonitorCycle;
use crate::core::lifecycle::{LifecycleComponent, LifecycleManager};
use crate::core::store::SheetsConnector;
use crate::core::terminal::{GuideSection, print_goodbye};

/// Runs the confirmation cycle when the service comes up.
struct InitialRun {
    cycle: MonitorCycle,
    enabled: bool,
}

#[async_trait::async_trait]
impl LifecycleComponent for InitialRun {
    async fn on_start(&mut self) -> Result<()> {
        if self.enabled {
            info!("Running initial monitor cycle");
            self.cycle.trigger().await;
        } else {
            info!("Initial run disabled; waiting for the first scheduled trigger");
        }
        Ok(())
    }
}

fn cycle_job<TZ>(schedule: &str, timezone: TZ, cycle: MonitorCycle) -> Result<Job, JobSchedulerError>
where
    TZ: TimeZone + Send + Sync + 'static,
    TZ::Offset: Send + Sync,
{
    Job::new_async_tz(schedule, timezone, move |_uuid, _l| {
        let cycle = cycle.clone();
        Box::pin(async move {
            cycle.trigger().await;
        })
    })
}

/// Foreground service: one cycle now, then one per cron trigger until Ctrl-C.
pub async fn run_service(config_path: PathBuf, no_initial_run: bool) -> Result<()> {
    // The schedule is fixed at start-up; everything else is re-read per cycle.
    let config = Config::load(&config_path)?;

    let connector = SheetsConnector::new(super::STORE_REQUEST_TIMEOUT)?;
    let cycle = MonitorCycle::new(config_path.clone(), Arc::new(connector));

    let mut lifecycle = LifecycleManager::new().await?;
    let job = match config.timezone {
        Some(tz) => cycle_job(&config.schedule, tz, cycle.clone()),
        None => cycle_job(&config.schedule, chrono::Local, cycle.clone()),
    }
    .with_context(|| format!("invalid schedule '{}'", config.schedule))?;
    lifecycle.scheduler.add(job).await?;

    lifecycle.attach(Arc::new(Mutex::new(InitialRun {
        cycle,
        enabled: !no_initial_run,
    })));

    GuideSection::new("rankmon")
        .status("Config", &config_path.display().to_string())
        .status("Schedule", &config.schedule)
        .status("Targets", &config.targets.len().to_string())
        .blank()
        .text("Press Ctrl+C to stop.")
        .print();
    println!();

    lifecycle.start().await?;

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
    }
    lifecycle.shutdown().await?;
    print_goodbye();
    Ok(())
}
