/*
* Sampler
* -------
* Owns the live UsageTotals of one session and the tokio task that feeds it.
*
* - start():  stamps start_timestamp and spawns the interval loop; the first
*             tick fires one full interval after start
* - tick():   asks the SampleSource for one delta and folds it in under a
*             single write lock, so readers never see half a tick
* - stop():   aborts the loop, waits for it to finish, freezes the totals and
*             hands back the final usage and cost
* - reset():  zeroes the totals; refused while running
*/

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use super::metrics::UsageTotals;
use super::source::SampleSource;
use crate::errors::{MeterError, MeterResult};
use crate::pricing::{CostBreakdown, PricingTable};

/// Final view handed back by [`Sampler::stop`].
#[derive(Debug, Clone, Serialize)]
pub struct SamplerSummary {
    pub usage: UsageTotals,
    pub cost: CostBreakdown,
    pub duration_hours: f64,
}

pub struct Sampler {
    usage: Arc<RwLock<UsageTotals>>,
    source: Arc<dyn SampleSource>,
    pricing: PricingTable,
    interval: Duration,
    task: Option<JoinHandle<()>>,
}

impl Sampler {
    pub fn new(source: Arc<dyn SampleSource>, pricing: PricingTable, interval: Duration) -> Self {
        info!("Initializing sampler with {:?} interval", interval);
        Self {
            usage: Arc::new(RwLock::new(UsageTotals::default())),
            source,
            pricing,
            interval,
            task: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn pricing(&self) -> &PricingTable {
        &self.pricing
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Starts the periodic loop. Returns false if it was already running.
    /// Totals frozen by an earlier `stop` are replaced by fresh ones.
    pub async fn start(&mut self) -> bool {
        if self.is_running() {
            return false;
        }

        {
            let mut usage = self.usage.write().await;
            if usage.is_frozen() {
                // A finished run is never resumed; counting starts over.
                *usage = UsageTotals::new(Utc::now());
            } else {
                usage.start_timestamp = Utc::now();
            }
        }

        let usage = Arc::clone(&self.usage);
        let source = Arc::clone(&self.source);
        let interval = self.interval;

        self.task = Some(tokio::spawn(async move {
            let mut timer = time::interval_at(Instant::now() + interval, interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                timer.tick().await;
                if let Err(e) = Self::sample_once(source.as_ref(), &usage, interval).await {
                    error!("Failed to sample resource usage: {}", e);
                }
            }
        }));

        info!("Resource monitoring started");
        true
    }

    /// Stops the loop and freezes the totals. `None` if it was not running.
    pub async fn stop(&mut self) -> Option<SamplerSummary> {
        let task = self.task.take()?;
        task.abort();
        // Cancelled is the expected outcome; a panic inside the loop is just as final.
        let _ = task.await;

        let now = Utc::now();
        let mut usage = self.usage.write().await;
        usage.freeze(now);

        let summary = SamplerSummary {
            usage: usage.clone(),
            cost: self.pricing.compute_cost(&usage),
            duration_hours: usage.duration_hours(now),
        };

        info!(
            samples = summary.usage.samples,
            final_cost = summary.cost.final_cost,
            "Resource monitoring stopped"
        );
        Some(summary)
    }

    /// Samples once right now. Does nothing unless the sampler is running.
    pub async fn tick(&self) -> anyhow::Result<bool> {
        if !self.is_running() {
            return Ok(false);
        }
        Self::sample_once(self.source.as_ref(), &self.usage, self.interval).await
    }

    pub async fn reset(&mut self) -> MeterResult<()> {
        if self.is_running() {
            return Err(MeterError::SamplerRunning);
        }
        *self.usage.write().await = UsageTotals::new(Utc::now());
        Ok(())
    }

    pub async fn snapshot(&self) -> UsageTotals {
        self.usage.read().await.clone()
    }

    pub async fn current_cost(&self) -> CostBreakdown {
        self.pricing.compute_cost(&*self.usage.read().await)
    }

    async fn sample_once(
        source: &dyn SampleSource,
        usage: &RwLock<UsageTotals>,
        tick: Duration,
    ) -> anyhow::Result<bool> {
        let delta = source.sample(tick).await?;
        let applied = usage.write().await.apply(&delta);
        debug!(applied, ?delta, "Sampled resource usage");
        Ok(applied)
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::metrics::UsageDelta;
    use crate::monitoring::source::FixedSource;

    fn sampler(interval: Duration) -> Sampler {
        let delta = UsageDelta {
            cpu_core_seconds: 5.0,
            ram_gb_seconds: 2.0,
            storage_gb_hours: 0.001,
            bandwidth_gb: 0.002,
            estimated_kwh: 0.0001,
        };
        Sampler::new(Arc::new(FixedSource(delta)), PricingTable::default(), interval)
    }

    #[tokio::test]
    async fn start_twice_is_a_no_op() {
        let mut sampler = sampler(Duration::from_secs(3600));
        assert!(sampler.start().await);
        assert!(!sampler.start().await);
        assert!(sampler.is_running());
        sampler.stop().await;
    }

    #[tokio::test]
    async fn stop_when_idle_returns_nothing() {
        let mut sampler = sampler(Duration::from_secs(5));
        assert!(sampler.stop().await.is_none());
    }

    #[tokio::test]
    async fn tick_is_ignored_while_stopped() {
        let sampler = sampler(Duration::from_secs(5));
        assert!(!sampler.tick().await.unwrap());
        assert_eq!(sampler.snapshot().await.samples, 0);
    }

    #[tokio::test]
    async fn reset_refused_while_running() {
        let mut sampler = sampler(Duration::from_secs(3600));
        sampler.start().await;
        assert!(matches!(sampler.reset().await, Err(MeterError::SamplerRunning)));

        sampler.stop().await;
        sampler.reset().await.unwrap();
        let usage = sampler.snapshot().await;
        assert_eq!(usage.samples, 0);
        assert!(usage.end_timestamp.is_none());
    }

    #[tokio::test]
    async fn restart_after_stop_counts_again() {
        let mut sampler = sampler(Duration::from_secs(3600));
        sampler.start().await;
        assert!(sampler.tick().await.unwrap());
        let first = sampler.stop().await.unwrap();
        assert_eq!(first.usage.samples, 1);

        assert!(sampler.start().await);
        assert!(sampler.tick().await.unwrap());
        let live = sampler.snapshot().await;
        assert!(live.end_timestamp.is_none());
        assert_eq!(live.samples, 1);
        assert!(live.start_timestamp >= first.usage.end_timestamp.unwrap());

        let second = sampler.stop().await.unwrap();
        assert_eq!(second.usage.samples, 1);
        assert_eq!(second.usage.cpu_core_seconds, 5.0);
        assert!(second.usage.end_timestamp.unwrap() >= second.usage.start_timestamp);
    }

    #[tokio::test]
    async fn fresh_reset_prices_to_zero() {
        let mut sampler = sampler(Duration::from_secs(5));
        sampler.reset().await.unwrap();
        assert_eq!(sampler.current_cost().await.final_cost, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn interval_loop_ticks_on_schedule() {
        let mut sampler = sampler(Duration::from_secs(5));
        sampler.start().await;

        time::sleep(Duration::from_millis(11_000)).await;
        assert_eq!(sampler.snapshot().await.samples, 2);

        time::sleep(Duration::from_secs(5)).await;
        let summary = sampler.stop().await.unwrap();
        assert_eq!(summary.usage.samples, 3);
        assert_eq!(summary.usage.cpu_core_seconds, 15.0);

        // the loop is gone; time passing changes nothing
        time::sleep(Duration::from_secs(60)).await;
        assert_eq!(sampler.snapshot().await, summary.usage);
    }
}
