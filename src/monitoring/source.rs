use anyhow::Result;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;
use std::time::Duration;

use super::metrics::UsageDelta;
use crate::config::PowerSettings;

/// Produces the usage of one tick. Swap in a real probe here; nothing
/// downstream depends on where the numbers come from.
#[async_trait]
pub trait SampleSource: Send + Sync {
    async fn sample(&self, tick: Duration) -> Result<UsageDelta>;
}

/// Wattage factors for the electricity estimate.
#[derive(Debug, Clone, Copy)]
pub struct PowerModel {
    pub watts_per_cpu_core: f64,
    pub watts_per_gb_ram: f64,
    pub watts_per_gb_storage_read: f64,
    pub watts_per_gb_bandwidth: f64,
}

impl Default for PowerModel {
    fn default() -> Self {
        Self::from(&PowerSettings::default())
    }
}

impl From<&PowerSettings> for PowerModel {
    fn from(settings: &PowerSettings) -> Self {
        Self {
            watts_per_cpu_core: settings.watts_per_cpu_core,
            watts_per_gb_ram: settings.watts_per_gb_ram,
            watts_per_gb_storage_read: settings.watts_per_gb_storage_read,
            watts_per_gb_bandwidth: settings.watts_per_gb_bandwidth,
        }
    }
}

impl PowerModel {
    pub fn watts(&self, cpu_cores: f64, ram_gb: f64, storage_gb: f64, bandwidth_gb: f64) -> f64 {
        cpu_cores * self.watts_per_cpu_core
            + ram_gb * self.watts_per_gb_ram
            + storage_gb * self.watts_per_gb_storage_read
            + bandwidth_gb * self.watts_per_gb_bandwidth
    }
}

/// Instantaneous draws for one tick, before scaling by tick length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawDraw {
    pub cpu_cores: f64,
    pub ram_gb: f64,
    pub storage_gb: f64,
    pub bandwidth_gb: f64,
}

impl RawDraw {
    pub fn into_delta(self, tick: Duration, power: &PowerModel) -> UsageDelta {
        let secs = tick.as_secs_f64();
        let tick_hours = secs / 3600.0;
        let watts = power.watts(self.cpu_cores, self.ram_gb, self.storage_gb, self.bandwidth_gb);

        UsageDelta {
            cpu_core_seconds: self.cpu_cores * secs,
            ram_gb_seconds: self.ram_gb * secs,
            storage_gb_hours: self.storage_gb * tick_hours,
            bandwidth_gb: self.bandwidth_gb,
            estimated_kwh: watts / 1000.0 * tick_hours,
        }
    }
}

/// Random usage that looks like a light browser workload.
pub struct SyntheticSource {
    cores: usize,
    power: PowerModel,
    rng: Mutex<StdRng>,
}

impl SyntheticSource {
    pub fn new(cores: usize, power: PowerModel) -> Self {
        Self {
            cores: cores.max(1),
            power,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn seeded(cores: usize, power: PowerModel, seed: u64) -> Self {
        Self {
            cores: cores.max(1),
            power,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn cores(&self) -> usize {
        self.cores
    }

    pub fn draw(&self) -> RawDraw {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        RawDraw {
            // 5-30% of the available cores
            cpu_cores: rng.gen_range(0.05..0.30) * self.cores as f64,
            ram_gb: rng.gen_range(0.1..0.5),
            storage_gb: rng.gen_range(0.0..0.01),
            bandwidth_gb: rng.gen_range(0.0..0.005),
        }
    }
}

#[async_trait]
impl SampleSource for SyntheticSource {
    async fn sample(&self, tick: Duration) -> Result<UsageDelta> {
        Ok(self.draw().into_delta(tick, &self.power))
    }
}

/// Returns the same delta on every tick regardless of tick length.
#[derive(Debug, Clone, Copy)]
pub struct FixedSource(pub UsageDelta);

#[async_trait]
impl SampleSource for FixedSource {
    async fn sample(&self, _tick: Duration) -> Result<UsageDelta> {
        Ok(self.0)
    }
}

/// Core count hint: explicit override, else available parallelism, else 4.
pub fn available_cores(hint: Option<usize>) -> usize {
    hint.filter(|&c| c > 0).unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
    })
}
