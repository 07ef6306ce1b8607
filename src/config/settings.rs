/*
* Configuration Management
* ------------------------
* Layered configuration, lowest to highest priority:
*
* 1. Hardcoded defaults (the `Default` impls below)
* 2. <config dir>/default.toml
* 3. <config dir>/local.toml
* 4. Environment variables prefixed with APP_, nested keys separated by
*    a double underscore (APP_SERVER__PORT=8080)
*
* The config dir comes from CONFIG_PATH and falls back to ./config.
*
* Sections:
* - server:      where the HTTP API binds and its route prefix
* - monitoring:  sampler tick length and the CPU core hint
* - pricing:     per-unit resource rates in USD
* - power:       wattage factors used for the electricity estimate
* - reporting:   simulated delivery latency and default recipient
* - rate_limits: per-minute request quotas for the HTTP API
*/

use config::{Config, ConfigError, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub monitoring: MonitoringSettings,
    pub pricing: PricingSettings,
    pub power: PowerSettings,
    pub reporting: ReportingSettings,
    pub rate_limits: RateLimitSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub api_prefix: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            api_prefix: "/api/v1".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringSettings {
    pub sample_interval_seconds: u64,
    /// Overrides the detected core count used to scale synthetic CPU load.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_cores: Option<usize>,
    /// Fixed RNG seed for reproducible synthetic samples.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for MonitoringSettings {
    fn default() -> Self {
        Self {
            sample_interval_seconds: 5,
            cpu_cores: None,
            seed: None,
        }
    }
}

/// Resource rates in USD.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingSettings {
    pub cpu_per_core_hour: f64,
    pub ram_per_gb_hour: f64,
    pub storage_per_gb_hour: f64,
    pub bandwidth_per_gb: f64,
    pub electricity_per_kwh: f64,
}

impl Default for PricingSettings {
    fn default() -> Self {
        Self {
            cpu_per_core_hour: 0.02,
            ram_per_gb_hour: 0.01,
            storage_per_gb_hour: 0.0005,
            bandwidth_per_gb: 0.08,
            electricity_per_kwh: 0.12,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerSettings {
    pub watts_per_cpu_core: f64,
    pub watts_per_gb_ram: f64,
    pub watts_per_gb_storage_read: f64,
    pub watts_per_gb_bandwidth: f64,
}

impl Default for PowerSettings {
    fn default() -> Self {
        Self {
            watts_per_cpu_core: 15.0,
            watts_per_gb_ram: 0.5,
            watts_per_gb_storage_read: 0.01,
            watts_per_gb_bandwidth: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportingSettings {
    pub simulated_latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_destination: Option<String>,
}

impl Default for ReportingSettings {
    fn default() -> Self {
        Self {
            simulated_latency_ms: 500,
            default_destination: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub api_requests_per_minute: u32,
    pub report_requests_per_minute: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            api_requests_per_minute: 100,
            report_requests_per_minute: 10,
        }
    }
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let config_path = std::env::var("CONFIG_PATH")
            .unwrap_or_else(|_| "config".to_string());

        Self::new_from_dir(Path::new(&config_path))
    }

    /// Loads `default` and `local` from `dir` (both optional), then the environment.
    pub fn new_from_dir(dir: &Path) -> Result<Self, ConfigError> {
        info!("Loading configuration from path: {}", dir.display());

        let config = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            .set_default("server.api_prefix", "/api/v1")?
            .add_source(File::with_name(&format!("{}/default", dir.display())).required(false))
            .add_source(File::with_name(&format!("{}/local", dir.display())).required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Loads a single explicit file on top of the defaults, then the environment.
    pub fn new_from_file(path: &Path) -> Result<Self, ConfigError> {
        info!("Loading configuration from file: {}", path.display());

        let config = Config::builder()
            .add_source(File::from(path))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    pub fn sample_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.monitoring.sample_interval_seconds.max(1))
    }
}

pub fn generate_default_config() -> Settings {
    Settings::default()
}
