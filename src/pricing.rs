use serde::{Deserialize, Serialize};

use crate::config::PricingSettings;
use crate::monitoring::UsageTotals;

/// Billed price = raw resource cost × MARKUP.
pub const MARKUP: f64 = 2.0;

pub const PRICING_FORMULA: &str = "Resource Cost x 2 = Final Price";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PricingTable {
    pub cpu_per_core_hour: f64,
    pub ram_per_gb_hour: f64,
    pub storage_per_gb_hour: f64,
    pub bandwidth_per_gb: f64,
    pub electricity_per_kwh: f64,
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::from(&PricingSettings::default())
    }
}

impl From<&PricingSettings> for PricingTable {
    fn from(settings: &PricingSettings) -> Self {
        Self {
            cpu_per_core_hour: settings.cpu_per_core_hour,
            ram_per_gb_hour: settings.ram_per_gb_hour,
            storage_per_gb_hour: settings.storage_per_gb_hour,
            bandwidth_per_gb: settings.bandwidth_per_gb,
            electricity_per_kwh: settings.electricity_per_kwh,
        }
    }
}

/// Itemized USD amounts. Not rounded.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct CostBreakdown {
    pub cpu: f64,
    pub ram: f64,
    pub storage: f64,
    pub bandwidth: f64,
    pub electricity: f64,
    pub raw_resource_cost: f64,
    pub final_cost: f64,
}

impl PricingTable {
    pub fn compute_cost(&self, usage: &UsageTotals) -> CostBreakdown {
        let cpu = usage.cpu_core_seconds / 3600.0 * self.cpu_per_core_hour;
        let ram = usage.ram_gb_seconds / 3600.0 * self.ram_per_gb_hour;
        let storage = usage.storage_gb_hours * self.storage_per_gb_hour;
        let bandwidth = usage.bandwidth_gb * self.bandwidth_per_gb;
        let electricity = usage.estimated_kwh * self.electricity_per_kwh;

        let raw_resource_cost = cpu + ram + storage + bandwidth + electricity;

        CostBreakdown {
            cpu,
            ram,
            storage,
            bandwidth,
            electricity,
            raw_resource_cost,
            final_cost: raw_resource_cost * MARKUP,
        }
    }
}

/// Prices `usage` with the default rate table.
pub fn compute_cost(usage: &UsageTotals) -> CostBreakdown {
    PricingTable::default().compute_cost(usage)
}
