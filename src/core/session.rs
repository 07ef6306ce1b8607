use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::billing::{BillingLedger, SessionRecord};
use crate::config::Settings;
use crate::errors::{MeterError, MeterResult};
use crate::monitoring::{
    available_cores, PowerModel, Sampler, SamplerSummary, SyntheticSource, UsageTotals,
};
use crate::pricing::{CostBreakdown, PricingTable, PRICING_FORMULA};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Active,
}

/// Returned by [`SessionManager::start_session`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionHandle {
    pub session_id: String,
    pub start_time: DateTime<Utc>,
    pub status: SessionState,
}

/// Live view of the active session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatus {
    pub session_id: String,
    pub current_usage: UsageTotals,
    pub estimated_cost: f64,
    pub breakdown: CostBreakdown,
    pub formula: String,
}

/// Drives one sampler through start/end cycles and files finished sessions
/// into its ledger. At most one session is active at a time.
pub struct SessionManager {
    sampler: Sampler,
    ledger: BillingLedger,
    active: Option<String>,
}

impl SessionManager {
    pub fn new(sampler: Sampler) -> Self {
        Self {
            sampler,
            ledger: BillingLedger::new(),
            active: None,
        }
    }

    /// Synthetic sampler wired from configuration.
    pub fn from_settings(settings: &Settings) -> Self {
        let cores = available_cores(settings.monitoring.cpu_cores);
        let power = PowerModel::from(&settings.power);
        let source = match settings.monitoring.seed {
            Some(seed) => SyntheticSource::seeded(cores, power, seed),
            None => SyntheticSource::new(cores, power),
        };
        info!(cores, "Synthetic sample source ready");

        Self::new(Sampler::new(
            Arc::new(source),
            PricingTable::from(&settings.pricing),
            settings.sample_interval(),
        ))
    }

    pub fn state(&self) -> SessionState {
        if self.active.is_some() {
            SessionState::Active
        } else {
            SessionState::Idle
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn active_session_id(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn sampler(&self) -> &Sampler {
        &self.sampler
    }

    pub fn ledger(&self) -> &BillingLedger {
        &self.ledger
    }

    pub async fn start_session(&mut self) -> MeterResult<SessionHandle> {
        if let Some(session_id) = &self.active {
            warn!(%session_id, "Refusing to start a second billing session");
            return Err(MeterError::AlreadyActive {
                session_id: session_id.clone(),
            });
        }

        let session_id = format!("session-{}", Uuid::new_v4());
        self.sampler.reset().await?;
        self.sampler.start().await;
        let start_time = self.sampler.snapshot().await.start_timestamp;

        info!(%session_id, "Billing session started");
        self.active = Some(session_id.clone());

        Ok(SessionHandle {
            session_id,
            start_time,
            status: SessionState::Active,
        })
    }

    pub async fn end_session(&mut self) -> MeterResult<SessionRecord> {
        let session_id = self.active.clone().ok_or(MeterError::NoActiveSession)?;

        let summary = match self.sampler.stop().await {
            Some(summary) => summary,
            // Only reachable if the sampler was stopped behind our back.
            None => {
                let now = Utc::now();
                let mut usage = self.sampler.snapshot().await;
                usage.freeze(now);
                let cost = self.sampler.pricing().compute_cost(&usage);
                let duration_hours = usage.duration_hours(now);
                SamplerSummary {
                    usage,
                    cost,
                    duration_hours,
                }
            }
        };

        let end_time = summary.usage.end_timestamp.unwrap_or_else(Utc::now);
        let record = SessionRecord {
            session_id: session_id.clone(),
            start_time: summary.usage.start_timestamp,
            end_time,
            duration_hours: summary.duration_hours,
            resource_usage: summary.usage.resource_usage(),
            usage: summary.usage,
            raw_cost: summary.cost.raw_resource_cost,
            final_cost: summary.cost.final_cost,
            breakdown: summary.cost,
        };

        self.ledger.append(record.clone());
        self.active = None;

        info!(
            %session_id,
            duration_hours = record.duration_hours,
            final_cost = record.final_cost,
            "Billing session ended"
        );
        Ok(record)
    }

    pub async fn status(&self) -> MeterResult<SessionStatus> {
        let session_id = self.active.clone().ok_or(MeterError::NoActiveSession)?;

        let current_usage = self.sampler.snapshot().await;
        let breakdown = self.sampler.pricing().compute_cost(&current_usage);

        Ok(SessionStatus {
            session_id,
            current_usage,
            estimated_cost: breakdown.final_cost,
            breakdown,
            formula: PRICING_FORMULA.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::{FixedSource, UsageDelta};
    use std::time::Duration;

    fn manager() -> SessionManager {
        let source = FixedSource(UsageDelta {
            cpu_core_seconds: 1.0,
            ..Default::default()
        });
        SessionManager::new(Sampler::new(
            Arc::new(source),
            PricingTable::default(),
            Duration::from_secs(3600),
        ))
    }

    #[tokio::test]
    async fn new_manager_is_idle() {
        let manager = manager();
        assert_eq!(manager.state(), SessionState::Idle);
        assert!(manager.ledger().is_empty());
        assert!(matches!(manager.status().await, Err(MeterError::NoActiveSession)));
    }

    #[tokio::test]
    async fn start_then_end_cycles_back_to_idle() {
        let mut manager = manager();
        let handle = manager.start_session().await.unwrap();
        assert_eq!(handle.status, SessionState::Active);
        assert_eq!(manager.active_session_id(), Some(handle.session_id.as_str()));

        let record = manager.end_session().await.unwrap();
        assert_eq!(record.session_id, handle.session_id);
        assert_eq!(record.start_time, handle.start_time);
        assert!(record.end_time >= record.start_time);
        assert_eq!(manager.state(), SessionState::Idle);
        assert!(!manager.sampler().is_running());
    }

    #[tokio::test]
    async fn second_start_keeps_the_first_session() {
        let mut manager = manager();
        let first = manager.start_session().await.unwrap();
        manager.sampler().tick().await.unwrap();

        match manager.start_session().await {
            Err(MeterError::AlreadyActive { session_id }) => {
                assert_eq!(session_id, first.session_id)
            }
            other => panic!("expected AlreadyActive, got {:?}", other.map(|h| h.session_id)),
        }

        // in-flight usage survived the rejected restart
        let status = manager.status().await.unwrap();
        assert_eq!(status.session_id, first.session_id);
        assert_eq!(status.current_usage.samples, 1);
    }

    #[tokio::test]
    async fn from_settings_uses_configured_interval() {
        let mut settings = Settings::default();
        settings.monitoring.sample_interval_seconds = 2;
        settings.monitoring.cpu_cores = Some(2);
        settings.monitoring.seed = Some(1);

        let manager = SessionManager::from_settings(&settings);
        assert_eq!(manager.sampler().interval(), Duration::from_secs(2));
    }
}
