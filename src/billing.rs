use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{MeterError, MeterResult};
use crate::monitoring::{ResourceUsage, UsageTotals};
use crate::pricing::CostBreakdown;

pub const CURRENCY: &str = "USD";
pub const PAYMENT_TERMS: &str = "Due upon receipt";

/// A finished session. Built once at session end and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionRecord {
    pub session_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_hours: f64,
    pub usage: UsageTotals,
    pub resource_usage: ResourceUsage,
    pub raw_cost: f64,
    pub final_cost: f64,
    pub breakdown: CostBreakdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub invoice_id: String,
    pub generated_at: DateTime<Utc>,
    pub sessions: Vec<SessionRecord>,
    pub total_sessions: usize,
    pub subtotal: f64,
    pub tax: f64,
    pub total: f64,
    pub currency: String,
    pub payment_terms: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingHistory {
    pub sessions: Vec<SessionRecord>,
    pub total_sessions: usize,
    pub total_cost: f64,
}

/// Append-only history of completed sessions, in completion order.
#[derive(Debug, Clone, Default)]
pub struct BillingLedger {
    records: Vec<SessionRecord>,
}

impl BillingLedger {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    pub fn append(&mut self, record: SessionRecord) {
        self.records.push(record);
    }

    pub fn all(&self) -> &[SessionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn find(&self, session_id: &str) -> Option<&SessionRecord> {
        self.records.iter().find(|r| r.session_id == session_id)
    }

    pub fn total_cost(&self) -> f64 {
        self.records.iter().map(|r| r.final_cost).sum()
    }

    pub fn history(&self) -> BillingHistory {
        BillingHistory {
            sessions: self.records.clone(),
            total_sessions: self.records.len(),
            total_cost: self.total_cost(),
        }
    }

    /// Invoice for one session, or for every recorded session when `session_id` is `None`.
    pub fn build_invoice(&self, session_id: Option<&str>) -> MeterResult<Invoice> {
        let sessions: Vec<SessionRecord> = match session_id {
            Some(id) => vec![self
                .find(id)
                .cloned()
                .ok_or_else(|| MeterError::SessionNotFound {
                    session_id: id.to_string(),
                })?],
            None if self.records.is_empty() => return Err(MeterError::NoSessionsRecorded),
            None => self.records.clone(),
        };

        let subtotal: f64 = sessions.iter().map(|s| s.final_cost).sum();
        let tax = 0.0;

        Ok(Invoice {
            invoice_id: format!("invoice-{}", Uuid::new_v4()),
            generated_at: Utc::now(),
            total_sessions: sessions.len(),
            sessions,
            subtotal,
            tax,
            total: subtotal + tax,
            currency: CURRENCY.to_string(),
            payment_terms: PAYMENT_TERMS.to_string(),
        })
    }
}
