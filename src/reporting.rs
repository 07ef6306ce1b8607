/*
* Report dispatch
* ---------------
* Builds an invoice from the ledger, renders it as a plain-text usage report
* and hands it to a ReportTransport. The default transport is a simulated
* mailer: it waits a fixed latency, logs the payload and reports success.
* Nothing is retried; invoice errors go straight back to the caller.
*/

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::billing::{BillingLedger, Invoice};
use crate::config::ReportingSettings;
use crate::errors::MeterResult;
use crate::pricing::PRICING_FORMULA;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageReport {
    pub subject: String,
    pub body: String,
    pub invoice: Invoice,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub success: bool,
    pub sent_to: String,
    pub sent_at: DateTime<Utc>,
    pub invoice_id: String,
}

#[async_trait]
pub trait ReportTransport: Send + Sync {
    async fn deliver(&self, destination: &str, report: &UsageReport) -> MeterResult<()>;
}

/// Pretends to send mail.
#[derive(Debug, Clone)]
pub struct SimulatedMailer {
    latency: Duration,
}

impl SimulatedMailer {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

#[async_trait]
impl ReportTransport for SimulatedMailer {
    async fn deliver(&self, destination: &str, report: &UsageReport) -> MeterResult<()> {
        tokio::time::sleep(self.latency).await;

        let payload = serde_json::to_string(&report.invoice)
            .unwrap_or_else(|e| format!("<unserializable invoice: {}>", e));
        info!(
            destination,
            invoice_id = %report.invoice.invoice_id,
            payload = %payload,
            "Sending usage report email"
        );
        Ok(())
    }
}

pub struct ReportDispatcher {
    transport: Arc<dyn ReportTransport>,
}

impl ReportDispatcher {
    pub fn new(transport: Arc<dyn ReportTransport>) -> Self {
        Self { transport }
    }

    pub fn from_settings(settings: &ReportingSettings) -> Self {
        Self::new(Arc::new(SimulatedMailer::new(Duration::from_millis(
            settings.simulated_latency_ms,
        ))))
    }

    /// Invoices `session_id` (or every session) and sends the report to `destination`.
    pub async fn send_report(
        &self,
        ledger: &BillingLedger,
        destination: &str,
        session_id: Option<&str>,
    ) -> MeterResult<DeliveryReceipt> {
        let invoice = ledger.build_invoice(session_id)?;
        self.dispatch(destination, invoice).await
    }

    /// Sends an already built invoice.
    pub async fn dispatch(
        &self,
        destination: &str,
        invoice: Invoice,
    ) -> MeterResult<DeliveryReceipt> {
        let report = UsageReport {
            subject: format!("Usage report {}", invoice.invoice_id),
            body: render_report(&invoice),
            invoice,
        };

        self.transport.deliver(destination, &report).await?;

        Ok(DeliveryReceipt {
            success: true,
            sent_to: destination.to_string(),
            sent_at: Utc::now(),
            invoice_id: report.invoice.invoice_id,
        })
    }
}

/// Plain-text body of a usage report. All rounding happens here.
pub fn render_report(invoice: &Invoice) -> String {
    ReportBody(invoice).to_string()
}

struct ReportBody<'a>(&'a Invoice);

impl fmt::Display for ReportBody<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let invoice = self.0;
        writeln!(f, "Invoice {}", invoice.invoice_id)?;
        writeln!(f, "Generated {}", invoice.generated_at.to_rfc3339())?;
        writeln!(f, "Pricing: {}", PRICING_FORMULA)?;
        writeln!(f)?;

        for session in &invoice.sessions {
            let usage = &session.resource_usage;
            let cost = &session.breakdown;
            writeln!(f, "Session {}", session.session_id)?;
            writeln!(
                f,
                "  {} -> {} ({:.4} h)",
                session.start_time.to_rfc3339(),
                session.end_time.to_rfc3339(),
                session.duration_hours
            )?;
            writeln!(
                f,
                "  CPU          {:.6} core-hours  ${:.6}",
                usage.cpu_core_hours, cost.cpu
            )?;
            writeln!(
                f,
                "  RAM          {:.6} GB-hours    ${:.6}",
                usage.ram_gb_hours, cost.ram
            )?;
            writeln!(
                f,
                "  Storage      {:.6} GB-hours    ${:.6}",
                usage.storage_gb_hours, cost.storage
            )?;
            writeln!(
                f,
                "  Bandwidth    {:.6} GB          ${:.6}",
                usage.bandwidth_gb, cost.bandwidth
            )?;
            writeln!(
                f,
                "  Electricity  {:.6} kWh         ${:.6}",
                usage.estimated_kwh, cost.electricity
            )?;
            writeln!(
                f,
                "  Raw ${:.6}  Final ${:.6}",
                session.raw_cost, session.final_cost
            )?;
        }

        writeln!(f)?;
        writeln!(f, "Sessions: {}", invoice.total_sessions)?;
        writeln!(f, "Subtotal: ${:.6} {}", invoice.subtotal, invoice.currency)?;
        writeln!(f, "Tax:      ${:.6} {}", invoice.tax, invoice.currency)?;
        writeln!(f, "Total:    ${:.6} {}", invoice.total, invoice.currency)?;
        writeln!(f, "Terms:    {}", invoice.payment_terms)
    }
}
