use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use usage_meter::billing::{CURRENCY, PAYMENT_TERMS};
use usage_meter::monitoring::{FixedSource, UsageDelta};
use usage_meter::pricing::PricingTable;
use usage_meter::reporting::{ReportTransport, UsageReport};
use usage_meter::{MeterError, MeterResult, ReportDispatcher, Sampler, SessionManager};

#[derive(Default)]
struct Outbox(Mutex<Vec<(String, UsageReport)>>);

#[async_trait]
impl ReportTransport for Outbox {
    async fn deliver(&self, destination: &str, report: &UsageReport) -> MeterResult<()> {
        self.0
            .lock()
            .unwrap()
            .push((destination.to_string(), report.clone()));
        Ok(())
    }
}

async fn manager_with_sessions(count: usize) -> anyhow::Result<SessionManager> {
    let mut manager = SessionManager::new(Sampler::new(
        Arc::new(FixedSource(UsageDelta {
            cpu_core_seconds: 3600.0,
            bandwidth_gb: 1.0,
            ..Default::default()
        })),
        PricingTable::default(),
        Duration::from_secs(3600),
    ));
    for _ in 0..count {
        manager.start_session().await?;
        manager.sampler().tick().await?;
        manager.end_session().await?;
    }
    Ok(manager)
}

#[tokio::test]
async fn unknown_session_id_is_rejected() -> anyhow::Result<()> {
    let manager = manager_with_sessions(2).await?;

    let err = manager.ledger().build_invoice(Some("unknown-id")).unwrap_err();
    assert!(matches!(
        err,
        MeterError::SessionNotFound { session_id } if session_id == "unknown-id"
    ));
    Ok(())
}

#[tokio::test]
async fn invoice_for_all_sessions_sums_final_costs() -> anyhow::Result<()> {
    let manager = manager_with_sessions(3).await?;
    let invoice = manager.ledger().build_invoice(None)?;

    // 1 core-hour at 0.02 plus 1 GB at 0.08, doubled.
    let per_session = 2.0 * (0.02 + 0.08);
    assert_eq!(invoice.total_sessions, 3);
    assert!((invoice.subtotal - 3.0 * per_session).abs() < 1e-9);
    assert_eq!(invoice.tax, 0.0);
    assert_eq!(invoice.total, invoice.subtotal);
    assert_eq!(invoice.currency, CURRENCY);
    assert_eq!(invoice.payment_terms, PAYMENT_TERMS);
    assert!(invoice.invoice_id.starts_with("invoice-"));
    assert!((manager.ledger().history().total_cost - invoice.total).abs() < 1e-9);
    Ok(())
}

#[tokio::test]
async fn empty_ledger_has_nothing_to_invoice() -> anyhow::Result<()> {
    let manager = manager_with_sessions(0).await?;
    assert!(matches!(
        manager.ledger().build_invoice(None),
        Err(MeterError::NoSessionsRecorded)
    ));
    Ok(())
}

#[tokio::test]
async fn report_for_one_session_reaches_the_transport() -> anyhow::Result<()> {
    let manager = manager_with_sessions(2).await?;
    let target = manager.ledger().all()[1].session_id.clone();

    let outbox = Arc::new(Outbox::default());
    let dispatcher = ReportDispatcher::new(outbox.clone());
    let receipt = dispatcher
        .send_report(manager.ledger(), "ops@example.com", Some(&target))
        .await?;

    assert!(receipt.success);
    assert_eq!(receipt.sent_to, "ops@example.com");

    let sent = outbox.0.lock().unwrap();
    assert_eq!(sent.len(), 1);
    let (destination, report) = &sent[0];
    assert_eq!(destination, "ops@example.com");
    assert_eq!(report.invoice.invoice_id, receipt.invoice_id);
    assert_eq!(report.invoice.sessions.len(), 1);
    assert_eq!(report.invoice.sessions[0].session_id, target);
    assert!(report.body.contains(&target));
    Ok(())
}

#[tokio::test]
async fn failed_invoice_sends_nothing() -> anyhow::Result<()> {
    let manager = manager_with_sessions(1).await?;
    let outbox = Arc::new(Outbox::default());
    let dispatcher = ReportDispatcher::new(outbox.clone());

    let result = dispatcher
        .send_report(manager.ledger(), "ops@example.com", Some("missing"))
        .await;
    assert!(matches!(result, Err(MeterError::SessionNotFound { .. })));
    assert!(outbox.0.lock().unwrap().is_empty());
    Ok(())
}
