use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    prelude::*,
    widgets::{Block, BorderType, Borders, Gauge, List, ListItem, Paragraph},
};
use std::io::Stdout;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::core::{SessionManager, SessionState};
use crate::monitoring::UsageTotals;
use crate::pricing::{CostBreakdown, PRICING_FORMULA};

const HISTORY_ROWS: usize = 10;

/// Everything one frame needs, captured under a single lock.
#[derive(Debug, Clone)]
pub struct DashboardView {
    pub state: SessionState,
    pub session_id: Option<String>,
    pub usage: UsageTotals,
    pub cost: CostBreakdown,
    pub history: Vec<(String, f64)>,
    pub total_billed: f64,
    pub message: String,
}

impl DashboardView {
    pub async fn capture(sessions: &Mutex<SessionManager>, message: &str) -> Self {
        let sessions = sessions.lock().await;
        let ledger = sessions.ledger();

        let (usage, cost) = match sessions.status().await {
            Ok(status) => (status.current_usage, status.breakdown),
            // Idle: keep showing the last finished session, if any.
            Err(_) => match ledger.all().last() {
                Some(record) => (record.usage.clone(), record.breakdown),
                None => (sessions.sampler().snapshot().await, CostBreakdown::default()),
            },
        };

        let history = ledger
            .all()
            .iter()
            .rev()
            .take(HISTORY_ROWS)
            .map(|r| (r.session_id.clone(), r.final_cost))
            .collect();

        Self {
            state: sessions.state(),
            session_id: sessions.active_session_id().map(str::to_string),
            usage,
            cost,
            history,
            total_billed: ledger.total_cost(),
            message: message.to_string(),
        }
    }
}

pub async fn start_dashboard(sessions: Arc<Mutex<SessionManager>>) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen)?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let outcome = run_loop(&mut terminal, &sessions).await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    outcome
}

async fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    sessions: &Mutex<SessionManager>,
) -> Result<()> {
    let mut message = String::from("Press [s] to start a session");

    loop {
        let view = DashboardView::capture(sessions, &message).await;
        terminal.draw(|f| render(f, &view))?;

        if !event::poll(Duration::from_millis(250))? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => {
                let mut sessions = sessions.lock().await;
                if sessions.is_active() {
                    // leaving mid-session still bills it
                    sessions.end_session().await?;
                }
                break;
            }
            KeyCode::Char('s') => {
                message = match sessions.lock().await.start_session().await {
                    Ok(handle) => format!("Started {}", handle.session_id),
                    Err(e) => e.to_string(),
                };
            }
            KeyCode::Char('e') => {
                message = match sessions.lock().await.end_session().await {
                    Ok(record) => format!(
                        "Ended {} - final ${:.6}",
                        record.session_id, record.final_cost
                    ),
                    Err(e) => e.to_string(),
                };
            }
            _ => {}
        }
    }

    Ok(())
}

fn ratio(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Gauge rows: title, label, fill ratio.
fn gauge_rows(usage: &UsageTotals) -> [(&'static str, String, f64); 5] {
    let hours = usage.resource_usage();
    [
        (
            "CPU",
            format!("{:.6} core-hours", hours.cpu_core_hours),
            ratio(usage.cpu_core_seconds / 3600.0),
        ),
        (
            "RAM",
            format!("{:.6} GB-hours", hours.ram_gb_hours),
            ratio(usage.ram_gb_seconds / 3600.0),
        ),
        (
            "Storage",
            format!("{:.6} GB-hours", hours.storage_gb_hours),
            ratio(usage.storage_gb_hours),
        ),
        (
            "Bandwidth",
            format!("{:.6} GB", hours.bandwidth_gb),
            ratio(usage.bandwidth_gb),
        ),
        (
            "Electricity",
            format!("{:.6} kWh", hours.estimated_kwh),
            ratio(usage.estimated_kwh * 10.0),
        ),
    ]
}

pub fn render(f: &mut Frame, view: &DashboardView) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(15),
            Constraint::Length(3),
        ])
        .split(f.size());

    let state_span = match view.state {
        SessionState::Active => Span::styled("ACTIVE", Style::new().green().bold()),
        SessionState::Idle => Span::styled("IDLE", Style::new().yellow()),
    };
    let header = Paragraph::new(Line::from(vec![
        Span::styled("Resource Usage", Style::new().bold()),
        Span::raw("  "),
        state_span,
        Span::raw("  "),
        Span::raw(view.session_id.clone().unwrap_or_default()),
    ]))
    .block(Block::default().borders(Borders::ALL).border_type(BorderType::Rounded));
    f.render_widget(header, chunks[0]);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(chunks[1]);

    let gauge_areas = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3); 5])
        .split(body[0]);
    for (area, (title, label, fill)) in gauge_areas.iter().zip(gauge_rows(&view.usage)) {
        let gauge = Gauge::default()
            .block(Block::default().title(title).borders(Borders::ALL))
            .gauge_style(Style::new().cyan())
            .ratio(fill)
            .label(label);
        f.render_widget(gauge, *area);
    }

    let side = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(10), Constraint::Min(3)])
        .split(body[1]);

    let cost = &view.cost;
    let cost_lines = vec![
        Line::from(format!("CPU          ${:.6}", cost.cpu)),
        Line::from(format!("RAM          ${:.6}", cost.ram)),
        Line::from(format!("Storage      ${:.6}", cost.storage)),
        Line::from(format!("Bandwidth    ${:.6}", cost.bandwidth)),
        Line::from(format!("Electricity  ${:.6}", cost.electricity)),
        Line::from(format!("Raw          ${:.6}", cost.raw_resource_cost)),
        Line::from(Span::styled(
            format!("Final        ${:.6}", cost.final_cost),
            Style::new().bold(),
        )),
        Line::from(Span::styled(PRICING_FORMULA, Style::new().dim())),
    ];
    let cost_panel = Paragraph::new(cost_lines)
        .block(Block::default().title("Cost").borders(Borders::ALL));
    f.render_widget(cost_panel, side[0]);

    let items: Vec<ListItem> = view
        .history
        .iter()
        .map(|(id, final_cost)| ListItem::new(format!("{}  ${:.6}", id, final_cost)))
        .collect();
    let history = List::new(items).block(
        Block::default()
            .title(format!("Ledger (total ${:.6})", view.total_billed))
            .borders(Borders::ALL),
    );
    f.render_widget(history, side[1]);

    let footer = Paragraph::new(Line::from(vec![
        Span::styled("[s]", Style::new().bold()),
        Span::raw(" start  "),
        Span::styled("[e]", Style::new().bold()),
        Span::raw(" end  "),
        Span::styled("[q]", Style::new().bold()),
        Span::raw(" quit   "),
        Span::raw(view.message.clone()),
    ]))
    .block(Block::default().borders(Borders::ALL));
    f.render_widget(footer, chunks[2]);
}
