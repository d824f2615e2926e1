//! TUI rendering.
//!
//! ┌──────────────────────────────────────────────┐
//! │  hostwatch   Ports   #42  180ms   every 2s   │
//! ├──────────────────────┬───────────────────────┤
//! │  CPU  ████░░  41.0%  │  346.0 W              │
//! │  RAM  ██░░░░  22.5%  │  hourly   5.19 TRY    │
//! │  GPU0 █████░  98.0%  │  daily  124.56 TRY    │
//! ├──────────────────────┴───────────────────────┤
//! │  PROTO PORT STATE   PID  PROCESS  SERVICE    │
//! │  tcp   22   LISTEN 1234  sshd     ssh        │
//! ├──────────────────────────────────────────────┤
//! │  ⚠ 1 foreign connection                      │
//! ├──────────────────────────────────────────────┤
//! │  tab: panel  ↑↓ select  f: foreign  q: quit  │
//! └──────────────────────────────────────────────┘

use super::app::{App, Panel, Snapshot, clamp_cursor};
use hostwatch_core::FullReport;
use ratatui::{prelude::*, widgets::*};

pub fn draw(f: &mut Frame, app: &App, snapshot: &Snapshot) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // title
            Constraint::Length(7), // system + energy
            Constraint::Min(8),    // table
            Constraint::Length(3), // status
            Constraint::Length(1), // keys
        ])
        .split(f.area());

    draw_title(f, rows[0], app, snapshot);

    let Some(report) = &snapshot.report else {
        let p = Paragraph::new("Collecting first report...")
            .style(Style::default().fg(Color::DarkGray))
            .block(Block::default().borders(Borders::ALL));
        f.render_widget(p, rows[1]);
        draw_keys(f, rows[4], app.panel());
        return;
    };

    let top = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(rows[1]);
    draw_system(f, top[0], report);
    draw_energy(f, top[1], report);

    match app.panel() {
        Panel::Ports => draw_ports(f, rows[2], app, snapshot),
        Panel::Training => draw_training(f, rows[2], app, snapshot),
    }
    draw_status(f, rows[3], app, report);
    draw_keys(f, rows[4], app.panel());
}

fn draw_title(f: &mut Frame, area: Rect, app: &App, snapshot: &Snapshot) {
    let spin = if snapshot.collecting { " ⟳" } else { "" };
    let paused = if app.is_paused() { "  PAUSED" } else { "" };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(Line::from(vec![
            Span::styled(" hostwatch ", Style::default().bold().fg(Color::Cyan)),
            Span::raw("  "),
            Span::styled(
                app.panel().label(),
                Style::default().bold().fg(Color::Yellow),
            ),
            Span::styled(
                format!(
                    "  #{}  {}ms  every {:.1}s{spin}",
                    snapshot.cycle_count,
                    snapshot.last_ms,
                    app.refresh_rate_secs()
                ),
                Style::default().fg(Color::DarkGray),
            ),
            Span::styled(paused, Style::default().bold().fg(Color::Red)),
            Span::raw(" "),
        ]));

    f.render_widget(block, area);
}

/// Text bar for a 0–100 percentage.
pub fn bar(percent: f64, width: usize) -> String {
    let filled = ((percent.clamp(0.0, 100.0) / 100.0) * width as f64).round() as usize;
    let filled = filled.min(width);
    format!("{}{}", "█".repeat(filled), "░".repeat(width - filled))
}

fn load_color(percent: f64) -> Color {
    if percent >= 90.0 {
        Color::Red
    } else if percent >= 70.0 {
        Color::Yellow
    } else {
        Color::Green
    }
}

fn gauge_line(label: String, percent: f64, detail: String) -> Line<'static> {
    Line::from(vec![
        Span::styled(format!("{label:<5}"), Style::default().bold()),
        Span::styled(bar(percent, 12), Style::default().fg(load_color(percent))),
        Span::raw(format!(" {percent:>5.1}%  ")),
        Span::styled(detail, Style::default().fg(Color::DarkGray)),
    ])
}

fn draw_system(f: &mut Frame, area: Rect, report: &FullReport) {
    let s = &report.system;
    let mut lines = vec![
        gauge_line(
            "CPU".into(),
            s.cpu.percent,
            format!("{} cores {:.2}GHz", s.cpu.count, s.cpu.freq_ghz),
        ),
        gauge_line(
            "RAM".into(),
            s.ram.percent,
            format!("{:.1}/{:.1} GB", s.ram.used_gb, s.ram.total_gb),
        ),
        gauge_line(
            "Disk".into(),
            s.disk.percent,
            format!("{:.0}/{:.0} GB", s.disk.used_gb, s.disk.total_gb),
        ),
    ];
    for gpu in &s.gpus {
        lines.push(gauge_line(
            format!("GPU{}", gpu.index),
            gpu.utilization_percent,
            format!(
                "{:.0}°C {:.0}W mem {:.0}%",
                gpu.temperature_c, gpu.power.draw_w, gpu.memory.percent
            ),
        ));
    }

    let p = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(" System "));
    f.render_widget(p, area);
}

fn draw_energy(f: &mut Frame, area: Rect, report: &FullReport) {
    let e = &report.energy;
    let cur = &e.currency;
    let lines = vec![
        Line::from(Span::styled(
            format!("{:.1} W", e.total_power_w),
            Style::default().bold().fg(Color::Cyan),
        )),
        Line::from(format!("hourly  {:>10.2} {cur}", e.costs.hourly)),
        Line::from(format!("daily   {:>10.2} {cur}", e.costs.daily)),
        Line::from(format!("monthly {:>10.2} {cur}", e.costs.monthly)),
        Line::from(Span::styled(
            format!("at {:.2} {cur}/kWh", e.electricity_price_per_kwh),
            Style::default().fg(Color::DarkGray),
        )),
    ];
    let p = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(" Energy "));
    f.render_widget(p, area);
}

fn selected_style(selected: bool) -> Style {
    if selected {
        Style::default().bg(Color::DarkGray).fg(Color::White)
    } else {
        Style::default()
    }
}

fn draw_ports(f: &mut Frame, area: Rect, app: &App, snapshot: &Snapshot) {
    let entries = app.port_rows(snapshot);
    let cursor = clamp_cursor(app.cursor(), entries.len());

    let rows: Vec<Row> = entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let r = &entry.record;
            let style = if i == cursor {
                selected_style(true)
            } else if r.is_foreign() {
                Style::default().fg(Color::Red)
            } else if r.is_listening() {
                Style::default().fg(Color::Green)
            } else {
                Style::default()
            };
            Row::new(vec![
                r.protocol.as_str().to_string(),
                r.port.to_string(),
                r.state.clone(),
                r.pid.map_or_else(|| "-".into(), |p| p.to_string()),
                r.process_name.clone().unwrap_or_else(|| "-".into()),
                entry.service.clone(),
                r.remote_address().unwrap_or("-").to_string(),
            ])
            .style(style)
        })
        .collect();

    let title = if app.foreign_only() {
        " Foreign connections "
    } else {
        " Ports "
    };
    let table = Table::new(
        rows,
        [
            Constraint::Length(5),  // proto
            Constraint::Length(6),  // port
            Constraint::Length(12), // state
            Constraint::Length(8),  // pid
            Constraint::Length(18), // process
            Constraint::Length(16), // service
            Constraint::Min(15),    // remote
        ],
    )
    .header(
        Row::new(vec![
            "PROTO", "PORT", "STATE", "PID", "PROCESS", "SERVICE", "REMOTE",
        ])
        .style(Style::default().bold().fg(Color::Cyan)),
    )
    .block(Block::default().borders(Borders::ALL).title(title));

    f.render_widget(table, area);
}

fn draw_training(f: &mut Frame, area: Rect, app: &App, snapshot: &Snapshot) {
    let jobs = app.training_rows(snapshot);
    if jobs.is_empty() {
        let p = Paragraph::new("No training processes detected")
            .style(Style::default().fg(Color::DarkGray))
            .block(Block::default().borders(Borders::ALL).title(" Training jobs "));
        f.render_widget(p, area);
        return;
    }
    let cursor = clamp_cursor(app.cursor(), jobs.len());

    let rows: Vec<Row> = jobs
        .iter()
        .enumerate()
        .map(|(i, job)| {
            let gpu = job.gpu.as_ref().map_or_else(
                || "-".to_string(),
                |g| format!("{} ({:.0}MB)", g.index, g.memory_mb),
            );
            let style = if i == cursor {
                selected_style(true)
            } else if job.status == "stopped" {
                Style::default().fg(Color::Yellow)
            } else {
                Style::default()
            };
            Row::new(vec![
                job.pid.to_string(),
                job.process_name.clone(),
                job.status.clone(),
                format!("{:.1}", job.cpu.percent),
                format!("{:.0}", job.memory.used_mb),
                gpu,
                job.command.clone(),
            ])
            .style(style)
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(8),  // pid
            Constraint::Length(16), // name
            Constraint::Length(10), // status
            Constraint::Length(7),  // cpu
            Constraint::Length(9),  // rss
            Constraint::Length(12), // gpu
            Constraint::Min(20),    // command
        ],
    )
    .header(
        Row::new(vec!["PID", "NAME", "STATUS", "CPU%", "RSS MB", "GPU", "COMMAND"])
            .style(Style::default().bold().fg(Color::Cyan)),
    )
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(" Training jobs (s: stop  z: pause  c: resume) "),
    );

    f.render_widget(table, area);
}

fn draw_status(f: &mut Frame, area: Rect, app: &App, report: &FullReport) {
    let mut spans = Vec::new();
    let foreign = report.ports.total_foreign();
    if foreign > 0 {
        spans.push(Span::styled(
            format!("⚠ {foreign} foreign connection(s)  "),
            Style::default().bold().fg(Color::Red),
        ));
    } else {
        spans.push(Span::styled(
            "no foreign connections  ",
            Style::default().fg(Color::Green),
        ));
    }
    if let Some(outcome) = report.ports.collection
        && outcome.is_failed()
    {
        spans.push(Span::styled(
            "port collection failed (ss/netstat)  ",
            Style::default().fg(Color::Yellow),
        ));
    }
    if let Some(status) = app.status() {
        spans.push(Span::raw(status.to_string()));
    }

    let p = Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::ALL));
    f.render_widget(p, area);
}

fn draw_keys(f: &mut Frame, area: Rect, panel: Panel) {
    let text = match panel {
        Panel::Ports => " tab: training  ↑↓ select  f: foreign only  space: pause  r: refresh  q: quit",
        Panel::Training => " tab: ports  ↑↓ select  s/z/c: stop/pause/resume  space: pause  r: refresh  q: quit",
    };
    let bar = Paragraph::new(text).style(Style::default().bg(Color::DarkGray).fg(Color::White));
    f.render_widget(bar, area);
}
