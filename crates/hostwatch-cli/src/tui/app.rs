//! TUI application state and event loop.
//!
//! Collection runs on a background thread so the UI never blocks; the draw
//! loop only ever reads the last finished report.

use std::io;
use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicBool, Ordering},
};
use std::thread;
use std::time::{Duration, Instant};

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::prelude::*;

use hostwatch_core::{FullReport, JobAction, Monitor, PortEntry, TrainingJob};

/// Which table fills the main area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Panel {
    #[default]
    Ports,
    Training,
}

impl Panel {
    pub fn toggle(self) -> Self {
        match self {
            Self::Ports => Self::Training,
            Self::Training => Self::Ports,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Ports => "Ports",
            Self::Training => "Training jobs",
        }
    }
}

/// Job-control key bindings in the training panel.
pub fn job_action_for(key: char) -> Option<JobAction> {
    match key {
        's' => Some(JobAction::Stop),
        'z' => Some(JobAction::Pause),
        'c' => Some(JobAction::Resume),
        _ => None,
    }
}

/// Keep a cursor inside a list of `len` rows.
pub fn clamp_cursor(cursor: usize, len: usize) -> usize {
    if len == 0 { 0 } else { cursor.min(len - 1) }
}

#[derive(Default)]
struct SharedState {
    report: Option<FullReport>,
    collecting: bool,
    cycle_count: u64,
    last_ms: u64,
}

/// What the renderer sees for one frame.
pub struct Snapshot {
    pub report: Option<FullReport>,
    pub collecting: bool,
    pub cycle_count: u64,
    pub last_ms: u64,
}

// ---------------------------------------------------------------------------
// App
// ---------------------------------------------------------------------------

pub struct App {
    monitor: Arc<Monitor>,
    refresh_rate: Duration,
    running: bool,
    paused: bool,
    panel: Panel,
    foreign_only: bool,
    cursor: usize,
    shared: Arc<Mutex<SharedState>>,
    collector_flag: Arc<AtomicBool>,
    /// Outcome of the last job-control action.
    status: Option<String>,
}

impl App {
    pub fn new(monitor: Monitor, refresh_secs: f64) -> Self {
        Self {
            monitor: Arc::new(monitor),
            refresh_rate: Duration::from_secs_f64(refresh_secs),
            running: true,
            paused: false,
            panel: Panel::default(),
            foreign_only: false,
            cursor: 0,
            shared: Arc::new(Mutex::new(SharedState::default())),
            collector_flag: Arc::new(AtomicBool::new(false)),
            status: None,
        }
    }

    pub fn run(&mut self) -> io::Result<()> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        // Restore the terminal before the panic message is printed.
        let original_hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let _ = disable_raw_mode();
            let _ = execute!(io::stdout(), LeaveAlternateScreen, crossterm::cursor::Show);
            original_hook(info);
        }));

        let result = self.run_loop(&mut terminal);

        let _ = std::panic::take_hook();
        disable_raw_mode()?;
        execute!(
            terminal.backend_mut(),
            LeaveAlternateScreen,
            crossterm::cursor::Show
        )?;

        result
    }

    fn run_loop(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    ) -> io::Result<()> {
        self.kick_collect();
        let mut last_tick = Instant::now();

        while self.running {
            let snapshot = self.snapshot();
            terminal.draw(|f| super::ui::draw(f, self, &snapshot))?;

            if event::poll(Duration::from_millis(50))?
                && let Event::Key(key) = event::read()?
                && key.kind == KeyEventKind::Press
            {
                self.handle_key(key.code, &snapshot);
            }

            if last_tick.elapsed() >= self.refresh_rate {
                if !self.paused {
                    self.kick_collect();
                }
                last_tick = Instant::now();
            }
        }

        Ok(())
    }

    fn handle_key(&mut self, key: KeyCode, snapshot: &Snapshot) {
        match key {
            KeyCode::Char('q') | KeyCode::Esc => self.running = false,
            KeyCode::Tab => {
                self.panel = self.panel.toggle();
                self.cursor = 0;
            }
            KeyCode::Up | KeyCode::Char('k') => self.cursor = self.cursor.saturating_sub(1),
            KeyCode::Down | KeyCode::Char('j') => {
                let len = self.row_count(snapshot);
                self.cursor = clamp_cursor(self.cursor + 1, len);
            }
            KeyCode::Char('f') => {
                self.foreign_only = !self.foreign_only;
                self.cursor = 0;
            }
            KeyCode::Char(' ') => self.paused = !self.paused,
            KeyCode::Char('r') => self.kick_collect(),
            KeyCode::Char(c) if self.panel == Panel::Training => {
                if let Some(action) = job_action_for(c) {
                    self.control_selected(action, snapshot);
                }
            }
            _ => {}
        }
    }

    fn control_selected(&mut self, action: JobAction, snapshot: &Snapshot) {
        let Some(job) = self.training_rows(snapshot).get(self.cursor).copied() else {
            self.status = Some("no job selected".to_string());
            return;
        };
        let pid = job.pid;
        self.status = Some(match self.monitor.control_job(pid, action) {
            Ok(()) => format!("job {pid} {}", action.past_tense()),
            Err(e) => format!("{action} {pid} failed: {e}"),
        });
        self.kick_collect();
    }

    fn kick_collect(&self) {
        if self.collector_flag.swap(true, Ordering::AcqRel) {
            return;
        }

        let monitor = Arc::clone(&self.monitor);
        let shared = Arc::clone(&self.shared);
        let flag = Arc::clone(&self.collector_flag);

        thread::spawn(move || {
            lock(&shared).collecting = true;
            let started = Instant::now();
            let report = monitor.all();
            let elapsed = started.elapsed().as_millis() as u64;

            let mut s = lock(&shared);
            s.report = Some(report);
            s.cycle_count += 1;
            s.last_ms = elapsed;
            s.collecting = false;
            drop(s);
            flag.store(false, Ordering::Release);
        });
    }

    pub fn snapshot(&self) -> Snapshot {
        let s = lock(&self.shared);
        Snapshot {
            report: s.report.clone(),
            collecting: s.collecting,
            cycle_count: s.cycle_count,
            last_ms: s.last_ms,
        }
    }

    fn row_count(&self, snapshot: &Snapshot) -> usize {
        match self.panel {
            Panel::Ports => self.port_rows(snapshot).len(),
            Panel::Training => self.training_rows(snapshot).len(),
        }
    }

    pub fn port_rows<'a>(&self, snapshot: &'a Snapshot) -> Vec<&'a PortEntry> {
        let Some(report) = &snapshot.report else {
            return Vec::new();
        };
        if self.foreign_only {
            report.ports.foreign_connections().collect()
        } else {
            report.ports.all_ports().iter().collect()
        }
    }

    pub fn training_rows<'a>(&self, snapshot: &'a Snapshot) -> Vec<&'a TrainingJob> {
        snapshot
            .report
            .as_ref()
            .map(|r| r.training.jobs.iter().collect())
            .unwrap_or_default()
    }

    pub fn panel(&self) -> Panel {
        self.panel
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn foreign_only(&self) -> bool {
        self.foreign_only
    }

    pub fn refresh_rate_secs(&self) -> f64 {
        self.refresh_rate.as_secs_f64()
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }
}

fn lock(shared: &Mutex<SharedState>) -> std::sync::MutexGuard<'_, SharedState> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panel_toggles() {
        assert_eq!(Panel::default(), Panel::Ports);
        assert_eq!(Panel::Ports.toggle(), Panel::Training);
        assert_eq!(Panel::Training.toggle(), Panel::Ports);
    }

    #[test]
    fn job_keys() {
        assert_eq!(job_action_for('s'), Some(JobAction::Stop));
        assert_eq!(job_action_for('z'), Some(JobAction::Pause));
        assert_eq!(job_action_for('c'), Some(JobAction::Resume));
        assert_eq!(job_action_for('q'), None);
    }

    #[test]
    fn cursor_clamping() {
        assert_eq!(clamp_cursor(5, 0), 0);
        assert_eq!(clamp_cursor(5, 3), 2);
        assert_eq!(clamp_cursor(1, 3), 1);
    }
}
