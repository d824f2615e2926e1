use hostwatch_core::{Monitor, MonitorConfig};

pub fn run(config: MonitorConfig, refresh: f64) {
    if !refresh.is_finite() || refresh <= 0.0 {
        eprintln!("Error: --refresh must be a positive number of seconds");
        std::process::exit(1);
    }
    let mut app = crate::tui::app::App::new(Monitor::new(config), refresh);
    if let Err(e) = app.run() {
        eprintln!("TUI error: {e}");
        std::process::exit(1);
    }
}
