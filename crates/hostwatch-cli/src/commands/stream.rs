use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use hostwatch_core::{Monitor, MonitorConfig};

/// One JSON line per report on stdout until `count` reports, Ctrl+C or a
/// closed pipe.
pub fn run(config: MonitorConfig, interval_secs: u64, count: usize) {
    let monitor = Monitor::new(config);
    let interval = Duration::from_secs(interval_secs);

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || r.store(false, Ordering::SeqCst)) {
        log::warn!("cannot install Ctrl+C handler: {e}");
    }

    let stdout = std::io::stdout();
    let mut sent = 0usize;

    while running.load(Ordering::SeqCst) {
        let started = Instant::now();
        let report = monitor.all();
        if !running.load(Ordering::SeqCst) {
            break;
        }
        let line = match serde_json::to_string(&report) {
            Ok(line) => line,
            Err(e) => {
                eprintln!("Error encoding report: {e}");
                std::process::exit(1);
            }
        };
        let mut out = stdout.lock();
        if writeln!(out, "{line}").and_then(|()| out.flush()).is_err() {
            break; // Broken pipe
        }
        drop(out);

        sent += 1;
        if count > 0 && sent >= count {
            break;
        }
        sleep_while_running(&running, interval.saturating_sub(started.elapsed()));
    }
    log::debug!("stream stopped after {sent} report(s)");
}

/// Sleep in short slices so Ctrl+C takes effect promptly.
fn sleep_while_running(running: &AtomicBool, total: Duration) {
    let deadline = Instant::now() + total;
    while running.load(Ordering::SeqCst) {
        let left = deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            break;
        }
        std::thread::sleep(left.min(Duration::from_millis(100)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sleep_returns_immediately_when_stopped() {
        let running = AtomicBool::new(false);
        let start = Instant::now();
        sleep_while_running(&running, Duration::from_secs(10));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn sleep_waits_out_the_interval() {
        let running = AtomicBool::new(true);
        let start = Instant::now();
        sleep_while_running(&running, Duration::from_millis(150));
        assert!(start.elapsed() >= Duration::from_millis(150));
    }
}
