use std::sync::Arc;
use std::time::Duration;

use hostwatch_core::{FallbackPolicy, MonitorConfig, PortAnalyzer, PortEntry, SystemCommandRunner};

pub fn run(mut config: MonitorConfig, json: bool, per_protocol: bool) {
    if per_protocol {
        config.ports.fallback_policy = FallbackPolicy::PerProtocol;
    }
    let runner = SystemCommandRunner::new(Duration::from_millis(config.ports.command_timeout_ms));
    let analyzer = PortAnalyzer::from_config(&config.ports, Arc::new(runner));
    let report = analyzer.analyze();

    if json {
        super::print_json(&report);
        return;
    }

    let via = report
        .collection
        .map_or_else(|| "-".to_string(), |c| c.to_string());
    println!("Ports (collected via {via})");
    println!();

    if report.total_ports() == 0 {
        println!("  No sockets found. Is ss or netstat installed?");
        return;
    }

    println!(
        "  {:<5} {:>5}  {:<11} {:>7}  {:<18} {:<16} REMOTE",
        "PROTO", "PORT", "STATE", "PID", "PROCESS", "SERVICE"
    );
    for entry in report.all_ports() {
        print_row(entry);
    }

    println!();
    println!(
        "  {} sockets, {} listening, {} established",
        report.total_ports(),
        report.total_listening(),
        report.total_established()
    );

    if report.foreign_alert() {
        println!();
        println!("  ⚠ {} foreign connection(s):", report.total_foreign());
        for entry in report.foreign_connections() {
            let r = &entry.record;
            println!(
                "    {} -> {}:{} ({})",
                r.remote_address().unwrap_or("?"),
                r.local_address,
                r.port,
                r.process_name.as_deref().unwrap_or("unknown process")
            );
        }
    }
}

fn print_row(entry: &PortEntry) {
    let r = &entry.record;
    let marker = if r.is_foreign() { " !" } else { "" };
    println!(
        "  {:<5} {:>5}  {:<11} {:>7}  {:<18} {:<16} {}{marker}",
        r.protocol.as_str(),
        r.port,
        r.state,
        super::dash_or(r.pid),
        truncate(r.process_name.as_deref().unwrap_or("-"), 18),
        truncate(&entry.service, 16),
        r.remote_address().unwrap_or("-"),
    );
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max - 1).collect();
        format!("{cut}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_keeps_short_names() {
        assert_eq!(truncate("sshd", 18), "sshd");
    }

    #[test]
    fn truncate_marks_cut_names() {
        let t = truncate("a-very-long-process-name", 10);
        assert_eq!(t.chars().count(), 10);
        assert!(t.ends_with('…'));
    }
}
