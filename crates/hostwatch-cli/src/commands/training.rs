use std::time::Duration;

use hostwatch_core::{JobAction, Monitor, MonitorConfig, TrainingReport};

pub fn run(config: MonitorConfig, json: bool) {
    let monitor = Monitor::new(config);
    // CPU usage is a delta between two scans.
    monitor.training();
    std::thread::sleep(Duration::from_millis(monitor.config().system.cpu_sample_ms));
    let report = monitor.training();
    if json {
        super::print_json(&report);
    } else {
        print_report(&report);
    }
}

pub fn control(config: MonitorConfig, pid: u32, action: JobAction) {
    let monitor = Monitor::new(config);
    match monitor.control_job(pid, action) {
        Ok(()) => println!("Job {pid} {}", action.past_tense()),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

fn print_report(report: &TrainingReport) {
    println!("Training jobs ({})", report.total_jobs);
    println!();
    if report.jobs.is_empty() {
        println!("  No training processes detected.");
        return;
    }
    println!(
        "  {:>7}  {:<16} {:<10} {:>6} {:>10} {:>4} {:>10}  COMMAND",
        "PID", "NAME", "STATUS", "CPU%", "RSS MB", "GPU", "GPU MB"
    );
    for job in &report.jobs {
        let (gpu, gpu_mb) = match &job.gpu {
            Some(g) => (g.index.to_string(), format!("{:.0}", g.memory_mb)),
            None => ("-".to_string(), "-".to_string()),
        };
        let command: String = job.command.chars().take(60).collect();
        println!(
            "  {:>7}  {:<16} {:<10} {:>6.1} {:>10.1} {:>4} {:>10}  {command}",
            job.pid,
            job.process_name,
            job.status,
            job.cpu.percent,
            job.memory.used_mb,
            gpu,
            gpu_mb,
        );
    }
}
