use hostwatch_core::{Monitor, MonitorConfig, SystemSnapshot};

pub fn run(config: MonitorConfig, json: bool) {
    let monitor = Monitor::new(config);
    let snapshot = monitor.system();
    if json {
        super::print_json(&snapshot);
    } else {
        print_snapshot(&snapshot);
    }
}

fn print_snapshot(s: &SystemSnapshot) {
    println!("System");
    println!();
    println!(
        "  CPU   {:>5.1}%  {} cores  {:.2} GHz  {}",
        s.cpu.percent,
        s.cpu.count,
        s.cpu.freq_ghz,
        temperature(s.cpu.temp_c)
    );
    println!(
        "  RAM   {:>5.1}%  {:.2} / {:.2} GB",
        s.ram.percent, s.ram.used_gb, s.ram.total_gb
    );
    println!(
        "  Disk  {:>5.1}%  {:.2} / {:.2} GB  ({})",
        s.disk.percent,
        s.disk.used_gb,
        s.disk.total_gb,
        s.disk.path.display()
    );

    if s.gpus.is_empty() {
        println!("  GPU   none detected (nvidia-smi unavailable)");
        return;
    }
    for gpu in &s.gpus {
        println!();
        println!("  GPU {}  {}", gpu.index, gpu.name);
        println!(
            "        util {:>5.1}%  mem {:.0} / {:.0} MB ({:.1}%)  {}  {:.1} / {:.1} W",
            gpu.utilization_percent,
            gpu.memory.used_mb,
            gpu.memory.total_mb,
            gpu.memory.percent,
            temperature(gpu.temperature_c),
            gpu.power.draw_w,
            gpu.power.limit_w
        );
        for p in &gpu.processes {
            println!("        pid {:<8} {:<24} {:.0} MB", p.pid, p.name, p.memory_mb);
        }
    }
}

fn temperature(celsius: f64) -> String {
    if celsius > 0.0 {
        format!("{celsius:.0}°C")
    } else {
        "temp n/a".to_string()
    }
}
