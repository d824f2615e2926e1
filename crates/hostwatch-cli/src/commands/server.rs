use std::sync::Arc;

use hostwatch_core::{Monitor, MonitorConfig};

pub fn run(config: MonitorConfig, host: &str, port: u16) {
    let monitor = Arc::new(Monitor::new(config));
    let base = format!("http://{host}:{port}");

    println!("hostwatch server v{}", hostwatch_core::VERSION);
    println!("   {base}");
    println!();
    println!("   Endpoints:");
    println!("     GET  /                          API index (try: curl {base})");
    println!("     GET  /health                    Health check");
    println!("     GET  /api/system[/gpu|/cpu|/memory]");
    println!("     GET  /api/energy                Power draw and cost");
    println!("     POST /api/energy/price?price_per_kwh=N");
    println!("     GET  /api/ports[/listening|/established|/foreign]");
    println!("     GET  /api/training");
    println!("     POST /api/training/{{stop|pause|resume}}/{{pid}}");
    println!("     WS   /ws                        system | energy | ports | training | all | interval:N | stop");
    println!();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error starting async runtime: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = rt.block_on(hostwatch_server::run_server(monitor, host, port)) {
        eprintln!("Server error on {host}:{port}: {e}");
        std::process::exit(1);
    }
}
