use hostwatch_core::{EnergyCost, Monitor, MonitorConfig};

pub fn run(config: MonitorConfig, price: Option<f64>, json: bool) {
    let monitor = Monitor::new(config);
    if let Some(price) = price
        && let Err(e) = monitor.set_electricity_price(price)
    {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }

    let cost = monitor.energy();
    if json {
        super::print_json(&cost);
    } else {
        print_cost(&cost);
    }
}

fn print_cost(cost: &EnergyCost) {
    let cur = &cost.currency;
    println!(
        "Energy  ({:.2} {cur}/kWh)",
        cost.electricity_price_per_kwh
    );
    println!();
    println!(
        "  {:<28} {:>9} {:>12} {:>12} {:>12}",
        "COMPONENT", "WATTS", "HOURLY", "DAILY", "MONTHLY"
    );
    for (name, c) in &cost.components {
        println!(
            "  {:<28} {:>9.2} {:>12.2} {:>12.2} {:>12.2}",
            name, c.power_w, c.hourly_cost, c.daily_cost, c.monthly_cost
        );
    }
    println!(
        "  {:<28} {:>9.2} {:>12.2} {:>12.2} {:>12.2}",
        "TOTAL", cost.total_power_w, cost.costs.hourly, cost.costs.daily, cost.costs.monthly
    );
    println!();
    println!("  Costs in {cur}. CPU is estimated from TDP and load, RAM per used GB.");
}
