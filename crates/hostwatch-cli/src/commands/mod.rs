pub mod energy;
pub mod monitor;
pub mod ports;
pub mod server;
pub mod stream;
pub mod system;
pub mod training;

use std::path::Path;

use hostwatch_core::MonitorConfig;
use serde::Serialize;

/// Load and validate the config file, or fall back to defaults. Exits on a
/// bad file.
pub fn load_config(path: Option<&Path>) -> MonitorConfig {
    let Some(path) = path else {
        return MonitorConfig::default();
    };
    match MonitorConfig::load(path) {
        Ok(config) => {
            log::debug!("loaded config from {}", path.display());
            config
        }
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

pub fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("Error encoding JSON: {e}");
            std::process::exit(1);
        }
    }
}

pub fn dash_or<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}
