//! NVIDIA GPU telemetry via `nvidia-smi`.
//!
//! All parsing is done on captured CSV text (`--format=csv,noheader,nounits`)
//! so it can be tested without a GPU.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

use crate::helpers::{CommandRunner, round_to};

const GPU_QUERY: &str = "--query-gpu=index,name,memory.total,memory.used,memory.free,\
                         temperature.gpu,power.draw,power.limit,utilization.gpu";
const CSV_FORMAT: &str = "--format=csv,noheader,nounits";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GpuMemory {
    pub total_mb: f64,
    pub used_mb: f64,
    pub free_mb: f64,
    pub percent: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GpuPower {
    pub draw_w: f64,
    pub limit_w: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GpuInfo {
    pub index: u32,
    pub name: String,
    pub memory: GpuMemory,
    pub temperature_c: f64,
    pub power: GpuPower,
    pub utilization_percent: f64,
    pub processes: Vec<ComputeProcess>,
}

/// A process holding memory on a GPU.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputeProcess {
    pub pid: u32,
    pub name: String,
    pub memory_mb: f64,
}

/// GPU memory held by a pid, keyed by the GPU's uuid.
#[derive(Debug, Clone, PartialEq)]
pub struct GpuAppUsage {
    pub pid: u32,
    pub gpu_uuid: String,
    pub memory_mb: f64,
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Numeric CSV field. Empty, `[N/A]`, `N/A` and garbage read as 0.
fn number(field: &str) -> f64 {
    field.trim().parse::<f64>().unwrap_or(0.0)
}

fn fields(line: &str) -> Vec<&str> {
    line.split(',').map(str::trim).collect()
}

/// Parse `--query-gpu` output. Rows with fewer than nine fields or a
/// non-numeric index are skipped.
pub fn parse_gpu_query(csv: &str) -> Vec<GpuInfo> {
    csv.lines()
        .filter_map(|line| {
            let f = fields(line);
            if f.len() < 9 {
                return None;
            }
            let index = f[0].parse::<u32>().ok()?;
            let total = number(f[2]);
            let used = number(f[3]);
            let percent = if total > 0.0 {
                round_to(100.0 * used / total, 1)
            } else {
                0.0
            };
            Some(GpuInfo {
                index,
                name: f[1].to_string(),
                memory: GpuMemory {
                    total_mb: total,
                    used_mb: used,
                    free_mb: number(f[4]),
                    percent,
                },
                temperature_c: number(f[5]),
                power: GpuPower {
                    draw_w: number(f[6]),
                    limit_w: number(f[7]),
                },
                utilization_percent: number(f[8]),
                processes: Vec::new(),
            })
        })
        .collect()
}

/// Parse `--query-compute-apps=pid,process_name,used_memory` output.
pub fn parse_compute_apps(csv: &str) -> Vec<ComputeProcess> {
    csv.lines()
        .filter_map(|line| {
            let f = fields(line);
            if f.len() < 3 {
                return None;
            }
            Some(ComputeProcess {
                pid: f[0].parse().ok()?,
                name: f[1].to_string(),
                memory_mb: number(f[2]),
            })
        })
        .collect()
}

/// Parse `--query-compute-apps=pid,gpu_uuid,used_memory` output.
pub fn parse_app_usage(csv: &str) -> Vec<GpuAppUsage> {
    csv.lines()
        .filter_map(|line| {
            let f = fields(line);
            if f.len() < 3 {
                return None;
            }
            Some(GpuAppUsage {
                pid: f[0].parse().ok()?,
                gpu_uuid: f[1].to_string(),
                memory_mb: number(f[2]),
            })
        })
        .collect()
}

/// Parse `--query-gpu=uuid,index` output into uuid → index.
pub fn parse_uuid_index(csv: &str) -> HashMap<String, u32> {
    csv.lines()
        .filter_map(|line| {
            let (uuid, index) = line.split_once(',')?;
            Some((uuid.trim().to_string(), index.trim().parse().ok()?))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// GpuMonitor
// ---------------------------------------------------------------------------

pub struct GpuMonitor {
    runner: Arc<dyn CommandRunner>,
    program: String,
    available: OnceLock<bool>,
}

impl GpuMonitor {
    pub fn new(runner: Arc<dyn CommandRunner>, program: impl Into<String>) -> Self {
        Self {
            runner,
            program: program.into(),
            available: OnceLock::new(),
        }
    }

    /// Whether `nvidia-smi` runs. Probed once, on first use.
    pub fn is_available(&self) -> bool {
        *self.available.get_or_init(|| match self.runner.run(&self.program, &["-L"]) {
            Ok(_) => true,
            Err(e) => {
                log::info!("GPU monitoring disabled: {e}");
                false
            }
        })
    }

    fn query(&self, args: &[&str]) -> Option<String> {
        if !self.is_available() {
            return None;
        }
        match self.runner.run(&self.program, args) {
            Ok(out) => Some(out),
            Err(e) => {
                log::warn!("nvidia-smi query failed: {e}");
                None
            }
        }
    }

    /// Every GPU with its compute processes. Empty without `nvidia-smi`.
    pub fn gpus(&self) -> Vec<GpuInfo> {
        let Some(csv) = self.query(&[GPU_QUERY, CSV_FORMAT]) else {
            return Vec::new();
        };
        let mut gpus = parse_gpu_query(&csv);
        for gpu in &mut gpus {
            let id = format!("--id={}", gpu.index);
            gpu.processes = self
                .query(&[
                    "--query-compute-apps=pid,process_name,used_memory",
                    CSV_FORMAT,
                    id.as_str(),
                ])
                .map(|out| parse_compute_apps(&out))
                .unwrap_or_default();
        }
        gpus
    }

    /// Per-pid GPU memory across all GPUs.
    pub fn app_usage(&self) -> Vec<GpuAppUsage> {
        self.query(&["--query-compute-apps=pid,gpu_uuid,used_memory", CSV_FORMAT])
            .map(|out| parse_app_usage(&out))
            .unwrap_or_default()
    }

    pub fn uuid_index(&self) -> HashMap<String, u32> {
        self.query(&["--query-gpu=uuid,index", CSV_FORMAT])
            .map(|out| parse_uuid_index(&out))
            .unwrap_or_default()
    }
}
