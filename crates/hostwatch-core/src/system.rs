//! CPU, memory, disk and GPU snapshot.
//!
//! Reads procfs/sysfs under configurable roots so the parsers can be driven
//! by fake trees in tests. Every reader is best-effort: a missing file
//! yields zeros rather than an error.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::SystemConfig;
use crate::gpu::{GpuInfo, GpuMonitor};
use crate::helpers::{BYTES_PER_GB, read_trimmed, round_to, unix_ms_now};

// ---------------------------------------------------------------------------
// Snapshot types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuInfo {
    pub percent: f64,
    pub freq_ghz: f64,
    pub count: usize,
    pub temp_c: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RamInfo {
    pub total_gb: f64,
    pub used_gb: f64,
    pub percent: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiskInfo {
    pub path: PathBuf,
    pub total_gb: f64,
    pub used_gb: f64,
    pub percent: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemSnapshot {
    pub collected_unix_ms: u64,
    pub cpu: CpuInfo,
    pub ram: RamInfo,
    pub disk: DiskInfo,
    pub gpus: Vec<GpuInfo>,
}

// ---------------------------------------------------------------------------
// procfs parsing
// ---------------------------------------------------------------------------

/// Aggregate jiffies from the `cpu ` line of `/proc/stat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuTimes {
    pub idle: u64,
    pub total: u64,
}

pub fn parse_cpu_times(stat: &str) -> Option<CpuTimes> {
    let rest = stat.lines().find_map(|l| l.strip_prefix("cpu "))?;
    let parts: Vec<u64> = rest
        .split_whitespace()
        .filter_map(|s| s.parse::<u64>().ok())
        .collect();
    if parts.len() < 4 {
        return None;
    }
    // user nice system idle iowait irq softirq steal; guest time is
    // already counted in user.
    let total = parts.iter().take(8).sum();
    let idle = parts[3] + parts.get(4).copied().unwrap_or(0);
    Some(CpuTimes { idle, total })
}

/// Busy share between two samples, in percent.
pub fn cpu_percent_between(before: CpuTimes, after: CpuTimes) -> f64 {
    let total = after.total.saturating_sub(before.total);
    if total == 0 {
        return 0.0;
    }
    let idle = after.idle.saturating_sub(before.idle).min(total);
    round_to(100.0 * (total - idle) as f64 / total as f64, 1)
}

/// Logical CPUs listed in `/proc/stat` (`cpu0`, `cpu1`, ...).
pub fn count_cpus(stat: &str) -> usize {
    stat.lines()
        .filter(|l| {
            l.strip_prefix("cpu")
                .is_some_and(|r| r.starts_with(|c: char| c.is_ascii_digit()))
        })
        .count()
}

/// Average `cpu MHz` across `/proc/cpuinfo` entries.
pub fn parse_cpuinfo_mhz(cpuinfo: &str) -> Option<f64> {
    let values: Vec<f64> = cpuinfo
        .lines()
        .filter_map(|line| {
            let (key, value) = line.split_once(':')?;
            if key.trim() != "cpu MHz" {
                return None;
            }
            value.trim().parse::<f64>().ok()
        })
        .collect();
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// The `/proc/meminfo` fields needed for usage, in kB.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemInfo {
    pub total_kb: u64,
    pub available_kb: u64,
}

impl MemInfo {
    pub fn parse(text: &str) -> Option<Self> {
        let mut total = None;
        let mut available = None;
        let mut free = 0;
        let mut buffers = 0;
        let mut cached = 0;
        for line in text.lines() {
            let Some((key, rest)) = line.split_once(':') else {
                continue;
            };
            let Some(kb) = rest
                .split_whitespace()
                .next()
                .and_then(|v| v.parse::<u64>().ok())
            else {
                continue;
            };
            match key {
                "MemTotal" => total = Some(kb),
                "MemAvailable" => available = Some(kb),
                "MemFree" => free = kb,
                "Buffers" => buffers = kb,
                "Cached" => cached = kb,
                _ => {}
            }
        }
        let total_kb = total?;
        // Kernels before 3.14 have no MemAvailable.
        let available_kb = available.unwrap_or(free + buffers + cached).min(total_kb);
        Some(Self {
            total_kb,
            available_kb,
        })
    }

    pub fn read(proc_root: &Path) -> Option<Self> {
        Self::parse(&std::fs::read_to_string(proc_root.join("meminfo")).ok()?)
    }
}

impl From<MemInfo> for RamInfo {
    fn from(mem: MemInfo) -> Self {
        let total = mem.total_kb as f64 * 1024.0;
        let used = (mem.total_kb - mem.available_kb) as f64 * 1024.0;
        let percent = if total > 0.0 {
            100.0 * used / total
        } else {
            0.0
        };
        RamInfo {
            total_gb: round_to(total / BYTES_PER_GB, 2),
            used_gb: round_to(used / BYTES_PER_GB, 2),
            percent: round_to(percent, 1),
        }
    }
}

// ---------------------------------------------------------------------------
// hwmon
// ---------------------------------------------------------------------------

/// First temperature reading (°C) of every hwmon chip, in directory order.
pub fn read_hwmon_temperatures(sys_root: &Path) -> Vec<(String, f64)> {
    let Ok(entries) = std::fs::read_dir(sys_root.join("class/hwmon")) else {
        return Vec::new();
    };
    let mut dirs: Vec<PathBuf> = entries.flatten().map(|e| e.path()).collect();
    dirs.sort();

    let mut out = Vec::new();
    for dir in dirs {
        let chip = read_trimmed(&dir.join("name")).unwrap_or_else(|| {
            dir.file_name()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default()
        });
        let Ok(files) = std::fs::read_dir(&dir) else {
            continue;
        };
        let mut inputs: Vec<PathBuf> = files
            .flatten()
            .map(|f| f.path())
            .filter(|p| {
                p.file_name()
                    .map(|n| n.to_string_lossy())
                    .is_some_and(|n| n.starts_with("temp") && n.ends_with("_input"))
            })
            .collect();
        inputs.sort();
        let reading = inputs
            .iter()
            .find_map(|p| read_trimmed(p).and_then(|s| s.parse::<f64>().ok()));
        if let Some(millideg) = reading {
            out.push((chip, millideg / 1000.0));
        }
    }
    out
}

/// CPU package temperature: `coretemp`, then `k10temp`, then whatever chip
/// reported first. 0.0 when there are no readings.
pub fn pick_cpu_temperature(readings: &[(String, f64)]) -> f64 {
    ["coretemp", "k10temp"]
        .iter()
        .find_map(|want| readings.iter().find(|(chip, _)| chip.as_str() == *want))
        .or_else(|| readings.first())
        .map_or(0.0, |(_, t)| round_to(*t, 1))
}

// ---------------------------------------------------------------------------
// Disk
// ---------------------------------------------------------------------------

#[cfg(unix)]
fn disk_usage(path: &Path) -> Option<DiskInfo> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes()).ok()?;
    // SAFETY: an all-zero statvfs is a valid value for this plain C struct.
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    // SAFETY: c_path is NUL-terminated and stat is a valid out-pointer.
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
    if rc != 0 {
        return None;
    }

    let frsize = stat.f_frsize as f64;
    let total = stat.f_blocks as f64 * frsize;
    let free = stat.f_bfree as f64 * frsize;
    let avail = stat.f_bavail as f64 * frsize;
    let used = total - free;
    // Matches df: reserved blocks count as neither used nor available.
    let percent = if used + avail > 0.0 {
        100.0 * used / (used + avail)
    } else {
        0.0
    };
    Some(DiskInfo {
        path: path.to_path_buf(),
        total_gb: round_to(total / BYTES_PER_GB, 2),
        used_gb: round_to(used / BYTES_PER_GB, 2),
        percent: round_to(percent, 1),
    })
}

#[cfg(not(unix))]
fn disk_usage(_path: &Path) -> Option<DiskInfo> {
    None
}

// ---------------------------------------------------------------------------
// SystemMonitor
// ---------------------------------------------------------------------------

pub struct SystemMonitor {
    proc_root: PathBuf,
    sys_root: PathBuf,
    disk_path: PathBuf,
    cpu_sample: Duration,
    gpu: Arc<GpuMonitor>,
}

impl SystemMonitor {
    pub fn new(config: &SystemConfig, gpu: Arc<GpuMonitor>) -> Self {
        Self {
            proc_root: config.proc_root.clone(),
            sys_root: config.sys_root.clone(),
            disk_path: config.disk_path.clone(),
            cpu_sample: Duration::from_millis(config.cpu_sample_ms),
            gpu,
        }
    }

    pub fn gpu(&self) -> &GpuMonitor {
        &self.gpu
    }

    /// Blocks for the CPU sampling interval.
    pub fn snapshot(&self) -> SystemSnapshot {
        SystemSnapshot {
            collected_unix_ms: unix_ms_now(),
            cpu: self.cpu(),
            ram: self.ram(),
            disk: self.disk(),
            gpus: self.gpu.gpus(),
        }
    }

    pub fn cpu(&self) -> CpuInfo {
        let stat_path = self.proc_root.join("stat");
        let first = std::fs::read_to_string(&stat_path).ok();
        let before = first.as_deref().and_then(parse_cpu_times);
        if !self.cpu_sample.is_zero() {
            std::thread::sleep(self.cpu_sample);
        }
        let after = std::fs::read_to_string(&stat_path)
            .ok()
            .as_deref()
            .and_then(parse_cpu_times);
        let percent = match (before, after) {
            (Some(b), Some(a)) => cpu_percent_between(b, a),
            _ => 0.0,
        };

        let count = first
            .as_deref()
            .map(count_cpus)
            .filter(|&n| n > 0)
            .or_else(|| std::thread::available_parallelism().ok().map(|n| n.get()))
            .unwrap_or(0);

        CpuInfo {
            percent,
            freq_ghz: self.cpu_freq_ghz(),
            count,
            temp_c: pick_cpu_temperature(&read_hwmon_temperatures(&self.sys_root)),
        }
    }

    fn cpu_freq_ghz(&self) -> f64 {
        let scaling = self
            .sys_root
            .join("devices/system/cpu/cpu0/cpufreq/scaling_cur_freq");
        if let Some(khz) = read_trimmed(&scaling).and_then(|s| s.parse::<f64>().ok()) {
            return round_to(khz / 1_000_000.0, 2);
        }
        std::fs::read_to_string(self.proc_root.join("cpuinfo"))
            .ok()
            .as_deref()
            .and_then(parse_cpuinfo_mhz)
            .map_or(0.0, |mhz| round_to(mhz / 1000.0, 2))
    }

    pub fn ram(&self) -> RamInfo {
        MemInfo::read(&self.proc_root)
            .map(RamInfo::from)
            .unwrap_or_default()
    }

    pub fn disk(&self) -> DiskInfo {
        disk_usage(&self.disk_path).unwrap_or_else(|| {
            log::debug!("statvfs failed for {}", self.disk_path.display());
            DiskInfo {
                path: self.disk_path.clone(),
                ..DiskInfo::default()
            }
        })
    }
}
