//! Training job detection and control.
//!
//! A training job is a process whose name and command line mention python
//! together with an ML keyword, or a framework name on its own. The
//! tracker keeps the last CPU sample of every job it has seen so CPU
//! percent can be computed as a delta, and only lets callers signal pids
//! that are currently tracked.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::config::TrainingConfig;
use crate::error::JobControlError;
use crate::gpu::GpuMonitor;
use crate::helpers::{BYTES_PER_MB, read_trimmed, round_to, unix_ms_now};
use crate::system::MemInfo;

// ---------------------------------------------------------------------------
// Report types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobCpu {
    pub percent: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobMemory {
    pub used_mb: f64,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobGpu {
    pub index: u32,
    pub memory_mb: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobIo {
    pub read_mb: f64,
    pub write_mb: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingJob {
    pub pid: u32,
    pub process_name: String,
    pub command: String,
    pub status: String,
    pub start_unix_ms: u64,
    pub cpu: JobCpu,
    pub memory: JobMemory,
    pub gpu: Option<JobGpu>,
    pub threads: u32,
    pub io: JobIo,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub collected_unix_ms: u64,
    pub total_jobs: usize,
    pub jobs: Vec<TrainingJob>,
}

// ---------------------------------------------------------------------------
// JobAction
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobAction {
    /// SIGTERM
    Stop,
    /// SIGSTOP
    Pause,
    /// SIGCONT
    Resume,
}

impl JobAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Pause => "pause",
            Self::Resume => "resume",
        }
    }

    pub fn past_tense(self) -> &'static str {
        match self {
            Self::Stop => "stopped",
            Self::Pause => "paused",
            Self::Resume => "resumed",
        }
    }

    #[cfg(unix)]
    fn signal(self) -> libc::c_int {
        match self {
            Self::Stop => libc::SIGTERM,
            Self::Pause => libc::SIGSTOP,
            Self::Resume => libc::SIGCONT,
        }
    }
}

impl fmt::Display for JobAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stop" => Ok(Self::Stop),
            "pause" => Ok(Self::Pause),
            "resume" => Ok(Self::Resume),
            other => Err(format!("unknown job action '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct JobMatcher {
    keywords: Vec<String>,
    framework_keywords: Vec<String>,
}

impl JobMatcher {
    pub fn new(config: &TrainingConfig) -> Self {
        let lower =
            |v: &[String]| -> Vec<String> { v.iter().map(|k| k.to_lowercase()).collect() };
        Self {
            keywords: lower(&config.keywords),
            framework_keywords: lower(&config.framework_keywords),
        }
    }

    pub fn matches(&self, name: &str, cmdline: &str) -> bool {
        let combined = format!("{name} {cmdline}").to_lowercase();
        let contains = |k: &String| combined.contains(k.as_str());
        (combined.contains("python") && self.keywords.iter().any(contains))
            || self.framework_keywords.iter().any(contains)
    }
}

// ---------------------------------------------------------------------------
// procfs parsing
// ---------------------------------------------------------------------------

/// Fields of `/proc/<pid>/stat` used here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcStat {
    pub state: char,
    pub utime: u64,
    pub stime: u64,
    pub num_threads: u32,
    pub starttime: u64,
}

impl ProcStat {
    /// The command name may contain spaces and parentheses, so fields are
    /// counted from the last `)`.
    pub fn parse(text: &str) -> Option<Self> {
        let (_, rest) = text.rsplit_once(')')?;
        let f: Vec<&str> = rest.split_whitespace().collect();
        if f.len() < 20 {
            return None;
        }
        Some(Self {
            state: f[0].chars().next()?,
            utime: f[11].parse().ok()?,
            stime: f[12].parse().ok()?,
            num_threads: f[17].parse().ok()?,
            starttime: f[19].parse().ok()?,
        })
    }

    pub fn cpu_ticks(&self) -> u64 {
        self.utime + self.stime
    }
}

pub fn status_label(state: char) -> String {
    match state {
        'R' => "running",
        'S' => "sleeping",
        'D' => "disk-sleep",
        'Z' => "zombie",
        'T' => "stopped",
        't' => "tracing",
        'I' => "idle",
        'X' | 'x' => "dead",
        other => return other.to_string(),
    }
    .to_string()
}

/// `VmRSS` from `/proc/<pid>/status`, in kB.
pub fn parse_vm_rss_kb(status: &str) -> Option<u64> {
    status
        .lines()
        .find_map(|l| l.strip_prefix("VmRSS:"))
        .and_then(|v| v.split_whitespace().next())
        .and_then(|v| v.parse().ok())
}

/// `(read_bytes, write_bytes)` from `/proc/<pid>/io`.
pub fn parse_io_bytes(io: &str) -> (u64, u64) {
    let field = |key: &str| {
        io.lines()
            .find_map(|l| l.strip_prefix(key))
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(0)
    };
    (field("read_bytes:"), field("write_bytes:"))
}

/// `btime` (boot time, unix seconds) from `/proc/stat`.
pub fn parse_boot_time(stat: &str) -> Option<u64> {
    stat.lines()
        .find_map(|l| l.strip_prefix("btime "))
        .and_then(|v| v.trim().parse().ok())
}

#[cfg(unix)]
fn clock_ticks_per_second() -> f64 {
    // SAFETY: `sysconf` is thread-safe for this query and has no side effects.
    let hz = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    if hz > 0 { hz as f64 } else { 100.0 }
}

#[cfg(not(unix))]
fn clock_ticks_per_second() -> f64 {
    100.0
}

/// One process as read from procfs.
struct ProcessSample {
    pid: u32,
    name: String,
    command: String,
    stat: ProcStat,
    rss_kb: u64,
    io: (u64, u64),
}

fn read_process(dir: &Path, pid: u32, matcher: &JobMatcher) -> Option<ProcessSample> {
    let name = read_trimmed(&dir.join("comm")).unwrap_or_default();
    let command = std::fs::read(dir.join("cmdline"))
        .map(|raw| {
            raw.split(|&b| b == 0)
                .filter(|part| !part.is_empty())
                .map(String::from_utf8_lossy)
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default();
    if !matcher.matches(&name, &command) {
        return None;
    }
    let stat = ProcStat::parse(&std::fs::read_to_string(dir.join("stat")).ok()?)?;
    let rss_kb = std::fs::read_to_string(dir.join("status"))
        .ok()
        .as_deref()
        .and_then(parse_vm_rss_kb)
        .unwrap_or(0);
    let io = std::fs::read_to_string(dir.join("io"))
        .map(|text| parse_io_bytes(&text))
        .unwrap_or((0, 0));
    Some(ProcessSample {
        pid,
        name,
        command,
        stat,
        rss_kb,
        io,
    })
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

struct CpuSample {
    ticks: u64,
    at: Instant,
}

pub struct TrainingTracker {
    proc_root: PathBuf,
    matcher: JobMatcher,
    gpu: Arc<GpuMonitor>,
    clk_tck: f64,
    /// Tracked jobs and their last CPU sample.
    seen: HashMap<u32, CpuSample>,
}

impl TrainingTracker {
    pub fn new(
        config: &TrainingConfig,
        proc_root: impl Into<PathBuf>,
        gpu: Arc<GpuMonitor>,
    ) -> Self {
        Self {
            proc_root: proc_root.into(),
            matcher: JobMatcher::new(config),
            gpu,
            clk_tck: clock_ticks_per_second(),
            seen: HashMap::new(),
        }
    }

    pub fn is_tracked(&self, pid: u32) -> bool {
        self.seen.contains_key(&pid)
    }

    pub fn tracked_pids(&self) -> Vec<u32> {
        let mut pids: Vec<u32> = self.seen.keys().copied().collect();
        pids.sort_unstable();
        pids
    }

    /// Scan procfs for training jobs. Jobs that vanished since the last
    /// scan are forgotten.
    pub fn detect(&mut self) -> Vec<TrainingJob> {
        let now = Instant::now();
        let Ok(entries) = std::fs::read_dir(&self.proc_root) else {
            log::warn!("cannot list {}", self.proc_root.display());
            self.seen.clear();
            return Vec::new();
        };

        let mut samples: Vec<ProcessSample> = entries
            .flatten()
            .filter_map(|entry| {
                let pid = entry.file_name().to_str()?.parse::<u32>().ok()?;
                read_process(&entry.path(), pid, &self.matcher)
            })
            .collect();
        samples.sort_by_key(|s| s.pid);

        if samples.is_empty() {
            self.seen.clear();
            return Vec::new();
        }

        let proc_stat = std::fs::read_to_string(self.proc_root.join("stat")).unwrap_or_default();
        let boot_secs = parse_boot_time(&proc_stat).unwrap_or(0);
        let mem_total_kb = MemInfo::read(&self.proc_root).map_or(0, |m| m.total_kb);

        let usage = self.gpu.app_usage();
        let uuid_index = if usage.is_empty() {
            HashMap::new()
        } else {
            self.gpu.uuid_index()
        };

        let mut seen = HashMap::with_capacity(samples.len());
        let jobs = samples
            .into_iter()
            .map(|s| {
                let ticks = s.stat.cpu_ticks();
                let cpu_percent = match self.seen.get(&s.pid) {
                    Some(prev) => {
                        let elapsed = now.duration_since(prev.at).as_secs_f64();
                        if elapsed > 0.0 {
                            ticks.saturating_sub(prev.ticks) as f64 / self.clk_tck / elapsed
                                * 100.0
                        } else {
                            0.0
                        }
                    }
                    None => 0.0,
                };
                seen.insert(s.pid, CpuSample { ticks, at: now });

                let memory_percent = if mem_total_kb > 0 {
                    100.0 * s.rss_kb as f64 / mem_total_kb as f64
                } else {
                    0.0
                };
                let gpu = usage.iter().find(|u| u.pid == s.pid).and_then(|u| {
                    uuid_index.get(&u.gpu_uuid).map(|&index| JobGpu {
                        index,
                        memory_mb: round_to(u.memory_mb, 2),
                    })
                });
                let start_unix_ms = boot_secs * 1000
                    + (s.stat.starttime as f64 * 1000.0 / self.clk_tck) as u64;

                TrainingJob {
                    pid: s.pid,
                    process_name: s.name,
                    command: s.command,
                    status: status_label(s.stat.state),
                    start_unix_ms,
                    cpu: JobCpu {
                        percent: round_to(cpu_percent, 2),
                    },
                    memory: JobMemory {
                        used_mb: round_to(s.rss_kb as f64 / 1024.0, 2),
                        percent: round_to(memory_percent, 2),
                    },
                    gpu,
                    threads: s.stat.num_threads,
                    io: JobIo {
                        read_mb: round_to(s.io.0 as f64 / BYTES_PER_MB, 2),
                        write_mb: round_to(s.io.1 as f64 / BYTES_PER_MB, 2),
                    },
                }
            })
            .collect();
        self.seen = seen;
        jobs
    }

    pub fn report(&mut self) -> TrainingReport {
        let jobs = self.detect();
        TrainingReport {
            collected_unix_ms: unix_ms_now(),
            total_jobs: jobs.len(),
            jobs,
        }
    }

    /// Signal a job. The pid must still be a training job after a fresh
    /// scan.
    pub fn control(&mut self, pid: u32, action: JobAction) -> Result<(), JobControlError> {
        self.detect();
        if pid == 0 || !self.is_tracked(pid) {
            return Err(JobControlError::NotTracked(pid));
        }
        send_signal(pid, action)?;
        log::info!("training job {pid} {}", action.past_tense());
        Ok(())
    }
}

#[cfg(unix)]
fn send_signal(pid: u32, action: JobAction) -> Result<(), JobControlError> {
    let target = libc::pid_t::try_from(pid).map_err(|_| JobControlError::NoSuchProcess(pid))?;
    // SAFETY: kill() has no memory-safety preconditions; target is a
    // positive pid so no process group is addressed.
    let rc = unsafe { libc::kill(target, action.signal()) };
    if rc == 0 {
        return Ok(());
    }
    let err = std::io::Error::last_os_error();
    Err(match err.raw_os_error() {
        Some(libc::ESRCH) => JobControlError::NoSuchProcess(pid),
        Some(libc::EPERM) => JobControlError::PermissionDenied(pid),
        _ => JobControlError::Os { pid, source: err },
    })
}

#[cfg(not(unix))]
fn send_signal(_pid: u32, _action: JobAction) -> Result<(), JobControlError> {
    Err(JobControlError::Unsupported)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CommandError;
    use crate::helpers::CommandRunner;
    use std::fs;

    struct Smi;

    impl CommandRunner for Smi {
        fn run(&self, _program: &str, args: &[&str]) -> Result<String, CommandError> {
            Ok(match args.first().copied() {
                Some(a) if a.starts_with("--query-compute-apps=pid,gpu_uuid") => {
                    "1234, GPU-aaaa, 2048\n9999, GPU-bbbb, 512\n".to_string()
                }
                Some(a) if a.starts_with("--query-gpu=uuid") => "GPU-aaaa, 0\n".to_string(),
                _ => String::new(),
            })
        }
    }

    struct NoSmi;

    impl CommandRunner for NoSmi {
        fn run(&self, program: &str, _args: &[&str]) -> Result<String, CommandError> {
            Err(CommandError::NotFound {
                program: program.into(),
            })
        }
    }

    fn stat_line(pid: u32, comm: &str, state: char, utime: u64) -> String {
        format!("{pid} ({comm}) {state} 1 {pid} {pid} 0 -1 4194560 100 0 0 0 {utime} 100 0 0 20 0 8 0 12345 1000 50")
    }

    fn fake_process(root: &Path, pid: u32, comm: &str, cmdline: &[&str], utime: u64) {
        let dir = root.join(pid.to_string());
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("comm"), format!("{comm}\n")).unwrap();
        let mut raw = cmdline.join("\0");
        raw.push('\0');
        fs::write(dir.join("cmdline"), raw).unwrap();
        fs::write(dir.join("stat"), stat_line(pid, comm, 'S', utime)).unwrap();
        fs::write(dir.join("status"), "Name:\tx\nVmRSS:\t  204800 kB\nThreads:\t8\n").unwrap();
        fs::write(dir.join("io"), "rchar: 1\nread_bytes: 1048576\nwrite_bytes: 2097152\n").unwrap();
    }

    fn fake_root() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("stat"), "cpu  1 2 3 4\nbtime 1700000000\n").unwrap();
        fs::write(dir.path().join("meminfo"), "MemTotal: 1024000 kB\nMemAvailable: 512000 kB\n").unwrap();
        fake_process(dir.path(), 1234, "python3", &["python3", "train.py", "--epochs", "10"], 500);
        fake_process(dir.path(), 55, "bash", &["-bash"], 10);
        fake_process(dir.path(), 77, "python3", &["python3", "-m", "http.server"], 10);
        fake_process(dir.path(), 88, "torchrun", &["torchrun", "--nproc", "8", "job.sh"], 10);
        fs::create_dir_all(dir.path().join("self")).unwrap();
        dir
    }

    fn tracker(root: &Path, runner: Arc<dyn CommandRunner>) -> TrainingTracker {
        let gpu = Arc::new(GpuMonitor::new(runner, "nvidia-smi"));
        TrainingTracker::new(&TrainingConfig::default(), root, gpu)
    }

    #[test]
    fn matcher_rules() {
        let m = JobMatcher::new(&TrainingConfig::default());
        assert!(m.matches("python3", "python3 train.py"));
        assert!(m.matches("python", "python finetune_model.py"));
        assert!(m.matches("torchrun", "torchrun job.sh"));
        assert!(m.matches("TensorFlow-serving", ""));
        assert!(!m.matches("bash", "-bash"));
        assert!(!m.matches("node", "node train.js"));
        // "python" is itself a keyword, so any python process matches
        assert!(m.matches("python3", "python3 -m http.server"));
    }

    #[test]
    fn parses_proc_stat_with_spaces_in_comm() {
        let stat = ProcStat::parse(&stat_line(42, "python3 (worker) 1", 'R', 700)).unwrap();
        assert_eq!(stat.state, 'R');
        assert_eq!(stat.utime, 700);
        assert_eq!(stat.stime, 100);
        assert_eq!(stat.num_threads, 8);
        assert_eq!(stat.starttime, 12345);
        assert_eq!(stat.cpu_ticks(), 800);
        assert_eq!(ProcStat::parse("42 (x) S 1 2"), None);
    }

    #[test]
    fn status_and_io_parsing() {
        assert_eq!(status_label('S'), "sleeping");
        assert_eq!(status_label('D'), "disk-sleep");
        assert_eq!(status_label('W'), "W");
        assert_eq!(parse_vm_rss_kb("VmRSS:\t  1024 kB\n"), Some(1024));
        assert_eq!(parse_vm_rss_kb("Name: kthreadd\n"), None);
        assert_eq!(parse_io_bytes("read_bytes: 10\nwrite_bytes: 20\n"), (10, 20));
        assert_eq!(parse_io_bytes(""), (0, 0));
        assert_eq!(parse_boot_time("cpu 1\nbtime 17\n"), Some(17));
    }

    #[test]
    fn detects_jobs_in_fake_procfs() {
        let root = fake_root();
        let mut t = tracker(root.path(), Arc::new(Smi));
        let jobs = t.detect();

        let pids: Vec<u32> = jobs.iter().map(|j| j.pid).collect();
        assert_eq!(pids, vec![77, 88, 1234]);
        assert_eq!(t.tracked_pids(), vec![77, 88, 1234]);

        let job = jobs.iter().find(|j| j.pid == 1234).unwrap();
        assert_eq!(job.process_name, "python3");
        assert_eq!(job.command, "python3 train.py --epochs 10");
        assert_eq!(job.status, "sleeping");
        assert_eq!(job.threads, 8);
        assert_eq!(job.cpu.percent, 0.0);
        assert_eq!(job.memory.used_mb, 200.0);
        assert_eq!(job.memory.percent, 20.0);
        assert_eq!(job.io.read_mb, 1.0);
        assert_eq!(job.io.write_mb, 2.0);
        assert!(job.start_unix_ms >= 1_700_000_000_000);
        assert_eq!(
            job.gpu,
            Some(JobGpu {
                index: 0,
                memory_mb: 2048.0
            })
        );
        assert_eq!(jobs.iter().find(|j| j.pid == 88).unwrap().gpu, None);
    }

    #[test]
    fn cpu_percent_is_delta_against_previous_scan() {
        let root = fake_root();
        let mut t = tracker(root.path(), Arc::new(NoSmi));
        t.detect();
        std::thread::sleep(std::time::Duration::from_millis(20));
        fs::write(
            root.path().join("1234/stat"),
            stat_line(1234, "python3", 'R', 600),
        )
        .unwrap();
        let jobs = t.detect();
        let job = jobs.iter().find(|j| j.pid == 1234).unwrap();
        assert!(job.cpu.percent > 0.0);
        assert_eq!(job.status, "running");
        assert!(job.gpu.is_none());
    }

    #[test]
    fn vanished_jobs_are_pruned() {
        let root = fake_root();
        let mut t = tracker(root.path(), Arc::new(NoSmi));
        t.detect();
        assert!(t.is_tracked(88));
        fs::remove_dir_all(root.path().join("88")).unwrap();
        t.detect();
        assert!(!t.is_tracked(88));
        assert!(t.is_tracked(1234));
    }

    #[test]
    fn untracked_pid_cannot_be_controlled() {
        let root = fake_root();
        let mut t = tracker(root.path(), Arc::new(NoSmi));
        assert!(matches!(
            t.control(55, JobAction::Stop),
            Err(JobControlError::NotTracked(55))
        ));
        assert!(matches!(
            t.control(0, JobAction::Pause),
            Err(JobControlError::NotTracked(0))
        ));
    }

    #[test]
    #[cfg(unix)]
    fn signals_a_tracked_child() {
        let mut child = std::process::Command::new("sleep").arg("30").spawn().unwrap();
        let root = fake_root();
        fake_process(root.path(), child.id(), "python3", &["python3", "train.py"], 1);
        let mut t = tracker(root.path(), Arc::new(NoSmi));

        t.control(child.id(), JobAction::Pause).unwrap();
        t.control(child.id(), JobAction::Resume).unwrap();
        t.control(child.id(), JobAction::Stop).unwrap();
        let status = child.wait().unwrap();
        assert!(!status.success());
    }

    #[test]
    fn action_parsing() {
        assert_eq!("pause".parse::<JobAction>().unwrap(), JobAction::Pause);
        assert!("kill".parse::<JobAction>().is_err());
        assert_eq!(JobAction::Resume.past_tense(), "resumed");
    }
}
