//! # hostwatch-core
//!
//! Host telemetry for GPU training machines.
//!
//! The centerpiece is the port and connection classification engine in
//! [`ports`]: it shells out to `ss` (falling back to `netstat`), parses the
//! socket tables into [`ConnectionRecord`]s, flags every connection whose
//! peer lies outside the loopback / private / link-local ranges, and folds
//! the result into a [`PortReport`].
//!
//! Around it sit the system, GPU, energy and training-job monitors, tied
//! together by [`Monitor`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use hostwatch_core::{Monitor, MonitorConfig};
//!
//! let monitor = Monitor::new(MonitorConfig::default());
//! let report = monitor.ports();
//! if report.foreign_alert() {
//!     for entry in report.foreign_connections() {
//!         println!("{} -> {:?}", entry.record.port, entry.record.remote_address());
//!     }
//! }
//! ```

pub mod config;
pub mod energy;
pub mod error;
pub mod gpu;
pub mod helpers;
pub mod monitor;
pub mod ports;
pub mod system;
pub mod training;

pub use config::{EnergyConfig, MonitorConfig, PortsConfig, SystemConfig, TrainingConfig};
pub use energy::{ComponentCost, EnergyCalculator, EnergyCost, EnergyTotals};
pub use error::{CommandError, ConfigError, HostwatchError, JobControlError};
pub use gpu::{ComputeProcess, GpuInfo, GpuMonitor};
pub use helpers::{CommandRunner, SystemCommandRunner};
pub use monitor::{FullReport, Monitor};
pub use ports::{
    Collection, CollectionOutcome, CommandSource, ConnectionRecord, ConnectionSource,
    FallbackCoordinator, FallbackPolicy, PortAnalyzer, PortEntry, PortReport, Protocol,
    ServiceResolver, ServiceTable, Tool, is_local, parse, summarize,
};
pub use system::{CpuInfo, DiskInfo, RamInfo, SystemMonitor, SystemSnapshot};
pub use training::{JobAction, TrainingJob, TrainingReport, TrainingTracker};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
