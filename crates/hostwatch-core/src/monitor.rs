//! Caller-owned bundle of every collector.
//!
//! `Monitor` is `Send + Sync`; share it as `Arc<Monitor>`. The port engine
//! and system readers are stateless. The training registry and the
//! electricity price are the only mutable state and sit behind locks.

use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use serde::Serialize;

use crate::config::MonitorConfig;
use crate::energy::{EnergyCalculator, EnergyCost};
use crate::error::HostwatchError;
use crate::gpu::GpuMonitor;
use crate::helpers::{CommandRunner, SystemCommandRunner};
use crate::ports::{PortAnalyzer, PortReport};
use crate::system::{SystemMonitor, SystemSnapshot};
use crate::training::{JobAction, TrainingReport, TrainingTracker};

/// Everything at once.
#[derive(Debug, Clone, Serialize)]
pub struct FullReport {
    pub system: SystemSnapshot,
    pub energy: EnergyCost,
    pub ports: PortReport,
    pub training: TrainingReport,
}

pub struct Monitor {
    config: MonitorConfig,
    system: SystemMonitor,
    energy: RwLock<EnergyCalculator>,
    ports: PortAnalyzer,
    training: Mutex<TrainingTracker>,
}

impl Monitor {
    /// Monitor backed by the real executables.
    pub fn new(config: MonitorConfig) -> Self {
        let timeout = Duration::from_millis(config.ports.command_timeout_ms);
        Self::with_runner(config, Arc::new(SystemCommandRunner::new(timeout)))
    }

    /// Monitor whose external commands all go through `runner`.
    pub fn with_runner(config: MonitorConfig, runner: Arc<dyn CommandRunner>) -> Self {
        let gpu = Arc::new(GpuMonitor::new(
            runner.clone(),
            config.system.nvidia_smi.clone(),
        ));
        Self {
            system: SystemMonitor::new(&config.system, gpu.clone()),
            energy: RwLock::new(EnergyCalculator::new(&config.energy)),
            ports: PortAnalyzer::from_config(&config.ports, runner),
            training: Mutex::new(TrainingTracker::new(
                &config.training,
                config.system.proc_root.clone(),
                gpu,
            )),
            config,
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn system(&self) -> SystemSnapshot {
        self.system.snapshot()
    }

    /// Direct access for callers that need one reading (CPU, RAM, disk,
    /// GPUs) without a full snapshot.
    pub fn system_monitor(&self) -> &SystemMonitor {
        &self.system
    }

    pub fn energy(&self) -> EnergyCost {
        self.energy_for(&self.system())
    }

    /// Cost of an existing snapshot, without sampling again.
    pub fn energy_for(&self, snapshot: &SystemSnapshot) -> EnergyCost {
        self.energy
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .system_cost(snapshot)
    }

    pub fn ports(&self) -> PortReport {
        self.ports.analyze()
    }

    pub fn training(&self) -> TrainingReport {
        self.training
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .report()
    }

    pub fn all(&self) -> FullReport {
        let system = self.system();
        let energy = self.energy_for(&system);
        FullReport {
            system,
            energy,
            ports: self.ports(),
            training: self.training(),
        }
    }

    pub fn electricity_price(&self) -> f64 {
        self.energy
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .price_per_kwh()
    }

    pub fn set_electricity_price(&self, price_per_kwh: f64) -> Result<(), HostwatchError> {
        self.energy
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .set_price(price_per_kwh)?;
        log::info!("electricity price set to {price_per_kwh}/kWh");
        Ok(())
    }

    pub fn control_job(&self, pid: u32, action: JobAction) -> Result<(), HostwatchError> {
        self.training
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .control(pid, action)?;
        Ok(())
    }
}
