use std::path::PathBuf;
use std::sync::Arc;

use crate::config::PortsConfig;
use crate::helpers::CommandRunner;

use super::collect::{Collection, FallbackCoordinator};
use super::netdev::{attach_interface_counters, read_net_dev};
use super::report::{PortReport, summarize};
use super::services::{ServiceResolver, ServiceTable};
use super::source::CommandSource;

/// Full port analysis: collect, attach interface counters, summarize.
pub struct PortAnalyzer {
    coordinator: FallbackCoordinator,
    services: Box<dyn ServiceResolver>,
    net_dev_path: Option<PathBuf>,
}

impl PortAnalyzer {
    pub fn new(coordinator: FallbackCoordinator, services: Box<dyn ServiceResolver>) -> Self {
        Self {
            coordinator,
            services,
            net_dev_path: None,
        }
    }

    pub fn from_config(config: &PortsConfig, runner: Arc<dyn CommandRunner>) -> Self {
        let coordinator = FallbackCoordinator::new(
            Box::new(CommandSource::new(config.primary_tool, runner.clone())),
            Box::new(CommandSource::new(config.fallback_tool, runner)),
            config.fallback_policy,
        );
        let services = ServiceTable::load(config.services_path.as_deref());
        Self {
            coordinator,
            services: Box::new(services),
            net_dev_path: config.net_dev_path.clone(),
        }
    }

    pub fn analyze(&self) -> PortReport {
        let Collection {
            mut records,
            outcome,
        } = self.coordinator.collect();

        let interfaces = self
            .net_dev_path
            .as_deref()
            .map(read_net_dev)
            .unwrap_or_default();
        attach_interface_counters(&mut records, &interfaces);

        let mut report = summarize(records, self.services.as_ref());
        report.collection = Some(outcome);
        report.interfaces = interfaces;
        log::debug!(
            "port analysis via {outcome}: {} sockets, {} foreign",
            report.total_ports(),
            report.total_foreign()
        );
        report
    }
}
