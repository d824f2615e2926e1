//! Aggregation of connection records into a port report.

use serde::{Serialize, Serializer};

use crate::helpers::unix_ms_now;

use super::collect::CollectionOutcome;
use super::netdev::InterfaceCounters;
use super::record::ConnectionRecord;
use super::services::ServiceResolver;

/// A record plus its resolved service name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortEntry {
    #[serde(flatten)]
    pub record: ConnectionRecord,
    pub service: String,
}

/// Snapshot of every observed socket with listening / established /
/// foreign views.
///
/// The views are index lists into a single entry vector; a record shows up
/// in the foreign view regardless of its state.
#[derive(Debug, Clone)]
pub struct PortReport {
    pub collected_unix_ms: u64,
    entries: Vec<PortEntry>,
    listening: Vec<usize>,
    established: Vec<usize>,
    foreign: Vec<usize>,
    /// Which tool produced the rows. `None` when built from bare records.
    pub collection: Option<CollectionOutcome>,
    pub interfaces: Vec<InterfaceCounters>,
}

/// Build a report from records, resolving each port's service name.
pub fn summarize(records: Vec<ConnectionRecord>, services: &dyn ServiceResolver) -> PortReport {
    let mut listening = Vec::new();
    let mut established = Vec::new();
    let mut foreign = Vec::new();

    let entries: Vec<PortEntry> = records
        .into_iter()
        .enumerate()
        .map(|(i, record)| {
            if record.is_listening() {
                listening.push(i);
            }
            if record.is_established() {
                established.push(i);
            }
            if record.is_foreign() {
                foreign.push(i);
            }
            let service = services.service_name(record.port, record.protocol);
            PortEntry { record, service }
        })
        .collect();

    PortReport {
        collected_unix_ms: unix_ms_now(),
        entries,
        listening,
        established,
        foreign,
        collection: None,
        interfaces: Vec::new(),
    }
}

impl PortReport {
    pub fn all_ports(&self) -> &[PortEntry] {
        &self.entries
    }

    pub fn listening_ports(&self) -> impl Iterator<Item = &PortEntry> {
        self.view(&self.listening)
    }

    pub fn established_connections(&self) -> impl Iterator<Item = &PortEntry> {
        self.view(&self.established)
    }

    pub fn foreign_connections(&self) -> impl Iterator<Item = &PortEntry> {
        self.view(&self.foreign)
    }

    fn view<'a>(&'a self, indices: &'a [usize]) -> impl Iterator<Item = &'a PortEntry> {
        indices.iter().map(|&i| &self.entries[i])
    }

    pub fn total_ports(&self) -> usize {
        self.entries.len()
    }

    pub fn total_listening(&self) -> usize {
        self.listening.len()
    }

    pub fn total_established(&self) -> usize {
        self.established.len()
    }

    pub fn total_foreign(&self) -> usize {
        self.foreign.len()
    }

    pub fn foreign_alert(&self) -> bool {
        !self.foreign.is_empty()
    }
}

#[derive(Serialize)]
struct PortReportView<'a> {
    collected_unix_ms: u64,
    listening_ports: Vec<&'a PortEntry>,
    established_connections: Vec<&'a PortEntry>,
    foreign_connections: Vec<&'a PortEntry>,
    total_ports: usize,
    total_listening: usize,
    total_established: usize,
    foreign_alert: bool,
    all_ports: &'a [PortEntry],
    collection: Option<&'a CollectionOutcome>,
    interfaces: &'a [InterfaceCounters],
}

impl Serialize for PortReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        PortReportView {
            collected_unix_ms: self.collected_unix_ms,
            listening_ports: self.listening_ports().collect(),
            established_connections: self.established_connections().collect(),
            foreign_connections: self.foreign_connections().collect(),
            total_ports: self.total_ports(),
            total_listening: self.total_listening(),
            total_established: self.total_established(),
            foreign_alert: self.foreign_alert(),
            all_ports: &self.entries,
            collection: self.collection.as_ref(),
            interfaces: &self.interfaces,
        }
        .serialize(serializer)
    }
}
