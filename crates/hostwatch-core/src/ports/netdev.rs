//! Interface byte counters from `/proc/net/dev`.

use std::path::Path;

use serde::Serialize;

use super::record::ConnectionRecord;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceCounters {
    pub interface: String,
    pub received_bytes: u64,
    pub sent_bytes: u64,
}

/// Parse `/proc/net/dev` text.
///
/// Header rows (those mentioning `bytes`, or without an `iface:` prefix)
/// are skipped. The kernel glues large counters onto the colon
/// (`eth0:123456`), so the name is split off at the colon rather than at
/// whitespace. Receive bytes is the first counter, transmit bytes the ninth.
pub fn parse_net_dev(text: &str) -> Vec<InterfaceCounters> {
    let mut out = Vec::new();
    for line in text.lines() {
        if line.contains("bytes") {
            continue;
        }
        let Some((name, rest)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim();
        let fields: Vec<&str> = rest.split_whitespace().collect();
        if name.is_empty() || fields.len() < 9 {
            continue;
        }
        let (Ok(received_bytes), Ok(sent_bytes)) =
            (fields[0].parse::<u64>(), fields[8].parse::<u64>())
        else {
            continue;
        };
        out.push(InterfaceCounters {
            interface: name.to_string(),
            received_bytes,
            sent_bytes,
        });
    }
    out
}

/// Read and parse a `/proc/net/dev`-format file. Unreadable → empty.
pub fn read_net_dev(path: &Path) -> Vec<InterfaceCounters> {
    match std::fs::read_to_string(path) {
        Ok(text) => parse_net_dev(&text),
        Err(e) => {
            log::debug!("cannot read {}: {e}", path.display());
            Vec::new()
        }
    }
}

/// Attach the last interface's counters to every port-0 record.
///
/// There is no per-socket byte accounting; this keeps the established
/// behaviour where port-0 rows stand in for interface traffic.
pub fn attach_interface_counters(records: &mut [ConnectionRecord], counters: &[InterfaceCounters]) {
    let Some(last) = counters.last() else {
        return;
    };
    for record in records.iter_mut().filter(|r| r.port == 0) {
        record.received_bytes = last.received_bytes;
        record.sent_bytes = last.sent_bytes;
    }
}
