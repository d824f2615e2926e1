use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::classify::is_foreign_peer;

// ---------------------------------------------------------------------------
// Protocol
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    /// Capture order used by the coordinator.
    pub const ALL: [Protocol; 2] = [Protocol::Tcp, Protocol::Udp];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tool
// ---------------------------------------------------------------------------

/// A socket listing utility and its output layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    Ss,
    Netstat,
}

impl Tool {
    pub fn program(self) -> &'static str {
        match self {
            Self::Ss => "ss",
            Self::Netstat => "netstat",
        }
    }

    /// Arguments for a listening-socket dump with owning processes.
    pub fn args(self, protocol: Protocol) -> &'static [&'static str] {
        match protocol {
            Protocol::Tcp => &["-tlnp"],
            Protocol::Udp => &["-ulnp"],
        }
    }

    /// Header lines preceding the socket rows.
    pub fn header_lines(self) -> usize {
        match self {
            Self::Ss => 1,
            Self::Netstat => 2,
        }
    }

    /// Rows with fewer whitespace-separated columns are malformed.
    pub fn min_columns(self) -> usize {
        match self {
            Self::Ss => 4,
            Self::Netstat => 6,
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.program())
    }
}

impl FromStr for Tool {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ss" => Ok(Self::Ss),
            "netstat" => Ok(Self::Netstat),
            other => Err(format!("unknown tool '{other}' (expected ss or netstat)")),
        }
    }
}

// ---------------------------------------------------------------------------
// ConnectionRecord
// ---------------------------------------------------------------------------

/// One observed socket endpoint.
///
/// `is_foreign` is derived from the remote address when the record is
/// built and cannot be set independently: both fields are private and only
/// [`ConnectionRecord::new`] writes them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionRecord {
    pub port: u16,
    pub protocol: Protocol,
    pub state: String,
    pub pid: Option<u32>,
    pub process_name: Option<String>,
    pub local_address: String,
    remote_address: Option<String>,
    is_foreign: bool,
    pub received_bytes: u64,
    pub sent_bytes: u64,
}

impl ConnectionRecord {
    pub fn new(
        port: u16,
        protocol: Protocol,
        state: impl Into<String>,
        local_address: impl Into<String>,
        remote_address: Option<String>,
    ) -> Self {
        let is_foreign = is_foreign_peer(remote_address.as_deref());
        Self {
            port,
            protocol,
            state: state.into(),
            pid: None,
            process_name: None,
            local_address: local_address.into(),
            remote_address,
            is_foreign,
            received_bytes: 0,
            sent_bytes: 0,
        }
    }

    /// Attach the owning process. A name without a pid is dropped.
    pub fn with_owner(mut self, pid: Option<u32>, process_name: Option<String>) -> Self {
        self.pid = pid;
        self.process_name = pid.and(process_name);
        self
    }

    pub fn remote_address(&self) -> Option<&str> {
        self.remote_address.as_deref()
    }

    pub fn is_foreign(&self) -> bool {
        self.is_foreign
    }

    pub fn is_listening(&self) -> bool {
        self.state == "LISTEN"
    }

    pub fn is_established(&self) -> bool {
        self.state == "ESTABLISHED"
    }
}
