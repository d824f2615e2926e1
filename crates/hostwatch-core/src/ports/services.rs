//! Port → service name resolution.

use std::collections::HashMap;
use std::path::Path;

use super::record::Protocol;

/// Resolves a (port, protocol) pair to a service name.
pub trait ServiceResolver: Send + Sync {
    fn lookup(&self, port: u16, protocol: Protocol) -> Option<&str>;

    /// Name for display; `Unknown_<port>` when nothing matches.
    fn service_name(&self, port: u16, protocol: Protocol) -> String {
        match self.lookup(port, protocol) {
            Some(name) => name.to_string(),
            None => format!("Unknown_{port}"),
        }
    }
}

/// Well-known ports used when no services database is available.
const WELL_KNOWN: &[(u16, &str)] = &[
    (20, "ftp-data"),
    (21, "ftp"),
    (22, "ssh"),
    (23, "telnet"),
    (25, "smtp"),
    (53, "domain"),
    (67, "bootps"),
    (68, "bootpc"),
    (80, "http"),
    (110, "pop3"),
    (111, "sunrpc"),
    (123, "ntp"),
    (137, "netbios-ns"),
    (143, "imap2"),
    (161, "snmp"),
    (389, "ldap"),
    (443, "https"),
    (445, "microsoft-ds"),
    (465, "submissions"),
    (514, "syslog"),
    (546, "dhcpv6-client"),
    (547, "dhcpv6-server"),
    (587, "submission"),
    (631, "ipp"),
    (636, "ldaps"),
    (873, "rsync"),
    (993, "imaps"),
    (995, "pop3s"),
    (1194, "openvpn"),
    (1433, "ms-sql-s"),
    (1883, "mqtt"),
    (2049, "nfs"),
    (3306, "mysql"),
    (3389, "ms-wbt-server"),
    (5353, "mdns"),
    (5432, "postgresql"),
    (5672, "amqp"),
    (5900, "rfb"),
    (6379, "redis"),
    (6443, "sun-sr-https"),
    (8080, "http-alt"),
    (9090, "websm"),
    (9418, "git"),
    (11211, "memcache"),
    (27017, "mongodb"),
];

/// Service table loaded from an `/etc/services`-format file, backed by a
/// built-in list of well-known ports.
#[derive(Debug, Clone, Default)]
pub struct ServiceTable {
    entries: HashMap<(u16, Protocol), String>,
}

impl ServiceTable {
    /// The built-in well-known list, registered for both protocols.
    pub fn builtin() -> Self {
        let mut entries = HashMap::with_capacity(WELL_KNOWN.len() * 2);
        for &(port, name) in WELL_KNOWN {
            for protocol in Protocol::ALL {
                entries.insert((port, protocol), name.to_string());
            }
        }
        Self { entries }
    }

    /// Parse `name port/proto [aliases...] [# comment]` lines. The first
    /// entry for a (port, protocol) pair wins.
    pub fn parse(text: &str) -> Self {
        let mut entries = HashMap::new();
        for line in text.lines() {
            let line = line.split('#').next().unwrap_or_default();
            let mut parts = line.split_whitespace();
            let (Some(name), Some(port_proto)) = (parts.next(), parts.next()) else {
                continue;
            };
            let Some((port, proto)) = port_proto.split_once('/') else {
                continue;
            };
            let Ok(port) = port.parse::<u16>() else {
                continue;
            };
            let protocol = match proto {
                "tcp" => Protocol::Tcp,
                "udp" => Protocol::Udp,
                _ => continue,
            };
            entries
                .entry((port, protocol))
                .or_insert_with(|| name.to_string());
        }
        Self { entries }
    }

    /// Services file layered over the built-in list. A missing or
    /// unreadable file leaves only the built-in entries.
    pub fn load(path: Option<&Path>) -> Self {
        let mut table = Self::builtin();
        let Some(path) = path else {
            return table;
        };
        match std::fs::read_to_string(path) {
            Ok(text) => table.entries.extend(Self::parse(&text).entries),
            Err(e) => log::debug!("services file {} unavailable: {e}", path.display()),
        }
        table
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ServiceResolver for ServiceTable {
    fn lookup(&self, port: u16, protocol: Protocol) -> Option<&str> {
        self.entries.get(&(port, protocol)).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SERVICES: &str = "\
# Network services, Internet style
tcpmux		1/tcp				# TCP port service multiplexer
ssh		22/tcp				# SSH Remote Login Protocol
domain		53/tcp
domain		53/udp
http		80/tcp		www		# WorldWideWeb HTTP
www-alt		80/tcp
bogus		notaport/tcp
sctp-thing	9/sctp
";

    #[test]
    fn parses_services_file() {
        let table = ServiceTable::parse(SERVICES);
        assert_eq!(table.lookup(22, Protocol::Tcp), Some("ssh"));
        assert_eq!(table.lookup(53, Protocol::Udp), Some("domain"));
        assert_eq!(table.lookup(80, Protocol::Tcp), Some("http"));
        assert_eq!(table.lookup(22, Protocol::Udp), None);
        assert_eq!(table.len(), 5);
    }

    #[test]
    fn unknown_placeholder() {
        let table = ServiceTable::default();
        assert!(table.is_empty());
        assert_eq!(table.service_name(40000, Protocol::Tcp), "Unknown_40000");
    }

    #[test]
    fn file_entries_override_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("services");
        std::fs::write(&path, "my-ssh 22/tcp\n").unwrap();
        let table = ServiceTable::load(Some(&path));
        assert_eq!(table.service_name(22, Protocol::Tcp), "my-ssh");
        assert_eq!(table.service_name(22, Protocol::Udp), "ssh");
        assert_eq!(table.service_name(443, Protocol::Tcp), "https");
    }

    #[test]
    fn missing_file_falls_back_to_builtin() {
        let table = ServiceTable::load(Some(Path::new("/nonexistent/services")));
        assert_eq!(table.service_name(6379, Protocol::Tcp), "redis");
    }
}
