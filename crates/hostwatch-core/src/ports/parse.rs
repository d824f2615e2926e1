//! Parsers for `ss -[tu]lnp` and `netstat -[tu]lnp` output.
//!
//! Both are line oriented. Malformed rows are dropped without affecting
//! their neighbours, and records come out in input order.

use super::classify::parse_host;
use super::record::{ConnectionRecord, Protocol, Tool};

/// State given to netstat UDP rows, which carry no state column.
const UNCONNECTED: &str = "UNCONN";

/// Parse one tool's socket table.
pub fn parse(raw: &str, protocol: Protocol, tool: Tool) -> Vec<ConnectionRecord> {
    raw.trim()
        .lines()
        .skip(tool.header_lines())
        .filter_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() < tool.min_columns() {
                return None;
            }
            match tool {
                Tool::Ss => parse_ss_row(&cols, protocol),
                Tool::Netstat => parse_netstat_row(&cols, protocol),
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// ss
// ---------------------------------------------------------------------------

// State Recv-Q Send-Q Local:Port Peer:Port [Process]
fn parse_ss_row(cols: &[&str], protocol: Protocol) -> Option<ConnectionRecord> {
    let (local, port) = split_local(cols[3])?;
    let remote = cols.get(4).and_then(|peer| remote_host(peer));
    let (pid, name) = if cols.len() > 5 {
        parse_ss_process(&cols[5..].join(" "))
    } else {
        (None, None)
    };
    Some(ConnectionRecord::new(port, protocol, cols[0], local, remote).with_owner(pid, name))
}

/// `users:(("sshd",pid=1234,fd=3),("sshd",pid=1240,fd=3))` → first owner.
fn parse_ss_process(desc: &str) -> (Option<u32>, Option<String>) {
    let Some((_, after_pid)) = desc.split_once("pid=") else {
        return (None, None);
    };
    let digits_end = after_pid
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(after_pid.len());
    let Ok(pid) = after_pid[..digits_end].parse::<u32>() else {
        return (None, None);
    };
    let name = desc
        .split_once("((\"")
        .and_then(|(_, rest)| rest.split_once('"'))
        .map(|(name, _)| name)
        .filter(|name| !name.is_empty())
        .map(str::to_string);
    (Some(pid), name)
}

// ---------------------------------------------------------------------------
// netstat
// ---------------------------------------------------------------------------

// Proto Recv-Q Send-Q Local:Port Foreign:Port [State] PID/Program
fn parse_netstat_row(cols: &[&str], protocol: Protocol) -> Option<ConnectionRecord> {
    let (local, port) = split_local(cols[3])?;
    let remote = remote_host(cols[4]);
    let (state, process) = if looks_like_process(cols[5]) {
        (UNCONNECTED, &cols[5..])
    } else {
        (cols[5], cols.get(6..).unwrap_or_default())
    };
    let (pid, name) = if process.is_empty() {
        (None, None)
    } else {
        parse_netstat_process(&process.join(" "))
    };
    Some(ConnectionRecord::new(port, protocol, state, local, remote).with_owner(pid, name))
}

/// `1234/python3` or `-`.
fn looks_like_process(token: &str) -> bool {
    token == "-"
        || token
            .split_once('/')
            .is_some_and(|(pid, _)| !pid.is_empty() && pid.bytes().all(|b| b.is_ascii_digit()))
}

fn parse_netstat_process(desc: &str) -> (Option<u32>, Option<String>) {
    let Some((pid, name)) = desc.split_once('/') else {
        return (None, None);
    };
    let Ok(pid) = pid.parse::<u32>() else {
        return (None, None);
    };
    let name = name.trim();
    (Some(pid), (!name.is_empty()).then(|| name.to_string()))
}

// ---------------------------------------------------------------------------
// Endpoints
// ---------------------------------------------------------------------------

/// Split `addr:port` on the last colon. The address keeps its zone but
/// loses IPv6 brackets.
fn split_local(token: &str) -> Option<(String, u16)> {
    let (host, port) = token.rsplit_once(':')?;
    let port = port.parse::<u16>().ok()?;
    let host = strip_brackets(host);
    if host.is_empty() {
        return None;
    }
    Some((host.to_string(), port))
}

/// Peer host, or `None` for a wildcard peer (`*`, `*:*`, `0.0.0.0:*`,
/// `[::]:*`, `:::*`).
fn remote_host(token: &str) -> Option<String> {
    let (host, _port) = token.rsplit_once(':').unwrap_or((token, ""));
    let host = strip_brackets(host);
    if host.is_empty() || host == "*" {
        return None;
    }
    if parse_host(host).is_some_and(|ip| ip.is_unspecified()) {
        return None;
    }
    Some(host.to_string())
}

fn strip_brackets(host: &str) -> &str {
    host.strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::classify::is_local;

    const SS_TCP: &str = "\
State  Recv-Q Send-Q Local Address:Port  Peer Address:Port Process
LISTEN 0      128          0.0.0.0:22         0.0.0.0:*     users:((\"sshd\",pid=1234,fd=3))
LISTEN 0      511        127.0.0.1:6379       0.0.0.0:*     users:((\"redis-server\",pid=901,fd=6))
LISTEN 0      128             [::]:22            [::]:*     users:((\"sshd\",pid=1234,fd=4))
LISTEN 0      4096   [::ffff:127.0.0.1]:8888        *:*
";

    const NETSTAT_TCP: &str = "\
Active Internet connections (only servers)
Proto Recv-Q Send-Q Local Address           Foreign Address         State       PID/Program name
tcp        0      0 0.0.0.0:80              203.0.113.9:51000       ESTABLISHED 5678/nginx
tcp        0      0 127.0.0.1:5432          0.0.0.0:*               LISTEN      777/postgres
tcp6       0      0 :::22                   :::*                    LISTEN      -
";

    const NETSTAT_UDP: &str = "\
Active Internet connections (only servers)
Proto Recv-Q Send-Q Local Address           Foreign Address         State       PID/Program name
udp        0      0 127.0.0.53:53           0.0.0.0:*                           612/systemd-resolve
udp        0      0 0.0.0.0:68              0.0.0.0:*                           -
udp6       0      0 fe80::1%eth0:546        :::*                                803/dhclient
";

    #[test]
    fn ss_listen_line() {
        let raw = "State Recv-Q Send-Q Local Peer\n\
                   LISTEN 0 128 0.0.0.0:22 *:* users:((\"sshd\",pid=1234,fd=3))";
        let records = parse(raw, Protocol::Tcp, Tool::Ss);
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.port, 22);
        assert_eq!(r.protocol, Protocol::Tcp);
        assert_eq!(r.state, "LISTEN");
        assert_eq!(r.pid, Some(1234));
        assert_eq!(r.process_name.as_deref(), Some("sshd"));
        assert_eq!(r.local_address, "0.0.0.0");
        assert_eq!(r.remote_address(), None);
        assert!(!r.is_foreign());
    }

    #[test]
    fn ss_table() {
        let records = parse(SS_TCP, Protocol::Tcp, Tool::Ss);
        assert_eq!(records.len(), 4);
        assert_eq!(records[1].process_name.as_deref(), Some("redis-server"));
        assert_eq!(records[1].local_address, "127.0.0.1");
        assert_eq!(records[2].local_address, "::");
        assert_eq!(records[2].port, 22);
        assert_eq!(records[3].local_address, "::ffff:127.0.0.1");
        assert_eq!(records[3].port, 8888);
        assert_eq!(records[3].pid, None);
        assert!(records.iter().all(|r| r.remote_address().is_none()));
    }

    #[test]
    fn netstat_established_line() {
        let records = parse(NETSTAT_TCP, Protocol::Tcp, Tool::Netstat);
        assert_eq!(records.len(), 3);
        let r = &records[0];
        assert_eq!(r.port, 80);
        assert_eq!(r.pid, Some(5678));
        assert_eq!(r.process_name.as_deref(), Some("nginx"));
        assert_eq!(r.remote_address(), Some("203.0.113.9"));
        assert_eq!(r.state, "ESTABLISHED");
        assert!(r.is_foreign());

        assert_eq!(records[2].local_address, "::");
        assert_eq!(records[2].pid, None);
        assert_eq!(records[2].state, "LISTEN");
    }

    #[test]
    fn netstat_udp_rows_get_unconn_state() {
        let records = parse(NETSTAT_UDP, Protocol::Udp, Tool::Netstat);
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.state == "UNCONN"));
        assert_eq!(records[0].pid, Some(612));
        assert_eq!(records[0].process_name.as_deref(), Some("systemd-resolve"));
        assert_eq!(records[1].pid, None);
        assert_eq!(records[2].local_address, "fe80::1%eth0");
        assert_eq!(records[2].port, 546);
    }

    #[test]
    fn short_line_is_dropped_without_affecting_neighbours() {
        let raw = "header\n\
                   LISTEN 0 128 0.0.0.0:22 *:*\n\
                   garbage line\n\
                   LISTEN 0 128 0.0.0.0:443 *:*";
        let records = parse(raw, Protocol::Tcp, Tool::Ss);
        let ports: Vec<u16> = records.iter().map(|r| r.port).collect();
        assert_eq!(ports, vec![22, 443]);
    }

    #[test]
    fn malformed_rows_are_skipped() {
        let raw = "header\n\
                   \n\
                   LISTEN 0 128 0.0.0.0:http *:*\n\
                   LISTEN 0 128 0.0.0.0 *:*\n\
                   LISTEN 0 128 :80 *:*\n\
                   LISTEN 0 128 0.0.0.0:70000 *:*\n\
                   LISTEN 0 128 10.0.0.1:8080 *:*";
        let records = parse(raw, Protocol::Tcp, Tool::Ss);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].port, 8080);
    }

    #[test]
    fn missing_ss_peer_column_is_wildcard() {
        let raw = "header\nUNCONN 0 0 0.0.0.0:5353";
        let records = parse(raw, Protocol::Udp, Tool::Ss);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].remote_address(), None);
        assert!(!records[0].is_foreign());
    }

    #[test]
    fn ipv6_remote_uses_last_colon() {
        let raw = "header\n\
                   ESTAB 0 0 [2001:db8::5]:443 [2001:db8::9]:50522";
        let records = parse(raw, Protocol::Tcp, Tool::Ss);
        assert_eq!(records[0].local_address, "2001:db8::5");
        assert_eq!(records[0].remote_address(), Some("2001:db8::9"));
        assert!(records[0].is_foreign());
    }

    #[test]
    fn ss_process_name_with_spaces() {
        let raw = "header\n\
                   LISTEN 0 10 127.0.0.1:9000 0.0.0.0:* users:((\"Web Content\",pid=42,fd=7))";
        let records = parse(raw, Protocol::Tcp, Tool::Ss);
        assert_eq!(records[0].pid, Some(42));
        assert_eq!(records[0].process_name.as_deref(), Some("Web Content"));
    }

    #[test]
    fn ss_process_without_pid_is_absent() {
        assert_eq!(parse_ss_process("users:((\"x\",fd=3))"), (None, None));
        assert_eq!(
            parse_ss_process("users:((\"a\",pid=10,fd=3),(\"b\",pid=11,fd=4))"),
            (Some(10), Some("a".to_string()))
        );
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(parse("", Protocol::Tcp, Tool::Ss).is_empty());
        assert!(parse("   \n", Protocol::Udp, Tool::Netstat).is_empty());
    }

    #[test]
    fn foreign_flag_matches_classifier_for_every_record() {
        let mut all = parse(SS_TCP, Protocol::Tcp, Tool::Ss);
        all.extend(parse(NETSTAT_TCP, Protocol::Tcp, Tool::Netstat));
        all.extend(parse(NETSTAT_UDP, Protocol::Udp, Tool::Netstat));
        for r in &all {
            let expected = r.remote_address().is_some_and(|a| !is_local(a));
            assert_eq!(r.is_foreign(), expected, "{r:?}");
        }
    }

    #[test]
    fn wildcard_peers() {
        for token in ["*", "*:*", "0.0.0.0:*", "[::]:*", ":::*", "[::]:0"] {
            assert_eq!(remote_host(token), None, "{token}");
        }
        assert_eq!(remote_host("8.8.8.8:53").as_deref(), Some("8.8.8.8"));
        assert_eq!(remote_host("192.168.1.1:*").as_deref(), Some("192.168.1.1"));
    }
}
