//! Local-versus-foreign address classification.
//!
//! Local means loopback, RFC 1918 private, or link-local. Anything else,
//! including strings that do not parse as an address, counts as foreign.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Whether `address` falls in a local range.
///
/// Accepts a bare IPv4 or IPv6 address with no port. Surrounding brackets
/// and a `%zone` suffix are ignored. IPv4-mapped IPv6 addresses are judged
/// by the embedded IPv4 address.
pub fn is_local(address: &str) -> bool {
    parse_host(address).is_some_and(is_local_ip)
}

pub fn is_local_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_local_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_local_v4(v4),
            None => is_local_v6(v6),
        },
    }
}

/// Foreign flag for a peer: present and not local.
pub fn is_foreign_peer(remote: Option<&str>) -> bool {
    remote.is_some_and(|addr| !is_local(addr))
}

fn is_local_v4(ip: Ipv4Addr) -> bool {
    ip.is_loopback() || ip.is_private() || ip.is_link_local()
}

fn is_local_v6(ip: Ipv6Addr) -> bool {
    // fe80::/10
    ip.is_loopback() || (ip.segments()[0] & 0xffc0) == 0xfe80
}

/// Parse a host token as printed by `ss`/`netstat`.
pub(crate) fn parse_host(raw: &str) -> Option<IpAddr> {
    let host = raw.trim();
    let host = host.strip_prefix('[').unwrap_or(host);
    let host = host.strip_suffix(']').unwrap_or(host);
    let host = match host.split_once('%') {
        Some((addr, _zone)) => addr,
        None => host,
    };
    host.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_ranges() {
        for addr in [
            "127.0.0.1",
            "127.8.9.10",
            "192.168.1.5",
            "10.0.0.1",
            "172.16.0.1",
            "172.20.0.1",
            "172.31.255.254",
            "169.254.10.1",
            "::1",
            "fe80::1",
            "febf::1",
        ] {
            assert!(is_local(addr), "{addr} should be local");
        }
    }

    #[test]
    fn foreign_addresses() {
        for addr in [
            "8.8.8.8",
            "203.0.113.5",
            "172.32.0.1",
            "172.15.255.255",
            "2001:db8::1",
            "fec0::1",
            "0.0.0.0",
        ] {
            assert!(!is_local(addr), "{addr} should be foreign");
        }
    }

    #[test]
    fn ipv4_mapped_uses_embedded_address() {
        assert!(is_local("::ffff:127.0.0.1"));
        assert!(is_local("::ffff:192.168.0.7"));
        assert!(!is_local("::ffff:8.8.4.4"));
    }

    #[test]
    fn brackets_and_zone_are_ignored() {
        assert!(is_local("[::1]"));
        assert!(is_local("fe80::1%eth0"));
        assert!(is_local("[fe80::a00:27ff:fe4e:66a1%enp0s3]"));
        assert!(!is_local("[2001:db8::2]"));
    }

    #[test]
    fn unparseable_is_foreign() {
        assert!(!is_local(""));
        assert!(!is_local("*"));
        assert!(!is_local("localhost"));
        assert!(!is_local("300.1.1.1"));
        assert!(is_foreign_peer(Some("garbage")));
    }

    #[test]
    fn absent_peer_is_not_foreign() {
        assert!(!is_foreign_peer(None));
        assert!(!is_foreign_peer(Some("10.1.2.3")));
        assert!(is_foreign_peer(Some("1.1.1.1")));
    }
}
