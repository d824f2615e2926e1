//! Tool fallback: run the primary socket tool, and when it fails rerun the
//! capture with the secondary one.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CommandError;

use super::parse::parse;
use super::record::{ConnectionRecord, Protocol, Tool};
use super::source::ConnectionSource;

/// How a primary failure is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// One tool supplies both protocols. Any primary failure discards the
    /// primary's records and reruns both passes on the fallback.
    #[default]
    Strict,
    /// A tool that fails is abandoned for the rest of the call, but records
    /// it already produced are kept. A primary UDP failure therefore mixes
    /// primary TCP rows with fallback UDP rows.
    PerProtocol,
}

impl fmt::Display for FallbackPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Strict => f.write_str("strict"),
            Self::PerProtocol => f.write_str("per_protocol"),
        }
    }
}

/// Which tool produced each protocol's rows. `None` means every tool
/// failed for that protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CollectionOutcome {
    pub tcp: Option<Tool>,
    pub udp: Option<Tool>,
}

impl CollectionOutcome {
    fn single(tool: Tool) -> Self {
        Self {
            tcp: Some(tool),
            udp: Some(tool),
        }
    }

    fn set(&mut self, protocol: Protocol, tool: Tool) {
        match protocol {
            Protocol::Tcp => self.tcp = Some(tool),
            Protocol::Udp => self.udp = Some(tool),
        }
    }

    /// No tool produced anything; the empty record list means nothing.
    pub fn is_failed(&self) -> bool {
        self.tcp.is_none() && self.udp.is_none()
    }
}

impl fmt::Display for CollectionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = |t: Option<Tool>| t.map_or("failed", Tool::program);
        match (self.tcp, self.udp) {
            (None, None) => f.write_str("failed"),
            (Some(a), Some(b)) if a == b => write!(f, "{a}"),
            (tcp, udp) => write!(f, "tcp: {}, udp: {}", name(tcp), name(udp)),
        }
    }
}

/// Records from one coordinator call.
#[derive(Debug, Clone, Default)]
pub struct Collection {
    pub records: Vec<ConnectionRecord>,
    pub outcome: CollectionOutcome,
}

pub struct FallbackCoordinator {
    primary: Box<dyn ConnectionSource>,
    fallback: Box<dyn ConnectionSource>,
    policy: FallbackPolicy,
}

impl FallbackCoordinator {
    pub fn new(
        primary: Box<dyn ConnectionSource>,
        fallback: Box<dyn ConnectionSource>,
        policy: FallbackPolicy,
    ) -> Self {
        Self {
            primary,
            fallback,
            policy,
        }
    }

    /// Capture TCP then UDP. Never fails: when every tool fails the
    /// collection is empty and its outcome says so.
    pub fn collect(&self) -> Collection {
        match self.policy {
            FallbackPolicy::Strict => self.collect_strict(),
            FallbackPolicy::PerProtocol => self.collect_per_protocol(),
        }
    }

    fn collect_strict(&self) -> Collection {
        for source in [self.primary.as_ref(), self.fallback.as_ref()] {
            match capture_all(source) {
                Ok(records) => {
                    return Collection {
                        records,
                        outcome: CollectionOutcome::single(source.tool()),
                    };
                }
                Err(e) => log::warn!("{} capture failed: {e}", source.tool()),
            }
        }
        log::warn!("no socket tool succeeded; port report is empty");
        Collection::default()
    }

    fn collect_per_protocol(&self) -> Collection {
        let sources = [self.primary.as_ref(), self.fallback.as_ref()];
        let mut first_usable = 0;
        let mut collection = Collection::default();

        for protocol in Protocol::ALL {
            for (i, source) in sources.iter().enumerate().skip(first_usable) {
                match capture_one(*source, protocol) {
                    Ok(records) => {
                        collection.records.extend(records);
                        collection.outcome.set(protocol, source.tool());
                        break;
                    }
                    Err(e) => {
                        log::warn!("{} {protocol} capture failed: {e}", source.tool());
                        first_usable = i + 1;
                    }
                }
            }
        }

        if collection.outcome.is_failed() {
            log::warn!("no socket tool succeeded; port report is empty");
        }
        collection
    }
}

fn capture_one(
    source: &dyn ConnectionSource,
    protocol: Protocol,
) -> Result<Vec<ConnectionRecord>, CommandError> {
    let raw = source.capture(protocol)?;
    Ok(parse(&raw, protocol, source.tool()))
}

fn capture_all(source: &dyn ConnectionSource) -> Result<Vec<ConnectionRecord>, CommandError> {
    let mut records = Vec::new();
    for protocol in Protocol::ALL {
        records.extend(capture_one(source, protocol)?);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    const SS_TCP: &str = "State Recv-Q Send-Q Local Peer\n\
                          LISTEN 0 128 0.0.0.0:22 0.0.0.0:* users:((\"sshd\",pid=1,fd=3))";
    const SS_UDP: &str = "State Recv-Q Send-Q Local Peer\n\
                          UNCONN 0 0 0.0.0.0:68 0.0.0.0:*";
    const NETSTAT_TCP: &str = "Active Internet connections\n\
                               Proto Recv-Q Send-Q Local Foreign State PID\n\
                               tcp 0 0 0.0.0.0:80 203.0.113.9:51000 ESTABLISHED 5678/nginx";
    const NETSTAT_UDP: &str = "Active Internet connections\n\
                               Proto Recv-Q Send-Q Local Foreign State PID\n\
                               udp 0 0 0.0.0.0:123 0.0.0.0:* 300/chronyd";

    /// Canned source that fails for the listed protocols and logs calls.
    struct Fake {
        tool: Tool,
        fail: Vec<Protocol>,
        calls: Arc<Mutex<Vec<(Tool, Protocol)>>>,
    }

    impl ConnectionSource for Fake {
        fn tool(&self) -> Tool {
            self.tool
        }

        fn capture(&self, protocol: Protocol) -> Result<String, CommandError> {
            self.calls.lock().unwrap().push((self.tool, protocol));
            if self.fail.contains(&protocol) {
                return Err(CommandError::NotFound {
                    program: self.tool.program().to_string(),
                });
            }
            Ok(match (self.tool, protocol) {
                (Tool::Ss, Protocol::Tcp) => SS_TCP,
                (Tool::Ss, Protocol::Udp) => SS_UDP,
                (Tool::Netstat, Protocol::Tcp) => NETSTAT_TCP,
                (Tool::Netstat, Protocol::Udp) => NETSTAT_UDP,
            }
            .to_string())
        }
    }

    type Calls = Arc<Mutex<Vec<(Tool, Protocol)>>>;

    fn coordinator(
        ss_fails: &[Protocol],
        netstat_fails: &[Protocol],
        policy: FallbackPolicy,
    ) -> (FallbackCoordinator, Calls) {
        let calls: Calls = Arc::default();
        let primary = Fake {
            tool: Tool::Ss,
            fail: ss_fails.to_vec(),
            calls: calls.clone(),
        };
        let fallback = Fake {
            tool: Tool::Netstat,
            fail: netstat_fails.to_vec(),
            calls: calls.clone(),
        };
        (
            FallbackCoordinator::new(Box::new(primary), Box::new(fallback), policy),
            calls,
        )
    }

    fn ports(c: &Collection) -> Vec<u16> {
        c.records.iter().map(|r| r.port).collect()
    }

    #[test]
    fn primary_success_never_touches_fallback() {
        let (coord, calls) = coordinator(&[], &[], FallbackPolicy::Strict);
        let c = coord.collect();
        assert_eq!(ports(&c), vec![22, 68]);
        assert_eq!(c.outcome, CollectionOutcome::single(Tool::Ss));
        assert!(calls.lock().unwrap().iter().all(|(t, _)| *t == Tool::Ss));
    }

    #[test]
    fn primary_tcp_failure_uses_fallback_for_both() {
        let (coord, calls) = coordinator(&[Protocol::Tcp], &[], FallbackPolicy::Strict);
        let c = coord.collect();
        assert_eq!(ports(&c), vec![80, 123]);
        assert_eq!(c.outcome, CollectionOutcome::single(Tool::Netstat));
        assert_eq!(
            *calls.lock().unwrap(),
            vec![
                (Tool::Ss, Protocol::Tcp),
                (Tool::Netstat, Protocol::Tcp),
                (Tool::Netstat, Protocol::Udp),
            ]
        );
    }

    #[test]
    fn strict_discards_primary_rows_on_udp_failure() {
        let (coord, _) = coordinator(&[Protocol::Udp], &[], FallbackPolicy::Strict);
        let c = coord.collect();
        assert_eq!(ports(&c), vec![80, 123]);
        assert_eq!(c.outcome.tcp, Some(Tool::Netstat));
    }

    #[test]
    fn per_protocol_keeps_primary_tcp() {
        let (coord, calls) = coordinator(&[Protocol::Udp], &[], FallbackPolicy::PerProtocol);
        let c = coord.collect();
        assert_eq!(ports(&c), vec![22, 123]);
        assert_eq!(c.outcome.tcp, Some(Tool::Ss));
        assert_eq!(c.outcome.udp, Some(Tool::Netstat));
        assert_eq!(calls.lock().unwrap().len(), 3);
        assert_eq!(c.outcome.to_string(), "tcp: ss, udp: netstat");
    }

    #[test]
    fn per_protocol_abandons_failed_primary() {
        let (coord, calls) = coordinator(&[Protocol::Tcp], &[], FallbackPolicy::PerProtocol);
        let c = coord.collect();
        assert_eq!(ports(&c), vec![80, 123]);
        assert!(
            !calls
                .lock()
                .unwrap()
                .contains(&(Tool::Ss, Protocol::Udp))
        );
    }

    #[test]
    fn both_tools_failing_is_empty_not_error() {
        let all = [Protocol::Tcp, Protocol::Udp];
        for policy in [FallbackPolicy::Strict, FallbackPolicy::PerProtocol] {
            let (coord, _) = coordinator(&all, &all, policy);
            let c = coord.collect();
            assert!(c.records.is_empty());
            assert!(c.outcome.is_failed());
            assert_eq!(c.outcome.to_string(), "failed");
        }
    }

    #[test]
    fn policy_deserializes_snake_case() {
        let p: FallbackPolicy = serde_json::from_str("\"per_protocol\"").unwrap();
        assert_eq!(p, FallbackPolicy::PerProtocol);
        assert_eq!(FallbackPolicy::default(), FallbackPolicy::Strict);
    }
}
