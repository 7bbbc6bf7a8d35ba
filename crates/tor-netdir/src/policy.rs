//! Exit-policy representation and matching (spec.md §3 "a relay with Exit
//! must have a non-empty accept policy", §4.6 step 2, §8 "Exit policy
//! matches spec").
//!
//! A policy is an ordered list of accept/reject rules over address/port
//! patterns, evaluated first-match-wins; a target matching no rule is
//! rejected, matching the real Tor convention.

use std::net::Ipv4Addr;

/// Whether a policy entry accepts or rejects the addresses/ports it
/// matches.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PolicyAction {
    /// Traffic to a matching address/port is allowed.
    Accept,
    /// Traffic to a matching address/port is refused.
    Reject,
}

/// An address pattern within a policy rule: either "any address" (`*`) or
/// an IPv4 network in CIDR form.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AddrPattern {
    /// Matches every address.
    Wildcard,
    /// Matches addresses within `net/bits`.
    Net(Ipv4Addr, u8),
}

impl AddrPattern {
    /// Return true if `addr` falls within this pattern. A `None` target
    /// address (used when checking a RESOLVE-only request with no
    /// concrete destination) matches only the wildcard.
    fn matches(&self, addr: Option<Ipv4Addr>) -> bool {
        match (self, addr) {
            (AddrPattern::Wildcard, _) => true,
            (AddrPattern::Net(_, _), None) => false,
            (AddrPattern::Net(net, bits), Some(addr)) => {
                let mask = if *bits == 0 {
                    0
                } else {
                    u32::MAX << (32 - bits)
                };
                u32::from(*net) & mask == u32::from(addr) & mask
            }
        }
    }
}

/// A port range within a policy rule, inclusive on both ends.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PortRange {
    /// Lowest port this rule covers.
    pub lo: u16,
    /// Highest port this rule covers.
    pub hi: u16,
}

impl PortRange {
    /// A range covering every port.
    pub const ALL: PortRange = PortRange { lo: 0, hi: 65535 };

    /// A range covering exactly one port.
    pub fn single(port: u16) -> Self {
        PortRange { lo: port, hi: port }
    }

    /// Return true if `port` falls within this range.
    fn matches(&self, port: u16) -> bool {
        self.lo <= port && port <= self.hi
    }
}

/// One rule within an [`ExitPolicy`]: accept or reject traffic to
/// addresses matching `addr` on ports within `ports`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PolicyRule {
    /// Whether this rule accepts or rejects.
    pub action: PolicyAction,
    /// The address pattern this rule covers.
    pub addr: AddrPattern,
    /// The port range this rule covers.
    pub ports: PortRange,
}

/// An ordered, first-match-wins set of accept/reject rules describing what
/// a relay is willing to exit traffic to.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExitPolicy {
    rules: Vec<PolicyRule>,
}

impl ExitPolicy {
    /// Build a policy from an explicit rule list.
    pub fn new(rules: Vec<PolicyRule>) -> Self {
        ExitPolicy { rules }
    }

    /// The policy that rejects everything; used for non-exit relays.
    pub fn reject_all() -> Self {
        ExitPolicy { rules: Vec::new() }
    }

    /// Return true if this policy has at least one `Accept` rule (spec.md
    /// §3's "a relay with Exit must have a non-empty accept policy").
    pub fn has_accept_rule(&self) -> bool {
        self.rules
            .iter()
            .any(|r| r.action == PolicyAction::Accept)
    }

    /// Evaluate the policy against `addr`/`port`, first-match-wins, falling
    /// through to reject if no rule matches.
    pub fn accepts(&self, addr: Option<Ipv4Addr>, port: u16) -> bool {
        for rule in &self.rules {
            if rule.addr.matches(addr) && rule.ports.matches(port) {
                return rule.action == PolicyAction::Accept;
            }
        }
        false
    }

    /// Return true if this policy accepts port 53 for any address, or
    /// otherwise has a general accept rule covering all addresses and
    /// ports — used to decide whether a relay can serve a SOCKS RESOLVE
    /// request with no concrete target (spec.md §4.6 step 2).
    pub fn accepts_resolve(&self) -> bool {
        self.accepts(None, 53) || self.rules.iter().any(|r| {
            r.action == PolicyAction::Accept
                && r.addr == AddrPattern::Wildcard
                && r.ports == PortRange::ALL
        })
    }

    /// Parse a comma-separated policy string such as
    /// `"accept *:80,accept *:443,reject *:*"`.
    pub fn parse(text: &str) -> Option<Self> {
        let mut rules = Vec::new();
        for entry in text.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let (action_str, rest) = entry.split_once(' ')?;
            let action = match action_str {
                "accept" => PolicyAction::Accept,
                "reject" => PolicyAction::Reject,
                _ => return None,
            };
            let (addr_str, port_str) = rest.split_once(':')?;
            let addr = if addr_str == "*" {
                AddrPattern::Wildcard
            } else if let Some((net, bits)) = addr_str.split_once('/') {
                AddrPattern::Net(net.parse().ok()?, bits.parse().ok()?)
            } else {
                AddrPattern::Net(addr_str.parse().ok()?, 32)
            };
            let ports = if port_str == "*" {
                PortRange::ALL
            } else if let Some((lo, hi)) = port_str.split_once('-') {
                PortRange {
                    lo: lo.parse().ok()?,
                    hi: hi.parse().ok()?,
                }
            } else {
                PortRange::single(port_str.parse().ok()?)
            };
            rules.push(PolicyRule { action, addr, ports });
        }
        Some(ExitPolicy { rules })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn canonical_policy_matches_spec() {
        // spec.md §8: "accept *:80, accept *:443, reject *:*" only accepts
        // (any, 80) and (any, 443); everything else is rejected.
        let policy = ExitPolicy::parse("accept *:80,accept *:443,reject *:*").unwrap();
        let addr = Some(Ipv4Addr::new(198, 51, 100, 7));
        assert!(policy.accepts(addr, 80));
        assert!(policy.accepts(addr, 443));
        assert!(!policy.accepts(addr, 22));
        assert!(!policy.accepts(addr, 8080));
    }

    #[test]
    fn no_matching_rule_rejects() {
        let policy = ExitPolicy::parse("accept *:80").unwrap();
        assert!(!policy.accepts(Some(Ipv4Addr::new(1, 2, 3, 4)), 443));
    }

    #[test]
    fn subnet_rule_matches_only_its_range() {
        let policy = ExitPolicy::parse("reject 10.0.0.0/8:*,accept *:*").unwrap();
        assert!(!policy.accepts(Some(Ipv4Addr::new(10, 1, 2, 3)), 80));
        assert!(policy.accepts(Some(Ipv4Addr::new(11, 1, 2, 3)), 80));
    }

    #[test]
    fn resolve_exit_requires_53_or_general_accept() {
        let dns_only = ExitPolicy::parse("accept *:53,reject *:*").unwrap();
        assert!(dns_only.accepts_resolve());
        let web_only = ExitPolicy::parse("accept *:80,reject *:*").unwrap();
        assert!(!web_only.accepts_resolve());
        let general = ExitPolicy::parse("accept *:*").unwrap();
        assert!(general.accepts_resolve());
    }
}
