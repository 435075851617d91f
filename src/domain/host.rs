//! Host classification for SSRF defense.
//!
//! A host is refused when it points back at the service itself, at loopback,
//! at a private or link-local network, or at a cloud metadata / cluster-internal
//! name. Classification is purely lexical: nothing is resolved here. Hostnames
//! that resolve to private addresses pass this guard; see
//! [`resolve_and_check`](crate::infrastructure::resolve::resolve_and_check) for the
//! opt-in resolved-address check.

use crate::domain::url::{NormalizedUrl, ValidationError};
use std::fmt;
use std::net::Ipv6Addr;

/// Why a host was blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockReason {
    /// The service's own domain.
    SelfReferential,
    /// `localhost`, `127.0.0.0/8`, `::1`.
    Loopback,
    /// Instance metadata endpoints.
    CloudMetadata,
    /// Cluster-internal service names.
    ClusterInternal,
    /// `10.0.0.0/8`, `172.16.0.0/12`, `192.168.0.0/16`.
    PrivateNetwork,
    /// `169.254.0.0/16`, `fe80::/10`.
    LinkLocal,
    /// `fc00::/7`.
    UniqueLocal,
    /// `0.0.0.0/8`, `::`.
    Unspecified,
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            BlockReason::SelfReferential => "self-referential host",
            BlockReason::Loopback => "loopback address",
            BlockReason::CloudMetadata => "cloud metadata endpoint",
            BlockReason::ClusterInternal => "cluster-internal host",
            BlockReason::PrivateNetwork => "private network address",
            BlockReason::LinkLocal => "link-local address",
            BlockReason::UniqueLocal => "unique-local address",
            BlockReason::Unspecified => "unspecified address",
        };
        f.write_str(text)
    }
}

/// Outcome of classifying a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostClassification {
    Allowed,
    Blocked(BlockReason),
}

impl HostClassification {
    pub fn is_blocked(&self) -> bool {
        matches!(self, HostClassification::Blocked(_))
    }

    pub fn reason(&self) -> Option<BlockReason> {
        match self {
            HostClassification::Allowed => None,
            HostClassification::Blocked(reason) => Some(*reason),
        }
    }
}

/// Names and literals refused regardless of configuration.
const DENYLIST: &[(&str, BlockReason)] = &[
    ("localhost", BlockReason::Loopback),
    ("localhost.localdomain", BlockReason::Loopback),
    ("ip6-localhost", BlockReason::Loopback),
    ("ip6-loopback", BlockReason::Loopback),
    ("127.0.0.1", BlockReason::Loopback),
    ("::1", BlockReason::Loopback),
    ("0.0.0.0", BlockReason::Unspecified),
    ("::", BlockReason::Unspecified),
    ("169.254.169.254", BlockReason::CloudMetadata),
    ("169.254.170.2", BlockReason::CloudMetadata),
    ("fd00:ec2::254", BlockReason::CloudMetadata),
    ("100.100.100.200", BlockReason::CloudMetadata),
    ("metadata", BlockReason::CloudMetadata),
    ("metadata.google.internal", BlockReason::CloudMetadata),
    ("metadata.goog", BlockReason::CloudMetadata),
    ("metadata.azure.internal", BlockReason::CloudMetadata),
    ("instance-data", BlockReason::CloudMetadata),
    ("instance-data.ec2.internal", BlockReason::CloudMetadata),
    ("kubernetes", BlockReason::ClusterInternal),
    ("kubernetes.default", BlockReason::ClusterInternal),
    ("kubernetes.default.svc", BlockReason::ClusterInternal),
    ("kubernetes.default.svc.cluster.local", BlockReason::ClusterInternal),
];

/// The SSRF guard.
///
/// Holds the service's own domains on top of the static denylist. The default
/// guard knows no self domains.
///
/// # Example
/// ```
/// use fetch_perimeter::{BlockReason, HostClassification, HostGuard};
///
/// let guard = HostGuard::new().with_self_domain("summarize.example");
/// assert_eq!(
///     guard.classify("www.summarize.example"),
///     HostClassification::Blocked(BlockReason::SelfReferential)
/// );
/// assert!(guard.is_blocked("10.1.2.3"));
/// assert!(!guard.is_blocked("example.com"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostGuard {
    self_domains: Vec<String>,
}

impl HostGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block `domain` and `www.domain`.
    ///
    /// A leading `www.` on the argument is ignored, so either form may be passed.
    pub fn with_self_domain(mut self, domain: impl AsRef<str>) -> Self {
        let domain = canonical_host(domain.as_ref());
        let bare = domain.strip_prefix("www.").unwrap_or(&domain).to_owned();
        if !bare.is_empty() && !self.self_domains.contains(&bare) {
            self.self_domains.push(bare);
        }
        self
    }

    /// Configured self domains, without `www.`.
    pub fn self_domains(&self) -> &[String] {
        &self.self_domains
    }

    /// Classify a hostname or IP literal (IPv6 with or without brackets).
    pub fn classify(&self, hostname: &str) -> HostClassification {
        let host = canonical_host(hostname);

        if self.is_self_domain(&host) {
            return HostClassification::Blocked(BlockReason::SelfReferential);
        }

        let reason = denylisted(&host)
            .or_else(|| classify_ipv4(&host))
            .or_else(|| classify_ipv6(&host));

        match reason {
            Some(reason) => HostClassification::Blocked(reason),
            None => HostClassification::Allowed,
        }
    }

    pub fn is_blocked(&self, hostname: &str) -> bool {
        self.classify(hostname).is_blocked()
    }

    /// Refuse a normalized URL whose host is blocked.
    ///
    /// # Errors
    /// [`ValidationError::BlockedHost`] naming the host and the reason.
    pub fn check(&self, url: &NormalizedUrl) -> Result<(), ValidationError> {
        match self.classify(url.host()) {
            HostClassification::Allowed => Ok(()),
            HostClassification::Blocked(reason) => Err(ValidationError::BlockedHost {
                host: url.host().to_owned(),
                reason,
            }),
        }
    }

    fn is_self_domain(&self, host: &str) -> bool {
        let bare = host.strip_prefix("www.").unwrap_or(host);
        self.self_domains.iter().any(|domain| domain == bare)
    }
}

/// Whether `hostname` is blocked by the static denylist and IP range rules.
///
/// Equivalent to `HostGuard::default().is_blocked(hostname)`. The default guard
/// knows no self domains, so the product's own domain passes here; build a
/// guard with [`HostGuard::with_self_domain`] to block it.
pub fn is_blocked_host(hostname: &str) -> bool {
    HostGuard::default().is_blocked(hostname)
}

/// Lowercase, strip IPv6 brackets and a single trailing dot.
fn canonical_host(hostname: &str) -> String {
    let host = hostname.trim();
    let host = host
        .strip_prefix('[')
        .and_then(|inner| inner.strip_suffix(']'))
        .unwrap_or(host);
    let host = host.strip_suffix('.').unwrap_or(host);
    host.to_ascii_lowercase()
}

fn denylisted(host: &str) -> Option<BlockReason> {
    DENYLIST
        .iter()
        .find(|(name, _)| *name == host)
        .map(|(_, reason)| *reason)
}

/// Parse a strict dotted quad: four groups of one to three decimal digits, each
/// at most 255. Anything else is not treated as an IPv4 literal.
fn parse_dotted_quad(host: &str) -> Option<[u8; 4]> {
    let mut octets = [0u8; 4];
    let mut parts = host.split('.');

    for octet in octets.iter_mut() {
        let part = parts.next()?;
        if part.is_empty() || part.len() > 3 || !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        *octet = part.parse::<u16>().ok().and_then(|v| u8::try_from(v).ok())?;
    }

    parts.next().is_none().then_some(octets)
}

fn classify_ipv4(host: &str) -> Option<BlockReason> {
    match parse_dotted_quad(host)? {
        [10, ..] => Some(BlockReason::PrivateNetwork),
        [172, second, ..] if (16..=31).contains(&second) => Some(BlockReason::PrivateNetwork),
        [192, 168, ..] => Some(BlockReason::PrivateNetwork),
        [127, ..] => Some(BlockReason::Loopback),
        [169, 254, ..] => Some(BlockReason::LinkLocal),
        [0, ..] => Some(BlockReason::Unspecified),
        _ => None,
    }
}

fn classify_ipv6(host: &str) -> Option<BlockReason> {
    let addr: Ipv6Addr = host.parse().ok()?;

    if let Some(mapped) = addr.to_ipv4_mapped() {
        return classify_ipv4(&mapped.to_string());
    }

    let first = addr.segments()[0];
    if addr.is_loopback() {
        Some(BlockReason::Loopback)
    } else if addr.is_unspecified() {
        Some(BlockReason::Unspecified)
    } else if first & 0xffc0 == 0xfe80 {
        Some(BlockReason::LinkLocal)
    } else if first & 0xfe00 == 0xfc00 {
        Some(BlockReason::UniqueLocal)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::url::normalize_url;

    fn reason(host: &str) -> Option<BlockReason> {
        HostGuard::default().classify(host).reason()
    }

    #[test]
    fn test_denylist_entries_are_blocked() {
        for (name, expected) in DENYLIST {
            assert_eq!(reason(name), Some(*expected), "{name} should be blocked");
        }
    }

    #[test]
    fn test_denylist_is_case_insensitive() {
        assert_eq!(reason("LocalHost"), Some(BlockReason::Loopback));
        assert_eq!(
            reason("Metadata.Google.Internal"),
            Some(BlockReason::CloudMetadata)
        );
        assert_eq!(reason("localhost."), Some(BlockReason::Loopback));
    }

    #[test]
    fn test_self_domain_with_and_without_www() {
        let guard = HostGuard::new().with_self_domain("www.Summarize.Example");
        assert_eq!(guard.self_domains(), ["summarize.example".to_string()]);
        assert!(guard.is_blocked("summarize.example"));
        assert!(guard.is_blocked("WWW.summarize.example"));
        assert!(!guard.is_blocked("blog.summarize.example"));
        assert!(!HostGuard::default().is_blocked("summarize.example"));
    }

    #[test]
    fn test_private_ipv4_ranges() {
        assert_eq!(reason("10.0.0.1"), Some(BlockReason::PrivateNetwork));
        assert_eq!(reason("10.255.255.255"), Some(BlockReason::PrivateNetwork));
        assert_eq!(reason("172.16.0.1"), Some(BlockReason::PrivateNetwork));
        assert_eq!(reason("172.31.255.1"), Some(BlockReason::PrivateNetwork));
        assert_eq!(reason("192.168.1.1"), Some(BlockReason::PrivateNetwork));
        assert_eq!(reason("127.5.6.7"), Some(BlockReason::Loopback));
        assert_eq!(reason("169.254.1.1"), Some(BlockReason::LinkLocal));
        assert_eq!(reason("0.1.2.3"), Some(BlockReason::Unspecified));
    }

    #[test]
    fn test_ipv4_range_edges_allowed() {
        assert_eq!(reason("172.15.0.1"), None);
        assert_eq!(reason("172.32.0.1"), None);
        assert_eq!(reason("192.169.0.1"), None);
        assert_eq!(reason("11.0.0.1"), None);
        assert_eq!(reason("93.184.216.34"), None);
    }

    #[test]
    fn test_malformed_ipv4_falls_through() {
        assert_eq!(reason("10.0.0.256"), None);
        assert_eq!(reason("10.0.0"), None);
        assert_eq!(reason("10.0.0.1.5"), None);
        assert_eq!(reason("10.0.0.1000"), None);
        assert_eq!(reason("10.a.0.1"), None);
    }

    #[test]
    fn test_ipv6_literals() {
        assert_eq!(reason("::1"), Some(BlockReason::Loopback));
        assert_eq!(reason("[::1]"), Some(BlockReason::Loopback));
        assert_eq!(reason("0:0:0:0:0:0:0:1"), Some(BlockReason::Loopback));
        assert_eq!(reason("fe80::1"), Some(BlockReason::LinkLocal));
        assert_eq!(reason("[FE80::abcd]"), Some(BlockReason::LinkLocal));
        assert_eq!(reason("fc00::1"), Some(BlockReason::UniqueLocal));
        assert_eq!(reason("fd12:3456::1"), Some(BlockReason::UniqueLocal));
        assert_eq!(reason("2606:2800:220:1::1"), None);
    }

    #[test]
    fn test_ipv4_mapped_ipv6() {
        assert_eq!(reason("::ffff:10.0.0.1"), Some(BlockReason::PrivateNetwork));
        assert_eq!(reason("[::ffff:127.0.0.1]"), Some(BlockReason::Loopback));
        assert_eq!(reason("::ffff:7f00:1"), Some(BlockReason::Loopback));
        assert_eq!(reason("::ffff:93.184.216.34"), None);
    }

    #[test]
    fn test_public_hostnames_allowed() {
        assert!(!is_blocked_host("example.com"));
        assert!(!is_blocked_host("localhost.example.com"));
        assert!(!is_blocked_host("metadata.example.com"));
    }

    #[test]
    fn test_check_uses_canonical_url_host() {
        let guard = HostGuard::default();

        let decimal = normalize_url("http://2130706433/").unwrap();
        assert!(matches!(
            guard.check(&decimal),
            Err(ValidationError::BlockedHost { reason: BlockReason::Loopback, .. })
        ));

        let metadata = normalize_url("http://169.254.169.254/latest/meta-data").unwrap();
        assert!(matches!(
            guard.check(&metadata),
            Err(ValidationError::BlockedHost { reason: BlockReason::CloudMetadata, .. })
        ));

        let public = normalize_url("example.com/article").unwrap();
        assert_eq!(guard.check(&public), Ok(()));
    }
}
