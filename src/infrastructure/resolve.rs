//! DNS re-validation of a normalized URL.
//!
//! The host guard is lexical: `internal.example` passes it even when it resolves
//! to `10.0.0.5`. This adapter resolves the host and applies the same guard to
//! every address returned. It narrows the gap but cannot close it on its own,
//! since the fetcher may resolve again later and get a different answer.

use std::collections::BTreeSet;
use std::future::Future;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use tokio::net::lookup_host;
use tokio::time::timeout;
use tracing::debug;

use crate::domain::host::HostGuard;
use crate::domain::url::{NormalizedUrl, ValidationError};

/// Resolve the host of `url` and reject it if any address is blocked.
///
/// IP-literal hosts are classified directly without a lookup. No deadline is
/// applied; see [`resolve_within`].
///
/// # Errors
/// - [`ValidationError::BlockedHost`] if the host or any resolved address is blocked
/// - [`ValidationError::Unresolvable`] if resolution fails or yields nothing
pub async fn resolve_and_check(
    url: &NormalizedUrl,
    guard: &HostGuard,
) -> Result<Vec<IpAddr>, ValidationError> {
    check_resolved(url, guard, system_lookup).await
}

/// [`resolve_and_check`] with a deadline. A lookup still pending after `limit`
/// is reported as [`ValidationError::Unresolvable`].
pub async fn resolve_within(
    url: &NormalizedUrl,
    guard: &HostGuard,
    limit: Duration,
) -> Result<Vec<IpAddr>, ValidationError> {
    bounded(url, guard, limit, system_lookup).await
}

async fn system_lookup(host: String, port: u16) -> io::Result<Vec<SocketAddr>> {
    Ok(lookup_host((host.as_str(), port)).await?.collect())
}

async fn bounded<L, F>(
    url: &NormalizedUrl,
    guard: &HostGuard,
    limit: Duration,
    lookup: L,
) -> Result<Vec<IpAddr>, ValidationError>
where
    L: FnOnce(String, u16) -> F,
    F: Future<Output = io::Result<Vec<SocketAddr>>>,
{
    match timeout(limit, check_resolved(url, guard, lookup)).await {
        Ok(result) => result,
        Err(_) => {
            debug!(
                host = url.host(),
                timeout_ms = limit.as_millis() as u64,
                "host resolution timed out"
            );
            Err(ValidationError::Unresolvable {
                host: url.host().to_string(),
            })
        }
    }
}

async fn check_resolved<L, F>(
    url: &NormalizedUrl,
    guard: &HostGuard,
    lookup: L,
) -> Result<Vec<IpAddr>, ValidationError>
where
    L: FnOnce(String, u16) -> F,
    F: Future<Output = io::Result<Vec<SocketAddr>>>,
{
    guard.check(url)?;

    let host = url.host();
    let literal = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = literal.parse::<IpAddr>() {
        return Ok(vec![ip]);
    }

    let port = url.as_url().port_or_known_default().unwrap_or(443);
    let addrs: BTreeSet<IpAddr> = match lookup(host.to_string(), port).await {
        Ok(addrs) => addrs.into_iter().map(|addr| addr.ip()).collect(),
        Err(e) => {
            debug!(host, error = %e, "host resolution failed");
            return Err(ValidationError::Unresolvable {
                host: host.to_string(),
            });
        }
    };

    if addrs.is_empty() {
        return Err(ValidationError::Unresolvable {
            host: host.to_string(),
        });
    }

    for ip in &addrs {
        if let Some(reason) = guard.classify(&ip.to_string()).reason() {
            debug!(host, %ip, %reason, "host resolves to a blocked address");
            return Err(ValidationError::BlockedHost {
                host: host.to_string(),
                reason,
            });
        }
    }

    Ok(addrs.into_iter().collect())
}
