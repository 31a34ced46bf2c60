//! Outbound target policy: which urls the fetcher is willing to request.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use url::{Host, Url};

use crate::fetcher::errors::FetchError;

/// Parses `raw` and rejects non-http(s) schemes and literal addresses in
/// loopback, private, link-local, multicast or reserved ranges.
///
/// Hostnames pass; see [`check_resolved`] for the post-resolution check.
pub fn validate_url(raw: &str) -> Result<Url, FetchError> {
    let url = Url::parse(raw)?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(FetchError::SchemeNotAllowed(other.to_string())),
    }

    let literal = match url.host() {
        Some(Host::Ipv4(v4)) => Some(IpAddr::V4(v4)),
        Some(Host::Ipv6(v6)) => Some(IpAddr::V6(v6)),
        Some(Host::Domain(_)) => None,
        None => return Err(FetchError::MissingHost),
    };

    if let Some(addr) = literal
        && is_blocked(addr)
    {
        return Err(FetchError::BlockedTarget {
            host: url.host_str().unwrap_or_default().to_string(),
            addr,
        });
    }

    Ok(url)
}

/// Resolves the url's host and rejects it if any resolved address is blocked.
pub async fn check_resolved(url: &Url) -> Result<(), FetchError> {
    let Some(Host::Domain(domain)) = url.host() else {
        // Literal addresses were already checked by `validate_url`.
        return Ok(());
    };
    let port = url.port_or_known_default().unwrap_or(80);

    let addrs = tokio::net::lookup_host((domain, port))
        .await
        .map_err(|e| FetchError::Dns(format!("{}: {}", domain, e)))?;

    let mut resolved_any = false;
    for addr in addrs {
        resolved_any = true;
        if is_blocked(addr.ip()) {
            return Err(FetchError::BlockedTarget {
                host: domain.to_string(),
                addr: addr.ip(),
            });
        }
    }

    if !resolved_any {
        return Err(FetchError::Dns(format!("{}: no addresses", domain)));
    }
    Ok(())
}

pub fn is_blocked(addr: IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => is_blocked_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_blocked_v4(v4),
            None => is_blocked_v6(v6),
        },
    }
}

fn is_blocked_v4(addr: Ipv4Addr) -> bool {
    let [a, b, ..] = addr.octets();
    addr.is_loopback()          // 127.0.0.0/8
        || addr.is_private()    // 10/8, 172.16/12, 192.168/16
        || addr.is_link_local() // 169.254/16
        || addr.is_multicast()  // 224/4
        || a >= 240             // 240/4 reserved and broadcast
        || a == 0               // "this network"
        || (a == 100 && (64..128).contains(&b)) // carrier-grade NAT
}

fn is_blocked_v6(addr: Ipv6Addr) -> bool {
    let first = addr.segments()[0];
    addr.is_loopback()
        || addr.is_unspecified()
        || addr.is_multicast()
        || (first & 0xfe00) == 0xfc00 // fc00::/7 unique local
        || (first & 0xffc0) == 0xfe80 // fe80::/10 link-local
}
