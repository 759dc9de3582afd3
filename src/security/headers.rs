//! Client IP resolution through trusted proxies.
//!
//! # Responsibilities
//! - Decide whether the immediate peer may speak for the client
//! - Walk `X-Forwarded-For` / `X-Real-IP` the way gin's `ClientIP` does
//!
//! # Design Decisions
//! - Never trust forwarding headers from untrusted peers
//! - An empty proxy set trusts nobody
//! - IPv4-mapped IPv6 peers are compared as IPv4

use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};

use axum::http::HeaderMap;

/// Headers consulted, in order, when the peer is a trusted proxy.
pub const REMOTE_IP_HEADERS: [&str; 2] = ["x-forwarded-for", "x-real-ip"];

/// The set of peers allowed to supply a client IP.
#[derive(Debug, Clone, Default)]
pub struct TrustedProxies {
    proxies: HashSet<IpAddr>,
}

impl TrustedProxies {
    /// Build from config entries. Entries that are not IP literals are skipped;
    /// validation has already reported them.
    pub fn from_config(entries: &[String]) -> Self {
        let proxies = entries
            .iter()
            .filter_map(|entry| entry.trim().parse::<IpAddr>().ok())
            .map(|ip| ip.to_canonical())
            .collect();
        Self { proxies }
    }

    pub fn is_trusted(&self, ip: IpAddr) -> bool {
        self.proxies.contains(&ip.to_canonical())
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    /// Resolve the client address for a request arriving from `peer`.
    pub fn client_ip(&self, peer: SocketAddr, headers: &HeaderMap) -> IpAddr {
        let remote = peer.ip().to_canonical();
        if !self.is_trusted(remote) {
            return remote;
        }

        REMOTE_IP_HEADERS
            .iter()
            .filter_map(|name| headers.get(*name).and_then(|value| value.to_str().ok()))
            .find_map(|value| self.validate_header(value))
            .unwrap_or(remote)
    }

    /// Walk a comma separated address list right to left, returning the
    /// first address that is not itself a trusted proxy (or the leftmost).
    /// An unparsable entry ends the walk without a result.
    fn validate_header(&self, value: &str) -> Option<IpAddr> {
        if value.is_empty() {
            return None;
        }

        let items: Vec<&str> = value.split(',').collect();
        for (i, item) in items.iter().enumerate().rev() {
            let ip = item.trim().parse::<IpAddr>().ok()?;
            if i == 0 || !self.is_trusted(ip) {
                return Some(ip);
            }
        }
        None
    }
}
