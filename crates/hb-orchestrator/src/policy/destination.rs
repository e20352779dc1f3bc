//! Parsing of outbound destinations
//!
//! Parsing is total: whatever a caller passes in yields a host to match
//! against, so classification can never fail.

use std::net::IpAddr;

/// A normalized destination: lowercase host without brackets or a
/// trailing dot, plus the port if one was given
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub host: String,
    pub port: Option<u16>,
    pub ip: Option<IpAddr>,
}

impl Destination {
    /// Accepts `host`, `host:port`, `[v6]:port`, bare IPv6 and URL-ish input
    /// such as `https://api.example.com:443/v1`.
    pub fn parse(raw: &str) -> Self {
        let mut rest = raw.trim();
        if let Some((_, after)) = rest.split_once("://") {
            rest = after;
        }
        if let Some(end) = rest.find(['/', '?', '#']) {
            rest = &rest[..end];
        }
        if let Some((_, after)) = rest.rsplit_once('@') {
            rest = after;
        }

        let (host, port) = if let Some(bracketed) = rest.strip_prefix('[') {
            match bracketed.split_once(']') {
                Some((host, tail)) => (host, tail.strip_prefix(':').and_then(|p| p.parse().ok())),
                None => (bracketed, None),
            }
        } else if rest.matches(':').count() > 1 {
            // Bare IPv6 literal, no port possible
            (rest, None)
        } else if let Some((host, port)) = rest.split_once(':') {
            (host, port.parse().ok())
        } else {
            (rest, None)
        };

        let host = host.trim_end_matches('.').to_ascii_lowercase();
        let ip = host.parse::<IpAddr>().ok();
        Self { host, port, ip }
    }

    pub fn is_ipv4(&self) -> bool {
        matches!(self.ip, Some(IpAddr::V4(_)))
    }
}
