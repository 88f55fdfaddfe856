//! Target address policy for PacketPulse.
//!
//! Classifies candidate target addresses and enforces the permitted-range
//! rule: probe traffic may only be aimed at address space that cannot leave
//! the operator's own network.
//!
//! IP classification follows:
//! - RFC 1918: 10.0.0.0/8, 172.16.0.0/12, 192.168.0.0/16  → Private
//! - RFC 6598: 100.64.0.0/10 (CGNAT)                        → Cgnat
//! - RFC 3927: 169.254.0.0/16 (link-local)                  → LinkLocal
//! - RFC 2544: 198.18.0.0/15 (benchmark)                    → Benchmark
//! - RFC 5737: 192.0.2.0/24, 198.51.100.0/24, 203.0.113.0/24 → Documentation
//! - RFC 4193: fc00::/7 (IPv6 ULA)                           → Private
//! - RFC 3849: 2001:db8::/32                                 → Documentation
//! - fe80::/10 (IPv6 link-local)                             → LinkLocal
//! - ::1 / 127.0.0.0/8                                       → Loopback
//! - 0.0.0.0 / ::                                            → Unspecified
//! - 224.0.0.0/4, ff00::/8, 255.255.255.255                  → Multicast/Broadcast
//! - Everything else                                          → Public
//!
//! Only Loopback, LinkLocal, Private, Cgnat, Benchmark, and Documentation
//! addresses are permitted targets.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use tracing::warn;

use crate::engine::ValidationError;

// ---------------------------------------------------------------------------
// IpClass
// ---------------------------------------------------------------------------

/// Classification of a single IP address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpClass {
    Loopback,
    LinkLocal,
    Private,
    Cgnat,
    Benchmark,
    Documentation,
    Unspecified,
    Multicast,
    Broadcast,
    Public,
}

impl IpClass {
    /// Short string for display and structured log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Loopback => "loopback",
            Self::LinkLocal => "link-local",
            Self::Private => "private",
            Self::Cgnat => "cgnat",
            Self::Benchmark => "benchmark",
            Self::Documentation => "documentation",
            Self::Unspecified => "unspecified",
            Self::Multicast => "multicast",
            Self::Broadcast => "broadcast",
            Self::Public => "public",
        }
    }

    /// Whether this address class is a permitted probe target.
    pub fn is_permitted(&self) -> bool {
        matches!(
            self,
            Self::Loopback
                | Self::LinkLocal
                | Self::Private
                | Self::Cgnat
                | Self::Benchmark
                | Self::Documentation
        )
    }
}

impl std::fmt::Display for IpClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a single IP address.
pub fn classify_ip(addr: &IpAddr) -> IpClass {
    match addr {
        IpAddr::V4(v4) => classify_ipv4(v4),
        IpAddr::V6(v6) => classify_ipv6(v6),
    }
}

fn classify_ipv4(addr: &Ipv4Addr) -> IpClass {
    let octets = addr.octets();

    // Unspecified: 0.0.0.0
    if addr.is_unspecified() {
        return IpClass::Unspecified;
    }

    // Loopback: 127.0.0.0/8
    if octets[0] == 127 {
        return IpClass::Loopback;
    }

    // Link-local: 169.254.0.0/16 (RFC 3927)
    if octets[0] == 169 && octets[1] == 254 {
        return IpClass::LinkLocal;
    }

    // Private: 10.0.0.0/8 (RFC 1918)
    if octets[0] == 10 {
        return IpClass::Private;
    }

    // Private: 172.16.0.0/12 (RFC 1918)
    if octets[0] == 172 && (16..=31).contains(&octets[1]) {
        return IpClass::Private;
    }

    // Private: 192.168.0.0/16 (RFC 1918)
    if octets[0] == 192 && octets[1] == 168 {
        return IpClass::Private;
    }

    // CGNAT: 100.64.0.0/10 (RFC 6598)
    if octets[0] == 100 && (64..=127).contains(&octets[1]) {
        return IpClass::Cgnat;
    }

    // Benchmark: 198.18.0.0/15 (RFC 2544)
    if octets[0] == 198 && (18..=19).contains(&octets[1]) {
        return IpClass::Benchmark;
    }

    // Documentation: TEST-NET-1/2/3 (RFC 5737)
    if (octets[0] == 192 && octets[1] == 0 && octets[2] == 2)
        || (octets[0] == 198 && octets[1] == 51 && octets[2] == 100)
        || (octets[0] == 203 && octets[1] == 0 && octets[2] == 113)
    {
        return IpClass::Documentation;
    }

    // Broadcast: 255.255.255.255
    if addr.is_broadcast() {
        return IpClass::Broadcast;
    }

    // Multicast: 224.0.0.0/4
    if addr.is_multicast() {
        return IpClass::Multicast;
    }

    IpClass::Public
}

fn classify_ipv6(addr: &Ipv6Addr) -> IpClass {
    // Loopback: ::1
    if addr.is_loopback() {
        return IpClass::Loopback;
    }

    // Unspecified: ::
    if addr.is_unspecified() {
        return IpClass::Unspecified;
    }

    let segments = addr.segments();

    // Link-local: fe80::/10
    if segments[0] & 0xffc0 == 0xfe80 {
        return IpClass::LinkLocal;
    }

    // ULA (Unique Local Address): fc00::/7 → treat as private
    if segments[0] & 0xfe00 == 0xfc00 {
        return IpClass::Private;
    }

    // Documentation: 2001:db8::/32 (RFC 3849)
    if segments[0] == 0x2001 && segments[1] == 0x0db8 {
        return IpClass::Documentation;
    }

    // Multicast: ff00::/8
    if addr.is_multicast() {
        return IpClass::Multicast;
    }

    IpClass::Public
}

// ---------------------------------------------------------------------------
// Target resolution
// ---------------------------------------------------------------------------

/// Parse and resolve a `host:port` target string, enforcing the permitted
/// range policy on every resolved address.
///
/// Accepts IP literals (`192.168.1.10:80`, `[::1]:443`) and resolvable
/// hostnames. A hostname is rejected unless *all* of its addresses fall in
/// permitted space, so a name with mixed records cannot smuggle traffic to a
/// public address.
pub async fn resolve_target(target: &str) -> Result<SocketAddr, ValidationError> {
    let target = target.trim();
    if target.is_empty() {
        return Err(ValidationError::EmptyTarget);
    }

    // Fast path: an IP:port literal needs no lookup.
    let addrs: Vec<SocketAddr> = if let Ok(addr) = target.parse::<SocketAddr>() {
        vec![addr]
    } else {
        tokio::net::lookup_host(target)
            .await
            .map_err(|e| ValidationError::UnresolvableTarget {
                target: target.to_string(),
                reason: e.to_string(),
            })?
            .collect()
    };

    if addrs.is_empty() {
        return Err(ValidationError::UnresolvableTarget {
            target: target.to_string(),
            reason: "no addresses returned".to_string(),
        });
    }

    for addr in &addrs {
        let class = classify_ip(&addr.ip());
        if !class.is_permitted() {
            warn!(requested = target, addr = %addr, class = %class, "rejecting target outside permitted ranges");
            return Err(ValidationError::DisallowedTarget {
                target: target.to_string(),
                class,
            });
        }
    }

    let addr = addrs[0];
    if addr.port() == 0 {
        return Err(ValidationError::ZeroPort);
    }

    Ok(addr)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
