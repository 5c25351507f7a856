use crate::error::RelayError;
use std::net::{Ipv4Addr, Ipv6Addr};
use url::{Host, Url};

/// Reject relay targets that point into private address space.
///
/// Only enforced when `BLOCK_PRIVATE_ORIGINS` is set. The relay exists to
/// reach arbitrary origins, so this is opt-in for public deployments.
///
/// **IP literals** are checked against blocked ranges.
/// **Hostnames** are accepted without DNS resolution; a hostname that
/// resolves to a private address is not caught here.
///
/// # Errors
/// Returns [`RelayError::InvalidOrigin`] for:
/// - URLs without a host
/// - IPv4 addresses in private/reserved ranges
/// - IPv6 loopback, link-local or unique-local addresses
pub fn validate_target(target: &Url) -> Result<(), RelayError> {
    let host = target
        .host()
        .ok_or_else(|| RelayError::InvalidOrigin(format!("No host in URL: {target}")))?;

    match host {
        Host::Ipv4(ip) => {
            if is_blocked_ipv4(ip) {
                return Err(RelayError::InvalidOrigin(format!(
                    "Private or reserved IPv4 address not allowed: {ip}"
                )));
            }
        }
        Host::Ipv6(ip) => {
            if is_blocked_ipv6(ip) {
                return Err(RelayError::InvalidOrigin(format!(
                    "Private or reserved IPv6 address not allowed: {ip}"
                )));
            }
        }
        Host::Domain(domain) => {
            if domain.eq_ignore_ascii_case("localhost") {
                return Err(RelayError::InvalidOrigin(
                    "localhost is not allowed".to_string(),
                ));
            }
        }
    }

    Ok(())
}

/// Returns `true` for IPv4 addresses in private or reserved ranges.
///
/// Blocked ranges:
/// - `0.0.0.0/8`      — "this" network (RFC 1122)
/// - `10.0.0.0/8`     — RFC 1918 private
/// - `127.0.0.0/8`    — loopback
/// - `169.254.0.0/16` — link-local / cloud-metadata
/// - `172.16.0.0/12`  — RFC 1918 private
/// - `192.168.0.0/16` — RFC 1918 private
fn is_blocked_ipv4(ip: Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();

    a == 0
        || a == 10
        || a == 127
        || (a == 169 && b == 254)
        || (a == 172 && (16..=31).contains(&b))
        || (a == 192 && b == 168)
}

/// Returns `true` for IPv6 loopback (`::1`), link-local (`fe80::/10`),
/// unique-local (`fc00::/7`) and IPv4-mapped private addresses.
fn is_blocked_ipv6(ip: Ipv6Addr) -> bool {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_blocked_ipv4(v4);
    }

    let s = ip.segments();
    ip.is_loopback() || (s[0] & 0xffc0) == 0xfe80 || (s[0] & 0xfe00) == 0xfc00
}
