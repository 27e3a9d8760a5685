//! LAN address discovery for the externally reachable proxy URL.

use std::net::{IpAddr, Ipv4Addr};

/// Best IPv4 address other devices on the network can reach us at.
///
/// Prefers private ranges (10/8, 172.16/12, 192.168/16) over other
/// non-loopback addresses and falls back to loopback.
pub fn local_ipv4() -> Ipv4Addr {
    let interfaces = match if_addrs::get_if_addrs() {
        Ok(interfaces) => interfaces,
        Err(e) => {
            tracing::warn!(error = %e, "Could not list network interfaces");
            return Ipv4Addr::LOCALHOST;
        }
    };

    let candidates: Vec<Ipv4Addr> = interfaces
        .iter()
        .filter(|iface| !iface.is_loopback())
        .filter_map(|iface| match iface.ip() {
            IpAddr::V4(v4) if !v4.is_link_local() && !v4.is_unspecified() => Some(v4),
            _ => None,
        })
        .collect();

    candidates
        .iter()
        .find(|ip| ip.is_private())
        .or_else(|| candidates.first())
        .copied()
        .unwrap_or(Ipv4Addr::LOCALHOST)
}

/// `http://<lan ip>:<port>`
pub fn proxy_url(port: u16) -> String {
    format!("http://{}:{}", local_ipv4(), port)
}
